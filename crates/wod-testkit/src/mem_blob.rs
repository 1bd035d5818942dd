//! In-memory blob store.

use std::collections::HashMap;

use uuid::Uuid;
use wod_lifecycle::{BlobPolicy, BlobStore};
use wod_schemas::DeskError;

/// Policy-checked image storage backed by a map. URLs are opaque
/// (`mem://<uuid>`), matching how the real store names uploads.
pub struct MemBlobStore {
    policy: BlobPolicy,
    blobs: HashMap<String, Vec<u8>>,
}

impl MemBlobStore {
    pub fn new(policy: BlobPolicy) -> Self {
        Self { policy, blobs: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Default for MemBlobStore {
    fn default() -> Self {
        Self::new(BlobPolicy::default())
    }
}

impl BlobStore for MemBlobStore {
    fn store(&mut self, bytes: &[u8], content_type: &str) -> Result<String, DeskError> {
        self.policy.check(bytes.len(), content_type)?;
        let url = format!("mem://{}", Uuid::new_v4());
        self.blobs.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }

    fn delete(&mut self, url: &str) -> Result<(), DeskError> {
        match self.blobs.remove(url) {
            Some(_) => Ok(()),
            None => Err(DeskError::NotFound("blob")),
        }
    }
}
