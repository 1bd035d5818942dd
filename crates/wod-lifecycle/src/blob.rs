//! Blob store collaborator contract.
//!
//! The desk never touches file storage directly; proof screenshots arrive
//! as URLs returned by an implementation of [`BlobStore`]. The policy check
//! is pure and shared by every implementation: image content types only,
//! capped size.

use wod_schemas::DeskError;

/// Content types an upload may carry.
pub const ALLOWED_IMAGE_TYPES: &[&str] =
    &["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// Upload limits. `max_bytes` is deployment configuration; the type list is
/// fixed.
#[derive(Debug, Clone, Copy)]
pub struct BlobPolicy {
    pub max_bytes: usize,
}

impl Default for BlobPolicy {
    fn default() -> Self {
        // 10 MiB, matching the historical upload cap.
        Self { max_bytes: 10 * 1024 * 1024 }
    }
}

impl BlobPolicy {
    /// Validate an upload before it reaches storage.
    pub fn check(&self, len: usize, content_type: &str) -> Result<(), DeskError> {
        if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
            return Err(DeskError::Validation(format!(
                "unsupported content type: {content_type}"
            )));
        }
        if len > self.max_bytes {
            return Err(DeskError::Validation(format!(
                "upload of {len} bytes exceeds limit of {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

/// External image storage. `store` returns a retrievable URL.
pub trait BlobStore {
    fn store(&mut self, bytes: &[u8], content_type: &str) -> Result<String, DeskError>;
    fn delete(&mut self, url: &str) -> Result<(), DeskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_images_within_limit() {
        let policy = BlobPolicy { max_bytes: 1024 };
        for ct in ALLOWED_IMAGE_TYPES {
            assert!(policy.check(512, ct).is_ok());
        }
    }

    #[test]
    fn rejects_non_image_content_types() {
        let policy = BlobPolicy::default();
        assert!(matches!(
            policy.check(10, "application/pdf"),
            Err(DeskError::Validation(_))
        ));
        assert!(policy.check(10, "text/html").is_err());
    }

    #[test]
    fn rejects_oversized_uploads() {
        let policy = BlobPolicy { max_bytes: 100 };
        assert!(matches!(
            policy.check(101, "image/png"),
            Err(DeskError::Validation(_))
        ));
        assert!(policy.check(100, "image/png").is_ok());
    }
}
