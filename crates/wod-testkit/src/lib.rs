//! Deterministic test doubles for the work-order desk.
//!
//! [`MemDesk`] implements the same operation surface as `wod-db::desk` and
//! `wod-db::registry` over in-memory tables, applying the identical pure
//! plans from `wod-lifecycle` under a lock. Scenario tests under `tests/`
//! exercise the full authorize → plan → apply path without Postgres.
//! [`MemBlobStore`] is the matching in-memory image store.

mod mem_blob;
mod mem_desk;

pub use mem_blob::MemBlobStore;
pub use mem_desk::{CreateOrderRequest, MemDesk};
