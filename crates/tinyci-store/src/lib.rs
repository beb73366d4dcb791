//! Build store for tinyci.
//!
//! Persists build metadata, the append-only build index and per-build logs
//! on the local file system.

pub mod error;
pub mod locks;
pub mod repo;

pub use error::{StoreError, StoreResult};
pub use repo::*;
