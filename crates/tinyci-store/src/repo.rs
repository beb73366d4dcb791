//! Repository traits and implementations.

pub mod file;

use async_trait::async_trait;
use tinyci_core::{Build, BuildId, BuildSummary, LogFile, LogSlice};

use crate::StoreResult;

pub use file::{BuildRecord, FileBuildRepo};

/// Durable storage for builds and their logs.
///
/// Lookups of unknown ids return `Ok(None)`; `Err` is reserved for storage faults.
#[async_trait]
pub trait BuildRepo: Send + Sync {
    /// Insert or replace the metadata of a build.
    ///
    /// The first save of an id also appends one entry to the index.
    async fn save(&self, build: &Build) -> StoreResult<()>;

    /// Append a chunk plus a line terminator to a build's log.
    ///
    /// Returns `Ok(false)` without writing anything when the build has never
    /// been saved.
    async fn append_to_log(&self, id: BuildId, chunk: &str) -> StoreResult<bool>;

    /// All index entries, oldest first.
    async fn list(&self) -> StoreResult<Vec<BuildSummary>>;

    async fn find_by_id(&self, id: BuildId) -> StoreResult<Option<Build>>;

    /// The whole log of a build.
    async fn get_log(&self, id: BuildId) -> StoreResult<Option<LogFile>>;

    /// A bounded slice of a build's log starting at byte `offset`.
    async fn get_log_slice(&self, id: BuildId, offset: u64) -> StoreResult<Option<LogSlice>>;
}
