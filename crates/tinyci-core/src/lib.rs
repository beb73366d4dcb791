//! Core domain types and traits for the tinyci build engine.
//!
//! This crate contains:
//! - Build identifiers and the build state machine
//! - Log values returned by the build store
//! - The stage runner trait implemented by process backends
//! - The notifier trait used to report final build status

pub mod build;
pub mod error;
pub mod id;
pub mod log;
pub mod notifier;
pub mod runner;

pub use build::{Build, BuildRequest, BuildStatus, BuildSummary};
pub use error::{Error, Result};
pub use id::BuildId;
pub use log::{LogFile, LogSlice};
pub use notifier::{CommitState, CommitStatus, Notifier, NotifyError};
pub use runner::{LineSender, Stage, StageRunner};
