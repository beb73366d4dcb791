//! Stage execution backends for tinyci.
//!
//! Runs the clone, build and test stages as local OS processes and streams
//! their combined output line by line.

pub mod local;
pub mod process;

pub use local::LocalProcessRunner;
pub use process::run_process;
pub use tinyci_core::runner::{LineSender, Stage, StageRunner};
