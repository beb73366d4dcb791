//! Build log values returned by the store.

use serde::{Deserialize, Serialize};

/// The complete log of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFile {
    pub content: String,
}

/// A bounded, byte-addressed window into a build log.
///
/// `next_offset` is where the following read should start; clients polling a
/// running build keep passing it back until `end_reached` stays true and the
/// build is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSlice {
    pub content: String,
    pub next_offset: u64,
    pub end_reached: bool,
}
