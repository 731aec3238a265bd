//! Structured candidate patches produced by fix recipes.

use serde::{Deserialize, Serialize};

/// A structured edit proposal. `old_content_hash` is the SHA-256 of the file
/// as read when the patch was produced; apply fails if the file moved on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidatePatch {
    pub target: String,
    pub line_start: u32,
    pub line_end: u32,
    pub old_content_hash: String,
    pub new_content: String,
    pub description: String,
}

impl CandidatePatch {
    /// A patch replacing the whole file, the common recipe output.
    pub fn whole_file(
        target: impl Into<String>,
        old_content_hash: impl Into<String>,
        new_content: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let new_content = new_content.into();
        let line_end = new_content.lines().count() as u32;
        Self {
            target: target.into(),
            line_start: 1,
            line_end,
            old_content_hash: old_content_hash.into(),
            new_content,
            description: description.into(),
        }
    }
}
