//! Alder fix proposer.
//!
//! Consumes classified errors, ranks the learning store's strategies for
//! the pattern, renders a candidate patch with the matching edit recipe,
//! and walks the governed path: propose → approve → sandbox → apply, with
//! a snapshot taken before any write and an automatic revert inside the
//! original approval envelope.

#![deny(unsafe_code)]

pub mod recipes;
mod proposer;
mod snapshot;

pub use proposer::{FixProposer, ProposerConfig};
pub use recipes::{apply_recipe, ErrorContext};
pub use snapshot::{content_hash, SnapshotStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProposerError {
    #[error("artifact I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact '{path}' changed since the patch was proposed")]
    StaleArtifact { path: String },

    #[error("no snapshot recorded for '{path}'")]
    NoSnapshot { path: String },

    #[error("event payload is missing '{0}'")]
    MalformedEvent(&'static str),
}
