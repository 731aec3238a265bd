//! Alder immutable audit log.
//!
//! An append-only stream of [`AuditEntry`] values, each binding an event to
//! its predecessor with `self_hash = SHA-256(previous_hash ‖
//! canonical(event))`. Appends are serialized through a single writer task
//! and fsynced before the caller's future resolves; readers scan a
//! prefix-consistent view concurrently. A detected chain break poisons the
//! log: every further append fails until an operator intervenes.
//!
//! On-disk layout: length-prefixed JSON frames plus a side index of frame
//! offsets (`<path>.idx`) used for range reads. The index is advisory and is
//! rebuilt from the stream when missing or stale.

#![deny(unsafe_code)]

mod canonical;
mod entry;
mod log;
mod signer;

pub use canonical::{canonical_event_bytes, canonical_json};
pub use entry::{compute_self_hash, AuditEntry, GENESIS_HASH};
pub use log::{AuditLog, ChainVerification};
pub use signer::{Ed25519Signer, EntrySigner};

use alder_types::CoreError;
use thiserror::Error;

/// Errors raised by the audit subsystem.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit chain broken at sequence {sequence}: {detail}")]
    ChainBroken { sequence: u64, detail: String },

    #[error("audit log is poisoned by a prior chain break; operator intervention required")]
    Poisoned,

    #[error("audit storage I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sequence {0} is out of range")]
    OutOfRange(u64),

    #[error("audit writer is closed")]
    Closed,
}

impl From<AuditError> for CoreError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::ChainBroken { sequence, detail } => {
                CoreError::ChainBroken { sequence, detail }
            }
            AuditError::Poisoned => CoreError::ChainBroken {
                sequence: 0,
                detail: "log poisoned by earlier break".to_string(),
            },
            other => CoreError::internal(other.to_string()),
        }
    }
}
