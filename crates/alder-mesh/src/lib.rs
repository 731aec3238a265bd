//! Alder trigger mesh: in-process typed pub/sub.
//!
//! Publishers hand events to [`TriggerMesh::publish`]; the mesh appends the
//! event to the audit log first (publish fails if the append fails), then
//! enqueues it onto every matching subscription's bounded queue. Each
//! subscription has one worker task, so delivery order within a
//! subscription follows enqueue order, and publishers who publish
//! sequentially get per-source FIFO delivery.
//!
//! The mesh takes no governance or learning locks while dispatching.

#![deny(unsafe_code)]

mod mesh;
mod pattern;
mod queue;

pub use mesh::{
    handler, DispatchResult, Handler, MeshStats, Subscription, SubscriptionId,
    SubscriptionOptions, TriggerMesh,
};
pub use pattern::TopicPattern;
pub use queue::{OverflowPolicy, PushOutcome};

use alder_audit::AuditError;
use thiserror::Error;

/// Errors raised by the trigger mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("invalid topic pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    #[error("audit append failed, publish aborted: {0}")]
    Audit(#[from] AuditError),

    #[error("subscription {0} not found")]
    UnknownSubscription(u64),
}
