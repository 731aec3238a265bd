//! Alder governance engine.
//!
//! Every mutating action passes through three ordered layers before it may
//! touch shared state:
//!
//! 1. **Constitution** — values, rights, and a partitioned action catalog.
//! 2. **Guardrails** — typed composable checks over filesystem paths, code
//!    content, resource ceilings, and SQL statement kinds.
//! 3. **Whitelist** — per-tier action catalog, per-actor trust, and the
//!    auto-approve override list.
//!
//! Any layer may veto. Compliant actions are auto-approved or queued for a
//! human depending on the autonomy tier, the caller-supplied confidence,
//! and the policy documents. Policy loading fails closed: with no valid
//! documents, every mutating action is denied.

#![deny(unsafe_code)]

mod approvals;
mod constitution;
mod engine;
mod guardrails;
mod store;
mod whitelist;

pub use approvals::ApprovalQueue;
pub use constitution::{ActionCatalog, ConstitutionDoc, EscalationPolicy, TierDefinition};
pub use engine::{Authorization, GovernanceConfig, GovernanceEngine, SubmitOutcome};
pub use guardrails::{GuardrailSet, GuardrailsDoc};
pub use store::{PolicyBundle, PolicyStore};
pub use whitelist::WhitelistDoc;

use thiserror::Error;

/// Errors raised inside the governance subsystem.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("policy documents not loaded: {0}")]
    PolicyNotLoaded(String),

    #[error("policy document '{name}' is invalid: {detail}")]
    InvalidPolicy { name: String, detail: String },

    #[error("approval {0} not found")]
    UnknownApproval(String),

    #[error("approval {id} is {state}, not pending")]
    NotPending { id: String, state: String },

    #[error("policy I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("event publish failed: {0}")]
    Publish(#[from] alder_mesh::MeshError),
}
