//! The platform error taxonomy.
//!
//! Every kind carries a stable code (for API responses and log queries), a
//! human-readable message, a remediation hint, and where applicable the
//! correlation id of the causing chain of events.

use crate::event::CorrelationId;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Platform-wide error kinds. Subsystem crates wrap their internal errors
/// into these at their public boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("policy denied: {rationale}")]
    PolicyDenied {
        rationale: String,
        remediations: Vec<String>,
        correlation_id: Option<CorrelationId>,
    },

    #[error("guardrail violation in check '{check}': {detail}")]
    GuardrailViolation {
        check: String,
        detail: String,
        correlation_id: Option<CorrelationId>,
    },

    #[error("audit chain broken at sequence {sequence}: {detail}")]
    ChainBroken { sequence: u64, detail: String },

    #[error("sandbox failure: {detail}")]
    SandboxFailure {
        detail: String,
        correlation_id: Option<CorrelationId>,
    },

    #[error("preflight failure for '{artifact}': {detail}")]
    PreflightFailure { artifact: String, detail: String },

    #[error("component '{component}' failed to start: {detail}")]
    ComponentStartupFailure { component: String, detail: String },

    #[error("approval {approval_id} expired")]
    ApprovalExpired { approval_id: String },

    #[error("operation '{operation}' timed out after {deadline_ms}ms")]
    Timeout { operation: String, deadline_ms: u64 },

    #[error("operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    #[error("subscriber '{subscription}' overflowed, {dropped} event(s) dropped")]
    BackpressureOverflow { subscription: String, dropped: u64 },

    #[error("internal error: {detail}")]
    Internal {
        detail: String,
        correlation_id: Option<CorrelationId>,
    },
}

impl CoreError {
    pub fn internal(detail: impl Into<String>) -> Self {
        CoreError::Internal {
            detail: detail.into(),
            correlation_id: None,
        }
    }

    /// Stable machine-readable code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::PolicyDenied { .. } => "ALD-POLICY-DENIED",
            CoreError::GuardrailViolation { .. } => "ALD-GUARDRAIL-VIOLATION",
            CoreError::ChainBroken { .. } => "ALD-CHAIN-BROKEN",
            CoreError::SandboxFailure { .. } => "ALD-SANDBOX-FAILURE",
            CoreError::PreflightFailure { .. } => "ALD-PREFLIGHT-FAILURE",
            CoreError::ComponentStartupFailure { .. } => "ALD-STARTUP-FAILURE",
            CoreError::ApprovalExpired { .. } => "ALD-APPROVAL-EXPIRED",
            CoreError::Timeout { .. } => "ALD-TIMEOUT",
            CoreError::Cancelled { .. } => "ALD-CANCELLED",
            CoreError::BackpressureOverflow { .. } => "ALD-BACKPRESSURE",
            CoreError::Internal { .. } => "ALD-INTERNAL",
        }
    }

    /// Short operator-facing hint for resolving this kind of failure.
    pub fn remediation(&self) -> &'static str {
        match self {
            CoreError::PolicyDenied { .. } => {
                "review the layer rationales; adjust policy documents or request approval"
            }
            CoreError::GuardrailViolation { .. } => {
                "the action touches a protected resource; widen guardrails only deliberately"
            }
            CoreError::ChainBroken { .. } => {
                "the audit file was altered or corrupted; restore from backup and re-verify"
            }
            CoreError::SandboxFailure { .. } => {
                "the candidate change failed isolated verification; inspect sandbox output"
            }
            CoreError::PreflightFailure { .. } => {
                "fix the flagged artifact or demote it from critical before restarting"
            }
            CoreError::ComponentStartupFailure { .. } => {
                "check component logs; optional components can be disabled in config"
            }
            CoreError::ApprovalExpired { .. } => "resubmit the action to obtain a fresh approval",
            CoreError::Timeout { .. } => "raise the operation's deadline or reduce its scope",
            CoreError::Cancelled { .. } => "the operation was cancelled; retry if still wanted",
            CoreError::BackpressureOverflow { .. } => {
                "slow the producer or raise the subscription's queue capacity"
            }
            CoreError::Internal { .. } => "see logs for the correlation id",
        }
    }

    /// Whether this kind must halt the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::ChainBroken { .. })
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            CoreError::PolicyDenied { correlation_id, .. }
            | CoreError::GuardrailViolation { correlation_id, .. }
            | CoreError::SandboxFailure { correlation_id, .. }
            | CoreError::Internal { correlation_id, .. } => correlation_id.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_distinct() {
        let errors = [
            CoreError::internal("x"),
            CoreError::ChainBroken {
                sequence: 4,
                detail: "hash mismatch".into(),
            },
            CoreError::Timeout {
                operation: "sandbox".into(),
                deadline_ms: 100,
            },
        ];
        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec!["ALD-INTERNAL", "ALD-CHAIN-BROKEN", "ALD-TIMEOUT"]);
    }

    #[test]
    fn only_chain_break_is_fatal() {
        assert!(CoreError::ChainBroken {
            sequence: 0,
            detail: "".into()
        }
        .is_fatal());
        assert!(!CoreError::internal("x").is_fatal());
    }
}
