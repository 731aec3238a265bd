//! Action requests: the input to governance evaluation.

use crate::event::{ActorId, CorrelationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The kind of a mutating action, e.g. `apply_code_patch`. The catalog of
/// known kinds is policy configuration, not code; this stays an open string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKind(pub String);

impl ActionKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds the core itself submits. Deployments may add their own in policy.
pub mod well_known {
    pub const APPLY_CODE_PATCH: &str = "apply_code_patch";
    pub const REVERT_CODE_PATCH: &str = "revert_code_patch";
    pub const SET_AUTONOMY_TIER: &str = "set_autonomy_tier";
    pub const RELOAD_POLICY: &str = "reload_policy";
}

/// Coarse risk classification supplied by the requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

/// A request to perform a mutating action, evaluated by the governance
/// engine before anything touches shared state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    pub actor: ActorId,
    pub action_kind: ActionKind,
    pub resource: String,
    pub risk_tier: RiskTier,
    pub payload: Value,
    /// Requester-supplied confidence in [0, 1], e.g. a strategy's smoothed
    /// success rate. Clamped by the engine.
    pub confidence: f64,
    pub correlation_id: CorrelationId,
}

impl ActionRequest {
    pub fn new(
        actor: ActorId,
        action_kind: ActionKind,
        resource: impl Into<String>,
        risk_tier: RiskTier,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor,
            action_kind,
            resource: resource.into(),
            risk_tier,
            payload: Value::Null,
            confidence: 0.5,
            correlation_id: CorrelationId::generate(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let req = ActionRequest::new(
            ActorId::system(),
            ActionKind::new(well_known::APPLY_CODE_PATCH),
            "src/a.py",
            RiskTier::Medium,
        )
        .with_confidence(1.7);
        assert_eq!(req.confidence, 1.0);
    }

    #[test]
    fn risk_tiers_are_ordered() {
        assert!(RiskTier::Low < RiskTier::Critical);
    }
}
