//! Policy decisions: the output of governance evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three governance layers, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLayer {
    Constitution,
    Guardrails,
    Whitelist,
}

impl PolicyLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyLayer::Constitution => "constitution",
            PolicyLayer::Guardrails => "guardrails",
            PolicyLayer::Whitelist => "whitelist",
        }
    }
}

impl fmt::Display for PolicyLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of a single layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
    pub layer: PolicyLayer,
    pub passed: bool,
    pub rationale: String,
}

impl LayerResult {
    pub fn pass(layer: PolicyLayer, rationale: impl Into<String>) -> Self {
        Self {
            layer,
            passed: true,
            rationale: rationale.into(),
        }
    }

    pub fn fail(layer: PolicyLayer, rationale: impl Into<String>) -> Self {
        Self {
            layer,
            passed: false,
            rationale: rationale.into(),
        }
    }
}

/// What the engine decided to do with the action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoApprove,
    RequireApproval,
    Deny,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::AutoApprove => "auto_approve",
            Disposition::RequireApproval => "require_approval",
            Disposition::Deny => "deny",
        }
    }
}

/// Full decision for one action request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub compliant: bool,
    pub layer_results: Vec<LayerResult>,
    pub disposition: Disposition,
    pub confidence: f64,
    /// Suggested remediations when denied; empty otherwise.
    pub remediations: Vec<String>,
}

impl PolicyDecision {
    pub fn denied(&self) -> bool {
        self.disposition == Disposition::Deny
    }

    /// Rationale of the first failing layer, if any.
    pub fn denial_rationale(&self) -> Option<&str> {
        self.layer_results
            .iter()
            .find(|r| !r.passed)
            .map(|r| r.rationale.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_rationale_comes_from_first_failing_layer() {
        let decision = PolicyDecision {
            compliant: false,
            layer_results: vec![
                LayerResult::pass(PolicyLayer::Constitution, "ok"),
                LayerResult::fail(PolicyLayer::Guardrails, "forbidden path"),
                LayerResult::fail(PolicyLayer::Whitelist, "not listed"),
            ],
            disposition: Disposition::Deny,
            confidence: 0.2,
            remediations: vec![],
        };
        assert!(decision.denied());
        assert_eq!(decision.denial_rationale(), Some("forbidden path"));
    }
}
