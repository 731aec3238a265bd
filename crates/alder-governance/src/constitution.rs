//! The constitution layer: values, rights, and the action catalog.

use alder_types::{ActionRequest, LayerResult, PolicyLayer};
use serde::{Deserialize, Serialize};

/// Partition of known action kinds. Membership decides the default
/// disposition before guardrails and whitelist refine it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionCatalog {
    #[serde(default)]
    pub never_allowed: Vec<String>,
    #[serde(default)]
    pub requires_approval: Vec<String>,
    #[serde(default)]
    pub auto_approved: Vec<String>,
}

/// What to do when trust degrades. These are routing hints for operators,
/// surfaced in escalation events; they do not alter layer verdicts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub low_confidence: String,
    #[serde(default)]
    pub multiple_failures: String,
    #[serde(default)]
    pub security_threat: String,
    #[serde(default)]
    pub constitutional_violation: String,
}

/// Per-tier metadata, including an optional confidence-threshold override.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierDefinition {
    pub tier: u8,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

/// The declarative constitution document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstitutionDoc {
    pub version: String,
    #[serde(default)]
    pub core_values: Vec<String>,
    #[serde(default)]
    pub fundamental_rights: Vec<String>,
    #[serde(default)]
    pub action_catalog: ActionCatalog,
    #[serde(default)]
    pub escalation_policy: EscalationPolicy,
    #[serde(default)]
    pub tier_definitions: Vec<TierDefinition>,
}

impl ConstitutionDoc {
    /// Evaluate the constitution layer for one request.
    pub fn evaluate(&self, request: &ActionRequest) -> LayerResult {
        let kind = request.action_kind.as_str();
        if self
            .action_catalog
            .never_allowed
            .iter()
            .any(|k| k == kind)
        {
            return LayerResult::fail(
                PolicyLayer::Constitution,
                format!("action kind '{kind}' is constitutionally never allowed"),
            );
        }
        LayerResult::pass(
            PolicyLayer::Constitution,
            format!("action kind '{kind}' is not forbidden by the constitution"),
        )
    }

    pub fn requires_approval(&self, kind: &str) -> bool {
        self.action_catalog
            .requires_approval
            .iter()
            .any(|k| k == kind)
    }

    /// Confidence threshold override for a tier, if the document has one.
    pub fn threshold_override(&self, tier: u8) -> Option<f64> {
        self.tier_definitions
            .iter()
            .find(|d| d.tier == tier)
            .and_then(|d| d.confidence_threshold)
    }
}
