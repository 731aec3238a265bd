//! The whitelist layer: per-tier action catalogs and actor trust.

use alder_types::{ActionRequest, AutonomyTier, LayerResult, PolicyLayer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum trust an actor needs before the whitelist lets actions through.
const MIN_ACTOR_TRUST: f64 = 0.3;

/// The declarative whitelist document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WhitelistDoc {
    /// Action kinds allowed per tier, keyed by tier number ("0".."3").
    /// A tier inherits everything allowed at lower tiers.
    #[serde(default)]
    pub per_tier_actions: HashMap<String, Vec<String>>,
    /// Trust in [0, 1] per actor id. Unlisted actors default to 0.5.
    #[serde(default)]
    pub per_actor_trust: HashMap<String, f64>,
    /// Globs of files the platform may modify. Empty means no restriction
    /// beyond the guardrails layer. `*` matches within one path segment,
    /// a trailing `**` matches any remainder.
    #[serde(default)]
    pub approved_file_globs: Vec<String>,
    /// Known low-risk action kinds eligible for auto-approval.
    #[serde(default)]
    pub auto_approve_actions: Vec<String>,
    /// Fix strategies allowed to apply without a prior sandbox pass.
    /// Deliberately empty in the shipped defaults.
    #[serde(default)]
    pub sandbox_exempt_strategies: Vec<String>,
}

impl WhitelistDoc {
    /// Evaluate the whitelist layer at the current tier.
    pub fn evaluate(&self, request: &ActionRequest, tier: AutonomyTier) -> LayerResult {
        let kind = request.action_kind.as_str();

        if !self.kind_allowed_at(kind, tier) {
            return LayerResult::fail(
                PolicyLayer::Whitelist,
                format!(
                    "action kind '{kind}' is not whitelisted at tier {}",
                    tier.as_u8()
                ),
            );
        }

        let trust = self.actor_trust(request.actor.0.as_str());
        if trust < MIN_ACTOR_TRUST {
            return LayerResult::fail(
                PolicyLayer::Whitelist,
                format!("actor '{}' trust {trust:.2} is below minimum", request.actor),
            );
        }

        if !request.resource.is_empty()
            && !self.approved_file_globs.is_empty()
            && request.action_kind.as_str()
                == alder_types::action::well_known::APPLY_CODE_PATCH
            && !self
                .approved_file_globs
                .iter()
                .any(|glob| glob_match(glob, &request.resource))
        {
            return LayerResult::fail(
                PolicyLayer::Whitelist,
                format!("file '{}' matches no approved glob", request.resource),
            );
        }

        LayerResult::pass(
            PolicyLayer::Whitelist,
            format!("action kind '{kind}' is whitelisted at tier {}", tier.as_u8()),
        )
    }

    /// Whether a kind is listed at the tier or any tier below it.
    pub fn kind_allowed_at(&self, kind: &str, tier: AutonomyTier) -> bool {
        (0..=tier.as_u8()).any(|level| {
            self.per_tier_actions
                .get(&level.to_string())
                .is_some_and(|kinds| kinds.iter().any(|k| k == kind))
        })
    }

    pub fn actor_trust(&self, actor: &str) -> f64 {
        self.per_actor_trust.get(actor).copied().unwrap_or(0.5)
    }

    pub fn is_auto_approvable(&self, kind: &str) -> bool {
        self.auto_approve_actions.iter().any(|k| k == kind)
    }

    pub fn is_sandbox_exempt(&self, strategy: &str) -> bool {
        self.sandbox_exempt_strategies.iter().any(|s| s == strategy)
    }
}

/// Minimal glob matching: `*` spans within a segment, a trailing `**`
/// spans the remainder, literals match exactly.
pub fn glob_match(glob: &str, path: &str) -> bool {
    if let Some(prefix) = glob.strip_suffix("**") {
        let prefix = prefix.trim_end_matches('/');
        return prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
    }

    let glob_parts: Vec<&str> = glob.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();
    if glob_parts.len() != path_parts.len() {
        return false;
    }
    glob_parts
        .iter()
        .zip(path_parts.iter())
        .all(|(g, p)| segment_match(g, p))
}

fn segment_match(glob: &str, segment: &str) -> bool {
    if glob == "*" {
        return true;
    }
    match glob.split_once('*') {
        None => glob == segment,
        Some((prefix, suffix)) => {
            segment.len() >= prefix.len() + suffix.len()
                && segment.starts_with(prefix)
                && segment.ends_with(suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::{ActionKind, ActorId, RiskTier};

    fn doc() -> WhitelistDoc {
        serde_yaml::from_str(
            r#"
per_tier_actions:
  "1": ["read_metrics"]
  "2": ["apply_code_patch", "revert_code_patch"]
  "3": ["deploy_service"]
per_actor_trust:
  flaky-bot: 0.1
  operator: 0.9
approved_file_globs:
  - "src/**"
  - "services/*/worker.py"
auto_approve_actions:
  - apply_code_patch
"#,
        )
        .unwrap()
    }

    fn request(kind: &str, actor: &str, resource: &str) -> ActionRequest {
        ActionRequest::new(
            ActorId::new(actor),
            ActionKind::new(kind),
            resource,
            RiskTier::Medium,
        )
    }

    #[test]
    fn tiers_inherit_lower_tier_actions() {
        let w = doc();
        assert!(w.kind_allowed_at("read_metrics", AutonomyTier::Autonomous));
        assert!(w.kind_allowed_at("apply_code_patch", AutonomyTier::SemiAutonomous));
        assert!(!w.kind_allowed_at("apply_code_patch", AutonomyTier::Supervised));
        assert!(!w.kind_allowed_at("deploy_service", AutonomyTier::SemiAutonomous));
    }

    #[test]
    fn unlisted_kinds_fail_the_layer() {
        let w = doc();
        let result = w.evaluate(
            &request("format_disk", "system", "src/a.py"),
            AutonomyTier::Autonomous,
        );
        assert!(!result.passed);
    }

    #[test]
    fn low_trust_actors_fail_the_layer() {
        let w = doc();
        let result = w.evaluate(
            &request("apply_code_patch", "flaky-bot", "src/a.py"),
            AutonomyTier::SemiAutonomous,
        );
        assert!(!result.passed);
        assert!(result.rationale.contains("trust"));
    }

    #[test]
    fn globs_gate_patch_targets() {
        let w = doc();
        let ok = w.evaluate(
            &request("apply_code_patch", "system", "src/deep/nested.py"),
            AutonomyTier::SemiAutonomous,
        );
        assert!(ok.passed);

        let ok = w.evaluate(
            &request("apply_code_patch", "system", "services/billing/worker.py"),
            AutonomyTier::SemiAutonomous,
        );
        assert!(ok.passed);

        let bad = w.evaluate(
            &request("apply_code_patch", "system", "infra/deploy.sh"),
            AutonomyTier::SemiAutonomous,
        );
        assert!(!bad.passed);
    }

    #[test]
    fn glob_matching_rules() {
        assert!(glob_match("src/**", "src/a/b/c.py"));
        assert!(!glob_match("src/**", "srcx/a.py"));
        assert!(glob_match("services/*/worker.py", "services/billing/worker.py"));
        assert!(!glob_match("services/*/worker.py", "services/billing/api/worker.py"));
        assert!(glob_match("*.py", "worker.py"));
        assert!(!glob_match("*.py", "worker.rs"));
    }

    #[test]
    fn auto_approve_membership() {
        let w = doc();
        assert!(w.is_auto_approvable("apply_code_patch"));
        assert!(!w.is_auto_approvable("deploy_service"));
    }
}
