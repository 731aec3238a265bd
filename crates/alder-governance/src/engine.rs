//! The governance engine: layered evaluation, disposition, approvals, and
//! the autonomy tier.

use crate::approvals::ApprovalQueue;
use crate::store::PolicyStore;
use crate::GovernanceError;
use alder_mesh::TriggerMesh;
use alder_types::action::well_known;
use alder_types::{
    event_types, ActionRequest, ActorId, Approval, ApprovalId, AutonomyTier, ComponentId,
    CoreError, Disposition, Event, LayerResult, PolicyDecision, PolicyLayer, Severity,
};
use chrono::{Duration, Utc};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

const COMPONENT: &str = "governance";

/// Engine knobs. Expiry defaults to 30 minutes per deployment guidance.
#[derive(Clone, Debug)]
pub struct GovernanceConfig {
    pub approval_expiry_minutes: i64,
    pub expiry_sweep_interval_secs: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            approval_expiry_minutes: 30,
            expiry_sweep_interval_secs: 60,
        }
    }
}

/// Result of submitting an action for governance.
#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    pub decision: PolicyDecision,
    /// Present when the disposition is `require_approval`.
    pub approval: Option<Approval>,
}

/// Convenience view of a submit for callers that just need to proceed,
/// wait, or stop.
#[derive(Clone, Debug)]
pub enum Authorization {
    /// Cleared to apply now (auto-approved or human-granted).
    Granted { decision: PolicyDecision },
    /// Queued; the caller must wait for a grant before applying.
    Pending { approval: Approval },
}

/// The three-layer policy gate. Shared behind an `Arc`; the approval store
/// mutates only under its own lock.
pub struct GovernanceEngine {
    policies: PolicyStore,
    approvals: Arc<ApprovalQueue>,
    tier: RwLock<AutonomyTier>,
    mesh: TriggerMesh,
    config: GovernanceConfig,
}

impl GovernanceEngine {
    pub fn new(policies: PolicyStore, mesh: TriggerMesh, config: GovernanceConfig) -> Arc<Self> {
        Arc::new(Self {
            policies,
            approvals: Arc::new(ApprovalQueue::new()),
            tier: RwLock::new(AutonomyTier::default()),
            mesh,
            config,
        })
    }

    pub fn approvals(&self) -> &ApprovalQueue {
        &self.approvals
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    pub fn tier(&self) -> AutonomyTier {
        *self.tier.read().expect("tier lock poisoned")
    }

    /// The auto-apply confidence threshold at a tier, honoring a
    /// constitution override.
    pub fn confidence_threshold(&self, tier: AutonomyTier) -> f64 {
        self.policies
            .bundle()
            .and_then(|b| b.constitution.threshold_override(tier.as_u8()))
            .unwrap_or_else(|| tier.default_confidence_threshold())
    }

    /// Whether a fix strategy may skip sandbox verification.
    pub fn is_sandbox_exempt(&self, strategy: &str) -> bool {
        self.policies
            .bundle()
            .map(|b| b.whitelist.is_sandbox_exempt(strategy))
            .unwrap_or(false)
    }

    /// Count an applied file mutation toward the guardrail session ceiling.
    pub fn record_file_modified(&self) {
        if let Some(bundle) = self.policies.bundle() {
            bundle.guardrails.record_file_modified();
        }
    }

    /// Pure evaluation: layer verdicts plus disposition, no side effects.
    pub fn evaluate(&self, request: &ActionRequest) -> PolicyDecision {
        let confidence = request.confidence.clamp(0.0, 1.0);

        let Some(bundle) = self.policies.bundle() else {
            // Fail closed: no policy, no mutation.
            return PolicyDecision {
                compliant: false,
                layer_results: vec![LayerResult::fail(
                    PolicyLayer::Constitution,
                    "policy documents are not loaded; denying all mutating actions",
                )],
                disposition: Disposition::Deny,
                confidence,
                remediations: vec!["load or repair the policy documents, then reload".to_string()],
            };
        };

        let tier = self.tier();
        let layer_results = vec![
            bundle.constitution.evaluate(request),
            bundle.guardrails.evaluate(request),
            bundle.whitelist.evaluate(request, tier),
        ];

        if layer_results.iter().any(|r| !r.passed) {
            let remediations = layer_results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| format!("{}: {}", r.layer, r.rationale))
                .collect();
            return PolicyDecision {
                compliant: false,
                layer_results,
                disposition: Disposition::Deny,
                confidence,
                remediations,
            };
        }

        let kind = request.action_kind.as_str();
        let threshold = self.confidence_threshold(tier);
        let disposition = if bundle.whitelist.is_auto_approvable(kind)
            && tier.allows_auto_apply()
            && confidence >= threshold
        {
            Disposition::AutoApprove
        } else if bundle.constitution.requires_approval(kind) || confidence < threshold {
            Disposition::RequireApproval
        } else {
            Disposition::AutoApprove
        };

        PolicyDecision {
            compliant: true,
            layer_results,
            disposition,
            confidence,
            remediations: Vec::new(),
        }
    }

    /// Evaluate and act on the outcome: audit the decision and, for
    /// `require_approval`, enqueue an approval with the configured expiry.
    pub async fn submit(&self, request: ActionRequest) -> Result<SubmitOutcome, GovernanceError> {
        let decision = self.evaluate(&request);

        match decision.disposition {
            Disposition::Deny => {
                self.publish_decision_event(
                    event_types::APPROVAL_DENIED,
                    &request,
                    serde_json::json!({
                        "request_id": request.id,
                        "action_kind": request.action_kind.as_str(),
                        "rationale": decision.denial_rationale(),
                        "auto": true,
                    }),
                    Severity::High,
                )
                .await?;
                Ok(SubmitOutcome {
                    decision,
                    approval: None,
                })
            }
            Disposition::AutoApprove => {
                self.publish_decision_event(
                    event_types::APPROVAL_GRANTED,
                    &request,
                    serde_json::json!({
                        "request_id": request.id,
                        "action_kind": request.action_kind.as_str(),
                        "auto": true,
                        "confidence": decision.confidence,
                    }),
                    Severity::Info,
                )
                .await?;
                Ok(SubmitOutcome {
                    decision,
                    approval: None,
                })
            }
            Disposition::RequireApproval => {
                let expires_at =
                    Utc::now() + Duration::minutes(self.config.approval_expiry_minutes);
                let approval = Approval::new(request.clone(), expires_at);
                self.approvals.insert(approval.clone());
                self.publish_decision_event(
                    event_types::APPROVAL_REQUESTED,
                    &request,
                    serde_json::json!({ "approval": approval }),
                    Severity::Medium,
                )
                .await?;
                Ok(SubmitOutcome {
                    decision,
                    approval: Some(approval),
                })
            }
        }
    }

    /// Submit and collapse the outcome into proceed / wait / error.
    pub async fn authorize(&self, request: ActionRequest) -> Result<Authorization, CoreError> {
        let correlation = request.correlation_id.clone();
        let outcome = self
            .submit(request)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        match outcome.decision.disposition {
            Disposition::Deny => Err(CoreError::PolicyDenied {
                rationale: outcome
                    .decision
                    .denial_rationale()
                    .unwrap_or("denied by policy")
                    .to_string(),
                remediations: outcome.decision.remediations.clone(),
                correlation_id: Some(correlation),
            }),
            Disposition::AutoApprove => Ok(Authorization::Granted {
                decision: outcome.decision,
            }),
            Disposition::RequireApproval => Ok(Authorization::Pending {
                approval: outcome.approval.expect("require_approval carries an approval"),
            }),
        }
    }

    /// Grant a pending approval. Tier-change requests take effect here.
    pub async fn grant(
        &self,
        id: &ApprovalId,
        approver: ActorId,
        rationale: impl Into<String>,
    ) -> Result<Approval, GovernanceError> {
        let rationale = rationale.into();
        let approval = self
            .approvals
            .settle(id, |a| a.approve(approver.clone(), rationale.clone()))?;

        self.publish_decision_event(
            event_types::APPROVAL_GRANTED,
            &approval.request,
            serde_json::json!({ "approval": approval, "auto": false }),
            Severity::Medium,
        )
        .await?;

        if approval.request.action_kind.as_str() == well_known::SET_AUTONOMY_TIER {
            self.apply_tier_change(&approval).await?;
        }
        Ok(approval)
    }

    pub async fn deny(
        &self,
        id: &ApprovalId,
        approver: ActorId,
        rationale: impl Into<String>,
    ) -> Result<Approval, GovernanceError> {
        let rationale = rationale.into();
        let approval = self
            .approvals
            .settle(id, |a| a.deny(approver.clone(), rationale.clone()))?;
        self.publish_decision_event(
            event_types::APPROVAL_DENIED,
            &approval.request,
            serde_json::json!({ "approval": approval, "auto": false }),
            Severity::Medium,
        )
        .await?;
        Ok(approval)
    }

    /// Grant every pending approval (operator surface).
    pub async fn grant_all(&self, approver: ActorId) -> Vec<Approval> {
        let mut granted = Vec::new();
        for approval in self.approvals.pending() {
            match self
                .grant(&approval.id, approver.clone(), "grant-all")
                .await
            {
                Ok(approval) => granted.push(approval),
                Err(err) => {
                    tracing::warn!(%err, approval = %approval.id, "grant-all skipped approval")
                }
            }
        }
        granted
    }

    /// Expire overdue approvals and audit each transition.
    pub async fn expire_due(&self) -> Result<Vec<Approval>, GovernanceError> {
        let expired = self.approvals.expire_due(Utc::now());
        for approval in &expired {
            self.publish_decision_event(
                event_types::APPROVAL_EXPIRED,
                &approval.request,
                serde_json::json!({ "approval": approval }),
                Severity::Medium,
            )
            .await?;
        }
        Ok(expired)
    }

    /// Periodic expiry sweep, run for the life of the process.
    pub fn run_expiry_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let interval = std::time::Duration::from_secs(self.config.expiry_sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match engine.expire_due().await {
                    Ok(expired) if !expired.is_empty() => {
                        tracing::info!(count = expired.len(), "expired overdue approvals");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(%err, "approval expiry sweep failed"),
                }
            }
        })
    }

    /// Submit a tier change as a governed action on behalf of `actor`.
    pub async fn request_tier_change(
        &self,
        actor: ActorId,
        target: AutonomyTier,
    ) -> Result<SubmitOutcome, GovernanceError> {
        let request = ActionRequest::new(
            actor,
            alder_types::ActionKind::new(well_known::SET_AUTONOMY_TIER),
            "governance/autonomy",
            alder_types::RiskTier::High,
        )
        .with_payload(serde_json::json!({ "tier": target.as_u8() }))
        .with_confidence(1.0);

        let outcome = self.submit(request).await?;
        if outcome.decision.disposition == Disposition::AutoApprove {
            if let Some(tier) = AutonomyTier::from_u8(target.as_u8()) {
                self.set_tier_internal(tier).await?;
            }
        }
        Ok(outcome)
    }

    async fn apply_tier_change(&self, approval: &Approval) -> Result<(), GovernanceError> {
        let Some(tier) = approval
            .request
            .payload
            .get("tier")
            .and_then(|v| v.as_u64())
            .and_then(|n| AutonomyTier::from_u8(n as u8))
        else {
            tracing::warn!(approval = %approval.id, "tier-change approval without a valid tier");
            return Ok(());
        };
        self.set_tier_internal(tier).await
    }

    async fn set_tier_internal(&self, tier: AutonomyTier) -> Result<(), GovernanceError> {
        let previous = {
            let mut guard = self.tier.write().expect("tier lock poisoned");
            std::mem::replace(&mut *guard, tier)
        };
        tracing::info!(from = %previous, to = %tier, "autonomy tier changed");
        let event = Event::new(event_types::AUTONOMY_CHANGED, ComponentId::new(COMPONENT))
            .with_severity(Severity::High)
            .with_payload(serde_json::json!({
                "from": previous.as_u8(),
                "to": tier.as_u8(),
            }));
        self.mesh.publish(event).await?;
        Ok(())
    }

    /// Rebuild the approval queue from the full audit stream (startup).
    pub async fn rebuild_from_audit(&self) -> Result<(), GovernanceError> {
        let audit = self.mesh.audit();
        let len = audit.len().await;
        let entries = audit
            .read_range(0, len)
            .await
            .map_err(|e| GovernanceError::PolicyNotLoaded(e.to_string()))?;
        self.approvals.replay(&entries);
        Ok(())
    }

    async fn publish_decision_event(
        &self,
        event_type: &str,
        request: &ActionRequest,
        payload: serde_json::Value,
        severity: Severity,
    ) -> Result<(), GovernanceError> {
        let event = Event::new(event_type, ComponentId::new(COMPONENT))
            .with_actor(request.actor.clone())
            .with_resource(request.resource.clone())
            .with_severity(severity)
            .with_correlation(request.correlation_id.clone())
            .with_payload(payload);
        self.mesh.publish(event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constitution::ConstitutionDoc;
    use crate::guardrails::GuardrailsDoc;
    use crate::whitelist::WhitelistDoc;
    use alder_audit::AuditLog;
    use alder_types::{ActionKind, RiskTier};

    fn constitution() -> ConstitutionDoc {
        serde_yaml::from_str(
            r#"
version: "1.0"
action_catalog:
  never_allowed: ["delete_audit_log"]
  requires_approval: ["deploy_service"]
"#,
        )
        .unwrap()
    }

    fn guardrails() -> GuardrailsDoc {
        serde_yaml::from_str(
            r#"
filesystem:
  forbidden_directories: ["/etc"]
"#,
        )
        .unwrap()
    }

    fn whitelist() -> WhitelistDoc {
        serde_yaml::from_str(
            r#"
per_tier_actions:
  "0": ["set_autonomy_tier"]
  "2": ["apply_code_patch", "revert_code_patch", "deploy_service"]
auto_approve_actions: ["apply_code_patch", "revert_code_patch"]
"#,
        )
        .unwrap()
    }

    async fn engine() -> (Arc<GovernanceEngine>, TriggerMesh, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);
        let store =
            PolicyStore::from_documents(constitution(), guardrails(), whitelist()).unwrap();
        let engine = GovernanceEngine::new(store, mesh.clone(), GovernanceConfig::default());
        (engine, mesh, dir)
    }

    fn patch_request(confidence: f64) -> ActionRequest {
        ActionRequest::new(
            ActorId::system(),
            ActionKind::new("apply_code_patch"),
            "src/a.py",
            RiskTier::Medium,
        )
        .with_confidence(confidence)
    }

    async fn raise_to_semi_autonomous(engine: &Arc<GovernanceEngine>) {
        let outcome = engine
            .request_tier_change(ActorId::new("operator"), AutonomyTier::SemiAutonomous)
            .await
            .unwrap();
        // set_autonomy_tier is not auto-approvable; grant it.
        if let Some(approval) = outcome.approval {
            engine
                .grant(&approval.id, ActorId::new("operator"), "raising tier")
                .await
                .unwrap();
        }
        assert_eq!(engine.tier(), AutonomyTier::SemiAutonomous);
    }

    #[tokio::test]
    async fn fail_closed_without_policies() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);
        let (store, _) = PolicyStore::open(dir.path().join("nonexistent"));
        let engine = GovernanceEngine::new(store, mesh, GovernanceConfig::default());

        let decision = engine.evaluate(&patch_request(0.99));
        assert_eq!(decision.disposition, Disposition::Deny);
    }

    #[tokio::test]
    async fn guardrail_denial_is_audited() {
        let (engine, mesh, _dir) = engine().await;
        raise_to_semi_autonomous(&engine).await;

        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new("apply_code_patch"),
            "/etc/shadow",
            RiskTier::High,
        )
        .with_confidence(0.9);

        let result = engine.authorize(request).await;
        assert!(matches!(result, Err(CoreError::PolicyDenied { .. })));

        let entries = mesh.audit().read_recent(5).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::APPROVAL_DENIED));
    }

    #[tokio::test]
    async fn high_confidence_patch_auto_approves_at_tier_two() {
        let (engine, mesh, _dir) = engine().await;
        raise_to_semi_autonomous(&engine).await;

        let outcome = engine.submit(patch_request(0.9)).await.unwrap();
        assert_eq!(outcome.decision.disposition, Disposition::AutoApprove);

        let entries = mesh.audit().read_recent(5).await.unwrap();
        assert!(entries.iter().any(|e| {
            e.event.event_type.as_str() == event_types::APPROVAL_GRANTED
                && e.event.payload["auto"] == serde_json::json!(true)
        }));
    }

    #[tokio::test]
    async fn low_confidence_requires_approval_even_when_auto_listed() {
        let (engine, _mesh, _dir) = engine().await;
        raise_to_semi_autonomous(&engine).await;

        let outcome = engine.submit(patch_request(0.2)).await.unwrap();
        assert_eq!(outcome.decision.disposition, Disposition::RequireApproval);
        assert_eq!(engine.approvals().pending().len(), 1);
    }

    #[tokio::test]
    async fn auto_apply_is_blocked_below_semi_autonomous() {
        let (engine, _mesh, _dir) = engine().await;
        // Default tier is supervised; apply_code_patch is not whitelisted
        // at that tier at all.
        let decision = engine.evaluate(&patch_request(0.99));
        assert_eq!(decision.disposition, Disposition::Deny);
    }

    #[tokio::test]
    async fn granting_a_tier_change_applies_it() {
        let (engine, mesh, _dir) = engine().await;
        assert_eq!(engine.tier(), AutonomyTier::Supervised);
        raise_to_semi_autonomous(&engine).await;

        let entries = mesh.audit().read_recent(10).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::AUTONOMY_CHANGED));
    }

    #[tokio::test]
    async fn expiry_settles_and_audits() {
        let (engine, mesh, _dir) = engine().await;
        raise_to_semi_autonomous(&engine).await;

        let outcome = engine.submit(patch_request(0.2)).await.unwrap();
        let approval = outcome.approval.unwrap();

        // Force the deadline into the past and sweep.
        engine
            .approvals()
            .settle(&approval.id, |a| {
                a.expires_at = Utc::now() - Duration::seconds(1);
                Ok(())
            })
            .unwrap();
        let expired = engine.expire_due().await.unwrap();
        assert_eq!(expired.len(), 1);

        let entries = mesh.audit().read_recent(5).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::APPROVAL_EXPIRED));
    }

    #[tokio::test]
    async fn queue_rebuilds_from_the_audit_stream() {
        let (engine, mesh, _dir) = engine().await;
        raise_to_semi_autonomous(&engine).await;

        let first = engine
            .submit(patch_request(0.2))
            .await
            .unwrap()
            .approval
            .unwrap();
        let second = engine
            .submit(patch_request(0.3))
            .await
            .unwrap()
            .approval
            .unwrap();
        engine
            .grant(&first.id, ActorId::new("operator"), "fine")
            .await
            .unwrap();

        // A second engine over the same stream reconstructs the queue.
        let store =
            PolicyStore::from_documents(constitution(), guardrails(), whitelist()).unwrap();
        let rebuilt = GovernanceEngine::new(store, mesh.clone(), GovernanceConfig::default());
        rebuilt.rebuild_from_audit().await.unwrap();

        assert_eq!(
            rebuilt.approvals().get(&first.id).unwrap().state,
            alder_types::ApprovalState::Approved
        );
        assert_eq!(
            rebuilt.approvals().get(&second.id).unwrap().state,
            alder_types::ApprovalState::Pending
        );
    }
}
