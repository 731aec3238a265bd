//! The proposer itself: propose → approve → sandbox → apply → (revert).

use crate::recipes::{apply_recipe, ErrorContext};
use crate::snapshot::{content_hash, SnapshotStore};
use crate::ProposerError;
use alder_governance::{Authorization, GovernanceEngine};
use alder_learning::LearningStore;
use alder_mesh::TriggerMesh;
use alder_sandbox::{ResourceCeilings, SandboxExecutor, SandboxRequest, VerificationPredicate};
use alder_types::action::well_known;
use alder_types::{
    event_types, ActionKind, ActionRequest, ActorId, ApprovalId, ApprovalState, CandidatePatch,
    ComponentId, CoreError, CorrelationId, ErrorSignature, Event, HealingAttempt, RecipeKind,
    RiskTier, SandboxOutcome, Severity,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const COMPONENT: &str = "proposer";

/// Proposer knobs.
#[derive(Clone, Debug)]
pub struct ProposerConfig {
    /// Artifact paths in events and patches are relative to this root.
    pub root_dir: PathBuf,
    /// Verification driver argv; `{target}` expands to the artifact path.
    pub verification_command: Vec<String>,
    pub ceilings: ResourceCeilings,
    pub snapshot_dir: PathBuf,
    /// How many ranked strategies to try per error.
    pub strategies_per_error: usize,
}

impl ProposerConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let snapshot_dir = root_dir.join(".alder-snapshots");
        Self {
            root_dir,
            verification_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "py_compile".to_string(),
                "{target}".to_string(),
            ],
            ceilings: ResourceCeilings::default(),
            snapshot_dir,
            strategies_per_error: 3,
        }
    }
}

/// A fix that cleared proposal but is waiting on a human approval.
#[derive(Clone, Debug)]
struct PreparedFix {
    patch: CandidatePatch,
    signature_key: String,
    strategy: RecipeKind,
    correlation_id: CorrelationId,
}

/// Maps classified errors to governed, sandbox-verified patches.
pub struct FixProposer {
    mesh: TriggerMesh,
    governance: Arc<GovernanceEngine>,
    learning: Arc<LearningStore>,
    sandbox: Arc<dyn SandboxExecutor>,
    snapshots: SnapshotStore,
    config: ProposerConfig,
    pending: Mutex<HashMap<String, PreparedFix>>,
    applied: Mutex<HashMap<String, HealingAttempt>>,
}

impl FixProposer {
    pub fn new(
        mesh: TriggerMesh,
        governance: Arc<GovernanceEngine>,
        learning: Arc<LearningStore>,
        sandbox: Arc<dyn SandboxExecutor>,
        config: ProposerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            mesh,
            governance,
            learning,
            sandbox,
            snapshots: SnapshotStore::new(&config.snapshot_dir),
            config,
            pending: Mutex::new(HashMap::new()),
            applied: Mutex::new(HashMap::new()),
        })
    }

    /// Entry point for `error.detected` events.
    pub async fn handle_error_event(
        &self,
        event: &Event,
    ) -> Result<Option<HealingAttempt>, CoreError> {
        let signature: ErrorSignature =
            serde_json::from_value(event.payload["signature"].clone())
                .map_err(|_| CoreError::internal(ProposerError::MalformedEvent("signature").to_string()))?;
        let context = ErrorContext {
            error_class: signature.error_class.clone(),
            message: event.payload["message"].as_str().unwrap_or("").to_string(),
            line: signature.line,
        };
        self.propose(&signature, &context, event.correlation_id.clone())
            .await
    }

    /// Rank strategies, render a patch, and walk it through governance.
    pub async fn propose(
        &self,
        signature: &ErrorSignature,
        context: &ErrorContext,
        correlation_id: CorrelationId,
    ) -> Result<Option<HealingAttempt>, CoreError> {
        let key = signature.key();
        let target = signature.file.clone();
        let content = match tokio::fs::read_to_string(self.abs_path(&target)).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(%err, target, "cannot read artifact; skipping proposal");
                return Ok(None);
            }
        };

        let ranked = self
            .learning
            .top_strategies(&key, self.config.strategies_per_error);
        let Some((strategy, patch, confidence)) = ranked.iter().find_map(|s| {
            apply_recipe(s.strategy_kind, &target, &content, context)
                .map(|patch| (s.strategy_kind, patch, s.smoothed_success_rate()))
        }) else {
            tracing::debug!(pattern = %key, "no applicable strategy for error");
            return Ok(None);
        };

        self.publish(
            Event::new(event_types::FIX_PROPOSED, ComponentId::new(COMPONENT))
                .with_resource(target.clone())
                .with_severity(Severity::Medium)
                .with_correlation(correlation_id.clone())
                .with_payload(serde_json::json!({
                    "signature": key,
                    "strategy": strategy.as_str(),
                    "description": patch.description,
                    "confidence": confidence,
                })),
        )
        .await?;

        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new(well_known::APPLY_CODE_PATCH),
            target.clone(),
            RiskTier::Medium,
        )
        .with_confidence(confidence)
        .with_correlation(correlation_id.clone())
        .with_payload(serde_json::json!({
            "new_content": patch.new_content,
            "old_content_hash": patch.old_content_hash,
            "strategy": strategy.as_str(),
            "signature": key,
            "description": patch.description,
        }));

        match self.governance.authorize(request).await {
            Ok(Authorization::Granted { .. }) => {
                let prepared = PreparedFix {
                    patch,
                    signature_key: key,
                    strategy,
                    correlation_id,
                };
                Ok(Some(self.verify_and_apply(prepared).await?))
            }
            Ok(Authorization::Pending { approval }) => {
                let prepared = PreparedFix {
                    patch,
                    signature_key: key,
                    strategy,
                    correlation_id,
                };
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .insert(approval.id.0.clone(), prepared);
                tracing::info!(approval = %approval.id, "fix queued for approval");
                Ok(None)
            }
            Err(CoreError::PolicyDenied { rationale, .. }) => {
                let mut attempt =
                    HealingAttempt::new(key, strategy, target, correlation_id);
                attempt.sandbox_outcome = SandboxOutcome::Blocked;
                self.learning.record_attempt(&attempt);
                tracing::info!(%rationale, "fix blocked by governance");
                Ok(Some(attempt))
            }
            Err(other) => Err(other),
        }
    }

    /// Apply a previously queued fix once its approval settles. Expired or
    /// denied approvals never apply.
    pub async fn apply_approved(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Option<HealingAttempt>, CoreError> {
        let approval = self
            .governance
            .approvals()
            .get(approval_id)
            .ok_or_else(|| CoreError::internal(format!("unknown approval {approval_id}")))?;

        match approval.state {
            ApprovalState::Approved => {}
            ApprovalState::Pending => {
                return Err(CoreError::internal(format!(
                    "approval {approval_id} has not been granted"
                )))
            }
            ApprovalState::Expired => {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&approval_id.0);
                return Err(CoreError::ApprovalExpired {
                    approval_id: approval_id.0.clone(),
                });
            }
            ApprovalState::Denied => {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&approval_id.0);
                return Ok(None);
            }
        }

        let prepared = {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            pending.remove(&approval_id.0)
        };
        // After a restart the in-memory map is gone; the approval's own
        // request payload carries everything needed to reconstruct.
        let prepared = match prepared {
            Some(prepared) => prepared,
            None => {
                let payload = &approval.request.payload;
                let new_content = payload["new_content"].as_str().unwrap_or_default();
                let strategy: RecipeKind =
                    serde_json::from_value(payload["strategy"].clone())
                        .unwrap_or(RecipeKind::RemoveIncorrectAwait);
                PreparedFix {
                    patch: CandidatePatch::whole_file(
                        approval.request.resource.clone(),
                        payload["old_content_hash"].as_str().unwrap_or_default(),
                        new_content,
                        payload["description"].as_str().unwrap_or_default(),
                    ),
                    signature_key: payload["signature"].as_str().unwrap_or_default().to_string(),
                    strategy,
                    correlation_id: approval.request.correlation_id.clone(),
                }
            }
        };

        Ok(Some(self.verify_and_apply(prepared).await?))
    }

    /// React to `approval.granted` events for code patches.
    pub async fn handle_approval_event(&self, event: &Event) -> Result<(), CoreError> {
        let Ok(approval) = serde_json::from_value::<alder_types::Approval>(
            event.payload["approval"].clone(),
        ) else {
            return Ok(()); // auto-approvals carry no approval object
        };
        if approval.request.action_kind.as_str() != well_known::APPLY_CODE_PATCH {
            return Ok(());
        }
        if approval.state != ApprovalState::Approved {
            return Ok(());
        }
        match self.apply_approved(&approval.id).await {
            Ok(_) => Ok(()),
            Err(CoreError::ApprovalExpired { .. }) => Ok(()),
            Err(err) => {
                tracing::error!(%err, approval = %approval.id, "approved fix failed to apply");
                Ok(())
            }
        }
    }

    async fn verify_and_apply(
        &self,
        prepared: PreparedFix,
    ) -> Result<HealingAttempt, CoreError> {
        let PreparedFix {
            patch,
            signature_key,
            strategy,
            correlation_id,
        } = prepared;

        let mut attempt = HealingAttempt::new(
            signature_key,
            strategy,
            patch.target.clone(),
            correlation_id.clone(),
        );

        if self.governance.is_sandbox_exempt(strategy.as_str()) {
            attempt.sandbox_outcome = SandboxOutcome::Passed;
        } else {
            let command = self
                .config
                .verification_command
                .iter()
                .map(|arg| arg.replace("{target}", &patch.target))
                .collect::<Vec<_>>();
            let request = SandboxRequest {
                files: vec![alder_sandbox::SandboxFile {
                    relative_path: patch.target.clone(),
                    content: patch.new_content.clone(),
                    read_only: false,
                }],
                command,
                ceilings: self.config.ceilings.clone(),
                predicate: VerificationPredicate::ExitZero,
                correlation_id: correlation_id.clone(),
                cancel: alder_sandbox::CancellationToken::new(),
            };

            let report = self
                .sandbox
                .run(request)
                .await
                .map_err(|e| CoreError::SandboxFailure {
                    detail: e.to_string(),
                    correlation_id: Some(correlation_id.clone()),
                })?;
            attempt.sandbox_outcome = report.outcome;

            if !report.passed() {
                self.publish(
                    Event::new(event_types::SANDBOX_FAILED, ComponentId::new(COMPONENT))
                        .with_resource(patch.target.clone())
                        .with_severity(Severity::Medium)
                        .with_correlation(correlation_id.clone())
                        .with_payload(serde_json::json!({
                            "attempt": attempt,
                            "exit_status": report.exit_status,
                            "stderr": report.stderr,
                        })),
                )
                .await?;
                self.learning.record_attempt(&attempt);
                return Ok(attempt);
            }

            self.publish(
                Event::new(event_types::SANDBOX_PASSED, ComponentId::new(COMPONENT))
                    .with_resource(patch.target.clone())
                    .with_severity(Severity::Info)
                    .with_correlation(correlation_id.clone())
                    .with_payload(serde_json::json!({
                        "strategy": strategy.as_str(),
                        "wall_ms": report.usage.wall_ms,
                    })),
            )
            .await?;
        }

        // Concurrency safety: the artifact must still be what the patch
        // was rendered against.
        let path = self.abs_path(&patch.target);
        let current = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::internal(format!("read {}: {e}", patch.target)))?;
        if content_hash(&current) != patch.old_content_hash {
            tracing::warn!(target = %patch.target, "artifact changed since proposal; not applying");
            self.publish(
                Event::new(event_types::WARNING_RAISED, ComponentId::new(COMPONENT))
                    .with_resource(patch.target.clone())
                    .with_severity(Severity::Medium)
                    .with_correlation(correlation_id.clone())
                    .with_payload(serde_json::json!({
                        "reason": "stale_artifact",
                        "attempt": attempt,
                    })),
            )
            .await?;
            self.learning.record_attempt(&attempt);
            return Ok(attempt);
        }

        self.snapshots
            .capture(&path.to_string_lossy(), &current)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        tokio::fs::write(&path, &patch.new_content)
            .await
            .map_err(|e| CoreError::internal(format!("write {}: {e}", patch.target)))?;
        self.governance.record_file_modified();
        attempt.applied = true;

        self.publish(
            Event::new(event_types::FIX_APPLIED, ComponentId::new(COMPONENT))
                .with_resource(patch.target.clone())
                .with_severity(Severity::Medium)
                .with_correlation(correlation_id)
                .with_payload(serde_json::json!({
                    "attempt": attempt,
                    "description": patch.description,
                })),
        )
        .await?;
        self.learning.record_attempt(&attempt);
        self.applied
            .lock()
            .expect("applied map poisoned")
            .insert(patch.target.clone(), attempt.clone());
        Ok(attempt)
    }

    /// Revert the last applied fix on `target`. Reverting is pre-authorized
    /// by the approval that admitted the fix, so no new submission happens;
    /// the revert is audited and counted against the strategy.
    pub async fn revert(&self, target: &str) -> Result<HealingAttempt, CoreError> {
        let original = {
            let applied = self.applied.lock().expect("applied map poisoned");
            applied.get(target).cloned()
        }
        .ok_or_else(|| CoreError::internal(format!("no applied fix recorded for {target}")))?;

        let path = self.abs_path(target);
        self.snapshots
            .restore(&path.to_string_lossy())
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;

        let mut reverted = original.clone();
        reverted.reverted = true;
        reverted.completed_at = chrono::Utc::now();

        self.publish(
            Event::new(event_types::FIX_REVERTED, ComponentId::new(COMPONENT))
                .with_resource(target.to_string())
                .with_severity(Severity::High)
                .with_correlation(reverted.correlation_id.clone())
                .with_payload(serde_json::json!({ "attempt": reverted })),
        )
        .await?;
        self.learning.record_attempt(&reverted);
        self.applied
            .lock()
            .expect("applied map poisoned")
            .remove(target);
        Ok(reverted)
    }

    fn abs_path(&self, relative: &str) -> PathBuf {
        self.config.root_dir.join(relative)
    }

    async fn publish(&self, event: Event) -> Result<(), CoreError> {
        self.mesh
            .publish(event)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditLog;
    use alder_governance::{GovernanceConfig, PolicyStore};
    use alder_sandbox::ScriptedSandbox;
    use alder_types::{AutonomyTier, ErrorClassification};

    struct Fixture {
        mesh: TriggerMesh,
        governance: Arc<GovernanceEngine>,
        learning: Arc<LearningStore>,
        sandbox: Arc<ScriptedSandbox>,
        proposer: Arc<FixProposer>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);

        let constitution = serde_yaml::from_str(
            r#"
version: "1.0"
action_catalog:
  never_allowed: ["delete_audit_log"]
"#,
        )
        .unwrap();
        let guardrails = serde_yaml::from_str(
            r#"
filesystem:
  forbidden_directories: ["/etc"]
"#,
        )
        .unwrap();
        let whitelist = serde_yaml::from_str(
            r#"
per_tier_actions:
  "0": ["set_autonomy_tier"]
  "2": ["apply_code_patch", "revert_code_patch"]
auto_approve_actions: ["apply_code_patch", "revert_code_patch"]
"#,
        )
        .unwrap();
        let store = PolicyStore::from_documents(constitution, guardrails, whitelist).unwrap();
        let governance =
            GovernanceEngine::new(store, mesh.clone(), GovernanceConfig::default());

        let outcome = governance
            .request_tier_change(ActorId::new("operator"), AutonomyTier::SemiAutonomous)
            .await
            .unwrap();
        if let Some(approval) = outcome.approval {
            governance
                .grant(&approval.id, ActorId::new("operator"), "test setup")
                .await
                .unwrap();
        }

        let learning = Arc::new(LearningStore::new());
        let sandbox = Arc::new(ScriptedSandbox::new());

        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/worker.py"),
            "result = await fetch()\n",
        )
        .unwrap();

        let proposer = FixProposer::new(
            mesh.clone(),
            Arc::clone(&governance),
            Arc::clone(&learning),
            sandbox.clone() as Arc<dyn SandboxExecutor>,
            ProposerConfig::new(dir.path()),
        );

        Fixture {
            mesh,
            governance,
            learning,
            sandbox,
            proposer,
            _dir: dir,
        }
    }

    fn signature() -> ErrorSignature {
        ErrorSignature {
            classification: ErrorClassification::IncorrectAwait,
            error_class: "TypeError".into(),
            file: "src/worker.py".into(),
            line: 1,
        }
    }

    fn context() -> ErrorContext {
        ErrorContext {
            error_class: "TypeError".into(),
            message: "object dict can't be used in 'await' expression".into(),
            line: 1,
        }
    }

    /// Record enough successes that the smoothed rate clears the
    /// semi-autonomous auto-apply threshold.
    fn season_strategy(f: &Fixture) {
        f.learning.observe_error(&signature());
        for _ in 0..5 {
            let mut attempt = HealingAttempt::new(
                signature().key(),
                RecipeKind::RemoveIncorrectAwait,
                "src/worker.py",
                CorrelationId::generate(),
            );
            attempt.sandbox_outcome = SandboxOutcome::Passed;
            attempt.applied = true;
            f.learning.record_attempt(&attempt);
        }
    }

    #[tokio::test]
    async fn seasoned_strategy_auto_applies_end_to_end() {
        let f = fixture().await;
        season_strategy(&f);

        let correlation = CorrelationId::generate();
        let attempt = f
            .proposer
            .propose(&signature(), &context(), correlation.clone())
            .await
            .unwrap()
            .expect("an attempt should complete");

        assert!(attempt.applied);
        assert_eq!(attempt.sandbox_outcome, SandboxOutcome::Passed);
        assert_eq!(f.sandbox.run_count(), 1);

        let content =
            std::fs::read_to_string(f._dir.path().join("src/worker.py")).unwrap();
        assert_eq!(content, "result = fetch()\n");

        // Ordered trail with a shared correlation id.
        let entries = f.mesh.audit().read_recent(20).await.unwrap();
        let ordered: Vec<&str> = entries
            .iter()
            .filter(|e| e.event.correlation_id == correlation)
            .map(|e| e.event.event_type.as_str())
            .collect();
        assert_eq!(
            ordered,
            vec![
                event_types::FIX_PROPOSED,
                event_types::APPROVAL_GRANTED,
                event_types::SANDBOX_PASSED,
                event_types::FIX_APPLIED,
            ]
        );
    }

    #[tokio::test]
    async fn sandbox_failure_leaves_the_artifact_untouched() {
        let f = fixture().await;
        season_strategy(&f);
        f.sandbox.enqueue_outcome(SandboxOutcome::Failed);

        let attempt = f
            .proposer
            .propose(&signature(), &context(), CorrelationId::generate())
            .await
            .unwrap()
            .unwrap();
        assert!(!attempt.applied);
        assert_eq!(attempt.sandbox_outcome, SandboxOutcome::Failed);

        let content =
            std::fs::read_to_string(f._dir.path().join("src/worker.py")).unwrap();
        assert_eq!(content, "result = await fetch()\n");

        // The failure lowered the strategy's standing.
        let top = f.learning.top_strategies(&signature().key(), 1);
        assert_eq!(top[0].attempts, 6);
        assert_eq!(top[0].successes, 5);
    }

    #[tokio::test]
    async fn fresh_strategy_waits_for_approval_then_applies() {
        let f = fixture().await;
        f.learning.observe_error(&signature());

        let outcome = f
            .proposer
            .propose(&signature(), &context(), CorrelationId::generate())
            .await
            .unwrap();
        assert!(outcome.is_none(), "fresh strategy must queue for approval");

        let pending = f.governance.approvals().pending();
        assert_eq!(pending.len(), 1);

        f.governance
            .grant(&pending[0].id, ActorId::new("operator"), "reviewed")
            .await
            .unwrap();
        let attempt = f
            .proposer
            .apply_approved(&pending[0].id)
            .await
            .unwrap()
            .unwrap();
        assert!(attempt.applied);
    }

    #[tokio::test]
    async fn expired_approval_refuses_to_apply() {
        let f = fixture().await;
        f.learning.observe_error(&signature());
        f.proposer
            .propose(&signature(), &context(), CorrelationId::generate())
            .await
            .unwrap();

        let pending = f.governance.approvals().pending();
        f.governance
            .approvals()
            .settle(&pending[0].id, |a| {
                a.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
                Ok(())
            })
            .unwrap();
        f.governance.expire_due().await.unwrap();

        let result = f.proposer.apply_approved(&pending[0].id).await;
        assert!(matches!(result, Err(CoreError::ApprovalExpired { .. })));
    }

    #[tokio::test]
    async fn revert_restores_the_original_content_hash() {
        let f = fixture().await;
        season_strategy(&f);

        let original_hash = content_hash("result = await fetch()\n");
        f.proposer
            .propose(&signature(), &context(), CorrelationId::generate())
            .await
            .unwrap()
            .unwrap();

        let reverted = f.proposer.revert("src/worker.py").await.unwrap();
        assert!(reverted.reverted);

        let content =
            std::fs::read_to_string(f._dir.path().join("src/worker.py")).unwrap();
        assert_eq!(content_hash(&content), original_hash);

        let entries = f.mesh.audit().read_recent(5).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::FIX_REVERTED));
    }

    #[tokio::test]
    async fn stale_artifact_is_not_overwritten() {
        let f = fixture().await;
        f.learning.observe_error(&signature());
        f.proposer
            .propose(&signature(), &context(), CorrelationId::generate())
            .await
            .unwrap();

        // The file moves on while the approval waits.
        std::fs::write(
            f._dir.path().join("src/worker.py"),
            "completely_different = 1\n",
        )
        .unwrap();

        let pending = f.governance.approvals().pending();
        f.governance
            .grant(&pending[0].id, ActorId::new("operator"), "late")
            .await
            .unwrap();
        let attempt = f
            .proposer
            .apply_approved(&pending[0].id)
            .await
            .unwrap()
            .unwrap();
        assert!(!attempt.applied);

        let content =
            std::fs::read_to_string(f._dir.path().join("src/worker.py")).unwrap();
        assert_eq!(content, "completely_different = 1\n");
    }
}
