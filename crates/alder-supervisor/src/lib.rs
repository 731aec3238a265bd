//! Alder resilient supervisor.
//!
//! Starts declared components in order, each under a timeout. A failed
//! start is classified; when the classification maps to an edit recipe the
//! supervisor routes a fix through the proposer (and therefore through
//! governance and the sandbox) before retrying. Optional components
//! degrade after the retry budget; critical ones abort startup. Every
//! retry, fix, and abort lands in the audit stream.

#![deny(unsafe_code)]

use alder_mesh::TriggerMesh;
use alder_proposer::{ErrorContext, FixProposer};
use alder_types::{
    event_types, ComponentId, CoreError, CorrelationId, ErrorClassification, ErrorSignature,
    Event, RecipeKind, Severity,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A startable platform component.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Critical components abort startup when they cannot be started;
    /// optional ones degrade.
    fn critical(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<(), ComponentFailure>;
}

/// A classified startup failure.
#[derive(Clone, Debug)]
pub struct ComponentFailure {
    pub classification: ErrorClassification,
    pub error_class: String,
    pub message: String,
    /// The artifact responsible, when the failure points at one.
    pub artifact: Option<String>,
    pub line: u32,
}

impl ComponentFailure {
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self {
            classification: ErrorClassification::Unknown,
            error_class: "StartupError".to_string(),
            message: message.into(),
            artifact: None,
            line: 0,
        }
    }
}

/// Supervisor knobs.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub start_timeout: Duration,
    pub max_retries: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Outcome of a full startup pass.
#[derive(Clone, Debug, Default)]
pub struct StartupSummary {
    pub started: Vec<String>,
    /// Optional components that exhausted their retries.
    pub degraded: Vec<String>,
}

/// Drives ordered, self-healing component startup.
pub struct ResilientSupervisor {
    mesh: TriggerMesh,
    proposer: Arc<FixProposer>,
    config: SupervisorConfig,
}

impl ResilientSupervisor {
    pub fn new(mesh: TriggerMesh, proposer: Arc<FixProposer>, config: SupervisorConfig) -> Self {
        Self {
            mesh,
            proposer,
            config,
        }
    }

    /// Start every component in declaration order.
    pub async fn start_all(
        &self,
        components: &[Arc<dyn Component>],
    ) -> Result<StartupSummary, CoreError> {
        let mut summary = StartupSummary::default();
        for component in components {
            match self.start_one(component.as_ref()).await? {
                true => summary.started.push(component.name().to_string()),
                false => summary.degraded.push(component.name().to_string()),
            }
        }
        Ok(summary)
    }

    /// Returns `Ok(true)` when started, `Ok(false)` when degraded, and an
    /// error when a critical component cannot be brought up.
    async fn start_one(&self, component: &dyn Component) -> Result<bool, CoreError> {
        let correlation = CorrelationId::generate();
        let mut last_message = String::new();

        for attempt in 0..=self.config.max_retries {
            let started = tokio::time::timeout(self.config.start_timeout, component.start()).await;
            let failure = match started {
                Ok(Ok(())) => {
                    if attempt > 0 {
                        tracing::info!(component = component.name(), attempt, "component recovered");
                    }
                    return Ok(true);
                }
                Ok(Err(failure)) => failure,
                Err(_) => ComponentFailure {
                    classification: ErrorClassification::Timeout,
                    error_class: "StartTimeout".to_string(),
                    message: format!(
                        "start() exceeded {}s",
                        self.config.start_timeout.as_secs()
                    ),
                    artifact: None,
                    line: 0,
                },
            };
            last_message = failure.message.clone();

            self.audit_startup_error(component, &failure, attempt, &correlation)
                .await?;

            if attempt < self.config.max_retries {
                self.try_auto_fix(&failure, &correlation).await;
            }
        }

        if component.critical() {
            Err(CoreError::ComponentStartupFailure {
                component: component.name().to_string(),
                detail: last_message,
            })
        } else {
            tracing::warn!(
                component = component.name(),
                "optional component degraded after retries"
            );
            self.mesh
                .publish(
                    Event::new(event_types::WARNING_RAISED, ComponentId::new("supervisor"))
                        .with_severity(Severity::Medium)
                        .with_correlation(correlation)
                        .with_payload(serde_json::json!({
                            "component": component.name(),
                            "reason": "degraded_after_retries",
                            "detail": last_message,
                        })),
                )
                .await
                .map_err(|e| CoreError::internal(e.to_string()))?;
            Ok(false)
        }
    }

    /// Route a classified failure through the proposer when a recipe
    /// exists. Fix application is fully governed there; a denial or
    /// sandbox failure simply leaves the next retry to fail again.
    async fn try_auto_fix(&self, failure: &ComponentFailure, correlation: &CorrelationId) {
        let Some(artifact) = &failure.artifact else {
            return;
        };
        if RecipeKind::candidates_for(failure.classification).is_empty() {
            return;
        }
        let signature = ErrorSignature {
            classification: failure.classification,
            error_class: failure.error_class.clone(),
            file: artifact.clone(),
            line: failure.line,
        };
        let context = ErrorContext {
            error_class: failure.error_class.clone(),
            message: failure.message.clone(),
            line: failure.line,
        };
        match self
            .proposer
            .propose(&signature, &context, correlation.clone())
            .await
        {
            Ok(Some(attempt)) if attempt.applied => {
                tracing::info!(artifact, strategy = %attempt.strategy_kind, "startup auto-fix applied");
            }
            Ok(_) => {
                tracing::debug!(artifact, "startup auto-fix not applied");
            }
            Err(err) => {
                tracing::warn!(%err, artifact, "startup auto-fix errored");
            }
        }
    }

    async fn audit_startup_error(
        &self,
        component: &dyn Component,
        failure: &ComponentFailure,
        attempt: u32,
        correlation: &CorrelationId,
    ) -> Result<(), CoreError> {
        let signature = failure.artifact.as_ref().map(|artifact| {
            ErrorSignature {
                classification: failure.classification,
                error_class: failure.error_class.clone(),
                file: artifact.clone(),
                line: failure.line,
            }
        });
        self.mesh
            .publish(
                Event::new(event_types::STARTUP_ERROR, ComponentId::new("supervisor"))
                    .with_severity(Severity::High)
                    .with_correlation(correlation.clone())
                    .with_payload(serde_json::json!({
                        "component": component.name(),
                        "attempt": attempt,
                        "classification": failure.classification.as_str(),
                        "message": failure.message,
                        "signature": signature,
                    })),
            )
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditLog;
    use alder_governance::{GovernanceConfig, GovernanceEngine, PolicyStore};
    use alder_learning::LearningStore;
    use alder_proposer::ProposerConfig;
    use alder_sandbox::{SandboxExecutor, ScriptedSandbox};
    use alder_types::{ActorId, AutonomyTier, HealingAttempt, SandboxOutcome};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyComponent {
        name: String,
        critical: bool,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl Component for FlakyComponent {
        fn name(&self) -> &str {
            &self.name
        }

        fn critical(&self) -> bool {
            self.critical
        }

        async fn start(&self) -> Result<(), ComponentFailure> {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(ComponentFailure::unclassified("not ready"))
            } else {
                Ok(())
            }
        }
    }

    /// Fails with an incorrect-await classification until the artifact no
    /// longer contains `await `.
    struct AwaitComponent {
        root: std::path::PathBuf,
    }

    #[async_trait]
    impl Component for AwaitComponent {
        fn name(&self) -> &str {
            "worker-pool"
        }

        async fn start(&self) -> Result<(), ComponentFailure> {
            let content = std::fs::read_to_string(self.root.join("src/worker.py"))
                .map_err(|e| ComponentFailure::unclassified(e.to_string()))?;
            if content.contains("await ") {
                Err(ComponentFailure {
                    classification: ErrorClassification::IncorrectAwait,
                    error_class: "TypeError".to_string(),
                    message: "object dict can't be used in 'await' expression".to_string(),
                    artifact: Some("src/worker.py".to_string()),
                    line: 1,
                })
            } else {
                Ok(())
            }
        }
    }

    async fn fixture() -> (ResilientSupervisor, TriggerMesh, Arc<LearningStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);

        let constitution = serde_yaml::from_str("version: \"1.0\"").unwrap();
        let guardrails = serde_yaml::from_str("{}").unwrap();
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
        let governance = GovernanceEngine::new(store, mesh.clone(), GovernanceConfig::default());
        let outcome = governance
            .request_tier_change(ActorId::new("operator"), AutonomyTier::SemiAutonomous)
            .await
            .unwrap();
        if let Some(approval) = outcome.approval {
            governance
                .grant(&approval.id, ActorId::new("operator"), "setup")
                .await
                .unwrap();
        }

        let learning = Arc::new(LearningStore::new());
        let sandbox: Arc<dyn SandboxExecutor> = Arc::new(ScriptedSandbox::new());
        let proposer = FixProposer::new(
            mesh.clone(),
            governance,
            Arc::clone(&learning),
            sandbox,
            ProposerConfig::new(dir.path()),
        );
        let supervisor = ResilientSupervisor::new(
            mesh.clone(),
            proposer,
            SupervisorConfig {
                start_timeout: Duration::from_secs(5),
                max_retries: 2,
            },
        );
        (supervisor, mesh, learning, dir)
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retries() {
        let (supervisor, mesh, _learning, _dir) = fixture().await;
        let component: Arc<dyn Component> = Arc::new(FlakyComponent {
            name: "cache".to_string(),
            critical: true,
            failures_left: AtomicU32::new(1),
        });

        let summary = supervisor.start_all(&[component]).await.unwrap();
        assert_eq!(summary.started, vec!["cache"]);

        let entries = mesh.audit().read_recent(10).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::STARTUP_ERROR));
    }

    #[tokio::test]
    async fn optional_component_degrades() {
        let (supervisor, mesh, _learning, _dir) = fixture().await;
        let component: Arc<dyn Component> = Arc::new(FlakyComponent {
            name: "metrics".to_string(),
            critical: false,
            failures_left: AtomicU32::new(100),
        });

        let summary = supervisor.start_all(&[component]).await.unwrap();
        assert_eq!(summary.degraded, vec!["metrics"]);

        let entries = mesh.audit().read_recent(10).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::WARNING_RAISED));
    }

    #[tokio::test]
    async fn critical_component_aborts_startup() {
        let (supervisor, _mesh, _learning, _dir) = fixture().await;
        let component: Arc<dyn Component> = Arc::new(FlakyComponent {
            name: "audit".to_string(),
            critical: true,
            failures_left: AtomicU32::new(100),
        });

        let result = supervisor.start_all(&[component]).await;
        assert!(matches!(
            result,
            Err(CoreError::ComponentStartupFailure { .. })
        ));
    }

    #[tokio::test]
    async fn classified_failure_is_fixed_and_retried() {
        let (supervisor, mesh, learning, dir) = fixture().await;
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/worker.py"), "result = await fetch()\n").unwrap();

        // Seed the strategy so the fix auto-approves.
        let signature = ErrorSignature {
            classification: ErrorClassification::IncorrectAwait,
            error_class: "TypeError".into(),
            file: "src/worker.py".into(),
            line: 1,
        };
        learning.observe_error(&signature);
        for _ in 0..5 {
            let mut attempt = HealingAttempt::new(
                signature.key(),
                RecipeKind::RemoveIncorrectAwait,
                "src/worker.py",
                CorrelationId::generate(),
            );
            attempt.sandbox_outcome = SandboxOutcome::Passed;
            attempt.applied = true;
            learning.record_attempt(&attempt);
        }

        let component: Arc<dyn Component> = Arc::new(AwaitComponent {
            root: dir.path().to_path_buf(),
        });
        let summary = supervisor.start_all(&[component]).await.unwrap();
        assert_eq!(summary.started, vec!["worker-pool"]);

        let content = std::fs::read_to_string(dir.path().join("src/worker.py")).unwrap();
        assert_eq!(content, "result = fetch()\n");

        let entries = mesh.audit().read_recent(20).await.unwrap();
        let types: Vec<&str> = entries
            .iter()
            .map(|e| e.event.event_type.as_str())
            .collect();
        assert!(types.contains(&event_types::STARTUP_ERROR));
        assert!(types.contains(&event_types::FIX_APPLIED));
    }
}
