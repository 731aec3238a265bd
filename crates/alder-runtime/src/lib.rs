//! Alder composition root.
//!
//! One place wires the whole platform, in dependency order: audit → mesh
//! → governance → (learning, sandbox, proposer, healer, preflight,
//! supervisor, kernels, scheduler). There are no import-time singletons
//! and no back-references; where subsystems must observe each other
//! across that order (the cadence controller reacting to
//! `boot.complete`, the healing loop reacting to `error.detected`), they
//! do it through mesh subscriptions.

#![deny(unsafe_code)]

mod config;
mod policies;

pub use config::RuntimeConfig;
pub use policies::ensure_default_policies;

use alder_audit::AuditLog;
use alder_governance::{GovernanceEngine, PolicyStore};
use alder_healer::{HealerConfig, LogHealer};
use alder_kernels::{KernelGateway, KernelServices, NoteStore, ReadinessBoard};
use alder_learning::LearningStore;
use alder_mesh::{handler, SubscriptionOptions, TriggerMesh};
use alder_preflight::{PreflightReport, PreflightValidator};
use alder_proposer::{FixProposer, ProposerConfig};
use alder_sandbox::{ProcessSandbox, SandboxExecutor};
use alder_scheduler::{CadenceController, Scheduler};
use alder_supervisor::{Component, ResilientSupervisor};
use alder_types::{
    event_types, ComponentId, CoreError, Event, Severity,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Health surface for the daemon and CLI.
#[derive(Clone, Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub uptime_seconds: i64,
    pub audit_entries: u64,
    pub chain_poisoned: bool,
    pub policy_loaded: bool,
    pub components: Vec<ComponentHealth>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub ready: bool,
}

/// The assembled platform.
pub struct AlderRuntime {
    config: RuntimeConfig,
    audit: AuditLog,
    mesh: TriggerMesh,
    governance: Arc<GovernanceEngine>,
    learning: Arc<LearningStore>,
    proposer: Arc<FixProposer>,
    healer: Arc<LogHealer>,
    scheduler: Arc<Scheduler>,
    gateway: Arc<KernelGateway>,
    readiness: Arc<ReadinessBoard>,
    preflight_report: PreflightReport,
    started_at: DateTime<Utc>,
    tasks: Vec<JoinHandle<()>>,
}

impl AlderRuntime {
    /// Bring the platform up. `components` are the deployment's own
    /// startable units, driven through the resilient supervisor after the
    /// core subsystems are wired.
    pub async fn start(
        config: RuntimeConfig,
        components: Vec<Arc<dyn Component>>,
    ) -> Result<Arc<Self>, CoreError> {
        let started_at = Utc::now();
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| CoreError::internal(format!("data dir: {e}")))?;

        // 1. Audit. A broken chain refuses to open; that is fatal by design.
        let audit = AuditLog::open(config.data_dir.join("audit.log"))
            .await
            .map_err(CoreError::from)?;

        // 2. Mesh.
        let mesh = TriggerMesh::new(audit.clone());

        // 3. Governance, fail-closed until policies load.
        let (policies, load_result) = PolicyStore::open(&config.policy_dir);
        if let Err(err) = load_result {
            tracing::error!(%err, "policy load failed; every mutating action will be denied");
        }
        let governance = GovernanceEngine::new(
            policies.clone(),
            mesh.clone(),
            config.governance.clone(),
        );
        governance
            .rebuild_from_audit()
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;

        // 4. Learning: snapshot if present, else rebuild from the stream.
        let snapshot_path = config.data_dir.join("learning.json");
        let learning = Arc::new(match LearningStore::load_from(&snapshot_path) {
            Ok(store) => store,
            Err(_) => {
                let store = LearningStore::new();
                let len = audit.len().await;
                if len > 0 {
                    let entries = audit.read_range(0, len).await.map_err(CoreError::from)?;
                    for entry in &entries {
                        store.apply_audit_entry(entry);
                    }
                    tracing::info!(entries = len, "learning store rebuilt from audit stream");
                }
                store
            }
        });

        // 5. Sandbox and proposer.
        let sandbox: Arc<dyn SandboxExecutor> = Arc::new(ProcessSandbox::new());
        let mut proposer_config = ProposerConfig::new(&config.artifact_root);
        proposer_config.verification_command = config.verification_command.clone();
        proposer_config.snapshot_dir = config.data_dir.join("snapshots");
        let proposer = FixProposer::new(
            mesh.clone(),
            Arc::clone(&governance),
            Arc::clone(&learning),
            sandbox,
            proposer_config,
        );

        // 6. The healing subscription: observe the pattern, then propose.
        // One handler keeps ordering deterministic and the counts single.
        {
            let learning = Arc::clone(&learning);
            let proposer = Arc::clone(&proposer);
            mesh.subscribe(
                "healing",
                "error.detected",
                SubscriptionOptions::default(),
                handler(move |event: Event| {
                    let learning = Arc::clone(&learning);
                    let proposer = Arc::clone(&proposer);
                    async move {
                        if let Ok(signature) = serde_json::from_value(
                            event.payload["signature"].clone(),
                        ) {
                            learning.observe_error(&signature);
                        }
                        if let Err(err) = proposer.handle_error_event(&event).await {
                            tracing::warn!(%err, "healing pass failed");
                        }
                    }
                }),
            )
            .map_err(|e| CoreError::internal(e.to_string()))?;
        }

        // Approved fixes resume when the grant lands on the mesh.
        {
            let proposer = Arc::clone(&proposer);
            mesh.subscribe(
                "proposer-approvals",
                "approval.granted",
                SubscriptionOptions::default(),
                handler(move |event: Event| {
                    let proposer = Arc::clone(&proposer);
                    async move {
                        if let Err(err) = proposer.handle_approval_event(&event).await {
                            tracing::warn!(%err, "approval follow-up failed");
                        }
                    }
                }),
            )
            .map_err(|e| CoreError::internal(e.to_string()))?;
        }

        // 7. Preflight gate.
        let preflight = PreflightValidator::new(
            config.preflight.clone(),
            &config.artifact_root,
            mesh.clone(),
            policies.clone(),
        );
        let preflight_report = preflight.run().await?;
        for warned in preflight_report.warnings() {
            tracing::warn!(artifact = %warned.path, "preflight warnings recorded");
        }

        // 8. Deployment components, resiliently.
        let readiness = Arc::new(ReadinessBoard::new());
        for core in ["audit", "mesh", "governance", "learning", "proposer"] {
            readiness.set(core, true);
        }
        let supervisor = ResilientSupervisor::new(
            mesh.clone(),
            Arc::clone(&proposer),
            config.supervisor.clone(),
        );
        let summary = supervisor.start_all(&components).await?;
        for name in &summary.started {
            readiness.set(name.clone(), true);
        }
        for name in &summary.degraded {
            readiness.set(name.clone(), false);
        }

        // 9. Kernels.
        let services = KernelServices {
            mesh: mesh.clone(),
            governance: Arc::clone(&governance),
            learning: Arc::clone(&learning),
            readiness: Arc::clone(&readiness),
            notes: Arc::new(NoteStore::new()),
            started_at,
        };
        let gateway = KernelGateway::new(services, config.gateway.clone());

        // 10. Cadence and scheduler. The cadence follows `boot.complete`
        // through a subscription, not a direct pointer.
        let (cadence, cadence_rx) =
            CadenceController::new(config.cadence.clone(), mesh.clone());
        let cadence = Arc::new(cadence);
        {
            let cadence = Arc::clone(&cadence);
            mesh.subscribe(
                "cadence",
                "boot.complete",
                SubscriptionOptions::default(),
                handler(move |_event: Event| {
                    let cadence = Arc::clone(&cadence);
                    async move {
                        cadence.complete_boot().await;
                    }
                }),
            )
            .map_err(|e| CoreError::internal(e.to_string()))?;
        }
        let scheduler = Scheduler::new(
            mesh.clone(),
            Arc::clone(&cadence),
            Arc::clone(&governance),
            config.scheduler.clone(),
        );

        // 11. Healer over the watched log, at the cadence's interval.
        let healer = LogHealer::new(
            mesh.clone(),
            HealerConfig {
                log_path: config.watch_log.clone(),
                quiet_period: config.healer_quiet_period,
            },
        );

        // 12. Background tasks.
        let mut tasks = Vec::new();
        tasks.push(governance.run_expiry_sweeper());
        tasks.push(tokio::spawn(Arc::clone(&healer).run(cadence_rx)));
        tasks.push(tokio::spawn(Arc::clone(&scheduler).run()));
        {
            let learning = Arc::clone(&learning);
            let snapshot_path = snapshot_path.clone();
            let interval = config.learning_snapshot_interval;
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(err) = learning.snapshot_to(&snapshot_path) {
                        tracing::error!(%err, "learning snapshot failed");
                    }
                }
            }));
        }

        // 13. Boot is done; report and let the cadence settle.
        mesh.publish(
            Event::new(
                event_types::DIAGNOSTICS_BOOT_REPORT,
                ComponentId::new("runtime"),
            )
            .with_severity(Severity::Info)
            .with_payload(serde_json::json!({
                "components_started": summary.started,
                "components_degraded": summary.degraded,
                "preflight_warnings": preflight_report.warnings().len(),
            })),
        )
        .await
        .map_err(|e| CoreError::internal(e.to_string()))?;
        mesh.publish(
            Event::new(event_types::BOOT_COMPLETE, ComponentId::new("runtime"))
                .with_severity(Severity::Info),
        )
        .await
        .map_err(|e| CoreError::internal(e.to_string()))?;

        tracing::info!(
            started = summary.started.len(),
            degraded = summary.degraded.len(),
            "alder runtime is up"
        );

        Ok(Arc::new(Self {
            config,
            audit,
            mesh,
            governance,
            learning,
            proposer,
            healer,
            scheduler,
            gateway,
            readiness,
            preflight_report,
            started_at,
            tasks,
        }))
    }

    pub fn mesh(&self) -> &TriggerMesh {
        &self.mesh
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn governance(&self) -> &Arc<GovernanceEngine> {
        &self.governance
    }

    pub fn learning(&self) -> &Arc<LearningStore> {
        &self.learning
    }

    pub fn proposer(&self) -> &Arc<FixProposer> {
        &self.proposer
    }

    pub fn healer(&self) -> &Arc<LogHealer> {
        &self.healer
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn gateway(&self) -> &Arc<KernelGateway> {
        &self.gateway
    }

    pub fn preflight_report(&self) -> &PreflightReport {
        &self.preflight_report
    }

    /// Re-run preflight on demand (operator surface).
    pub async fn run_preflight(&self) -> Result<PreflightReport, CoreError> {
        let validator = PreflightValidator::new(
            self.config.preflight.clone(),
            &self.config.artifact_root,
            self.mesh.clone(),
            self.governance.policies().clone(),
        );
        validator.run().await
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Health, degrading when the chain is broken, policies are missing,
    /// or any component is not ready.
    pub async fn health(&self) -> HealthSnapshot {
        let components: Vec<ComponentHealth> = self
            .readiness
            .snapshot()
            .into_iter()
            .map(|(name, ready)| ComponentHealth { name, ready })
            .collect();
        let chain_poisoned = self.audit.is_poisoned();
        let policy_loaded = self.governance.policies().is_loaded();
        let degraded =
            chain_poisoned || !policy_loaded || components.iter().any(|c| !c.ready);
        HealthSnapshot {
            status: if degraded { "degraded" } else { "healthy" },
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            audit_entries: self.audit.len().await,
            chain_poisoned,
            policy_loaded,
            components,
        }
    }

    /// Stop background tasks and write a final learning snapshot.
    pub async fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        let snapshot_path = self.config.data_dir.join("learning.json");
        if let Err(err) = self.learning.snapshot_to(snapshot_path) {
            tracing::error!(%err, "final learning snapshot failed");
        }
        tracing::info!("alder runtime shut down");
    }
}
