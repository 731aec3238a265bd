//! The gateway: parse → plan → execute → aggregate → attach.

use crate::capability::{parse_intent, Capability};
use crate::services::KernelServices;
use crate::trace::TraceRecorder;
use crate::KernelError;
use alder_audit::ChainVerification;
use alder_governance::Authorization;
use alder_types::{
    event_types, ActionKind, ActionRequest, ActorId, ComponentId, CoreError, Event, KernelName,
    KernelRequest, KernelResponse, ProvenanceRecord, RiskTier, Severity,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Gateway knobs.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Traces slower than this are also emitted as audit events.
    pub trace_audit_threshold_ms: u64,
    pub invoke_deadline: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            trace_audit_threshold_ms: 1_000,
            invoke_deadline: Duration::from_secs(30),
        }
    }
}

/// The single entry point in front of all eight kernels.
pub struct KernelGateway {
    services: KernelServices,
    config: GatewayConfig,
}

impl KernelGateway {
    pub fn new(services: KernelServices, config: GatewayConfig) -> Arc<Self> {
        Arc::new(Self { services, config })
    }

    /// Invoke one kernel with a free-text intent.
    pub async fn invoke(&self, request: KernelRequest) -> Result<KernelResponse, KernelError> {
        let deadline = self.config.invoke_deadline;
        match tokio::time::timeout(deadline, self.invoke_inner(request)).await {
            Ok(result) => result,
            Err(_) => Err(KernelError::Core(CoreError::Timeout {
                operation: "kernel.invoke".to_string(),
                deadline_ms: deadline.as_millis() as u64,
            })),
        }
    }

    async fn invoke_inner(&self, request: KernelRequest) -> Result<KernelResponse, KernelError> {
        let capability = parse_intent(request.kernel, &request.intent)?;
        let request_id = Uuid::new_v4().to_string();
        let mut recorder = TraceRecorder::new(&request_id);
        recorder.add_agent(request.kernel.as_str());

        let mut data = Map::new();
        let mut provenance = Vec::new();
        let mut consulted = vec![request.kernel];
        let mut apis_called: Vec<String> = Vec::new();

        if let Err(err) = self
            .execute(
                capability,
                &request,
                &mut recorder,
                &mut data,
                &mut provenance,
                &mut consulted,
                &mut apis_called,
            )
            .await
        {
            // Denials carry the partial trace for the API surface.
            return Err(match err {
                KernelError::Core(source @ CoreError::PolicyDenied { .. }) => {
                    KernelError::Denied {
                        source,
                        partial_trace: Box::new(recorder.finish()),
                    }
                }
                other => other,
            });
        }

        let answer = aggregate_answer(capability, &data);
        let trust_score = trust_from(&provenance);
        let trace = recorder.finish();

        if trace.total_duration_ms >= self.config.trace_audit_threshold_ms {
            let event = Event::new("kernel.trace", ComponentId::new("kernels"))
                .with_severity(Severity::Low)
                .with_correlation(request.correlation_id.clone())
                .with_payload(json!({ "trace": trace }));
            if let Err(err) = self.services.mesh.publish(event).await {
                tracing::warn!(%err, "slow-trace audit emit failed");
            }
        }

        Ok(KernelResponse {
            answer,
            data,
            execution_trace: trace,
            data_provenance: provenance,
            trust_score,
            kernels_consulted: consulted,
            apis_called,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        capability: Capability,
        request: &KernelRequest,
        recorder: &mut TraceRecorder,
        data: &mut Map<String, Value>,
        provenance: &mut Vec<ProvenanceRecord>,
        consulted: &mut Vec<KernelName>,
        apis_called: &mut Vec<String>,
    ) -> Result<(), KernelError> {
        let services = &self.services;
        match capability {
            Capability::CoreStatus => {
                let t = Instant::now();
                let stats = services.mesh.stats();
                recorder.step("mesh", "collect_stats", Some("mesh-stats"), false, t, None);
                data.insert("published_events".into(), json!(stats.published));
                data.insert("subscriptions".into(), json!(stats.subscriptions));

                // Declared cross-kernel consult for the autonomy picture.
                let t = Instant::now();
                let tier = services.governance.tier();
                recorder.step(
                    "governance",
                    "show_tier",
                    Some("governance-engine"),
                    false,
                    t,
                    None,
                );
                consulted.push(KernelName::Governance);
                data.insert("autonomy_tier".into(), json!(tier.as_str()));
                data.insert(
                    "components".into(),
                    json!(services
                        .readiness
                        .snapshot()
                        .into_iter()
                        .map(|(name, ready)| json!({ "name": name, "ready": ready }))
                        .collect::<Vec<_>>()),
                );
                provenance.push(source("mesh-stats", 1.0, true));
                provenance.push(source("governance-engine", 1.0, true));
            }

            Capability::CoreUptime => {
                let t = Instant::now();
                let uptime = (chrono::Utc::now() - services.started_at).num_seconds().max(0);
                recorder.step("core", "uptime", None, false, t, None);
                data.insert("uptime_seconds".into(), json!(uptime));
            }

            Capability::MemoryStoreNote => {
                let key = context_str(request, "key").unwrap_or_else(|| "note".to_string());
                let content = context_str(request, "content")
                    .unwrap_or_else(|| request.intent.clone());

                let action = ActionRequest::new(
                    ActorId::new("kernel/memory"),
                    ActionKind::new("store_memory_note"),
                    format!("memory/notes/{key}"),
                    RiskTier::Low,
                )
                .with_confidence(0.9)
                .with_correlation(request.correlation_id.clone());

                let t = Instant::now();
                recorder.count_governance_check();
                match services.governance.authorize(action).await {
                    Ok(Authorization::Granted { .. }) => {
                        recorder.step(
                            "governance",
                            "authorize",
                            Some("governance-engine"),
                            false,
                            t,
                            None,
                        );
                        let t = Instant::now();
                        let note = services.notes.store(&key, &content);
                        recorder.step(
                            "memory",
                            "store_note",
                            Some("note-store"),
                            false,
                            t,
                            None,
                        );
                        data.insert("stored".into(), json!(true));
                        data.insert("key".into(), json!(note.key));
                        provenance.push(source("note-store", 1.0, true));
                    }
                    Ok(Authorization::Pending { approval }) => {
                        recorder.step(
                            "governance",
                            "authorize",
                            Some("governance-engine"),
                            false,
                            t,
                            None,
                        );
                        data.insert("stored".into(), json!(false));
                        data.insert("pending_approval".into(), json!(approval.id.0));
                    }
                    Err(denied) => {
                        recorder.step(
                            "governance",
                            "authorize",
                            Some("governance-engine"),
                            false,
                            t,
                            Some(denied.to_string()),
                        );
                        return Err(KernelError::Core(denied));
                    }
                }
            }

            Capability::MemoryRecallNotes => {
                let t = Instant::now();
                let notes = services.notes.all();
                recorder.step("memory", "recall_notes", Some("note-store"), true, t, None);
                data.insert("count".into(), json!(notes.len()));
                data.insert("notes".into(), serde_json::to_value(&notes).unwrap_or_default());
                provenance.push(source("note-store", 1.0, true));
            }

            Capability::MemoryRecallPatterns => {
                let t = Instant::now();
                let patterns = services.learning.recent_patterns(10);
                recorder.step(
                    "learning",
                    "recent_patterns",
                    Some("pattern-store"),
                    false,
                    t,
                    None,
                );
                data.insert("count".into(), json!(patterns.len()));
                data.insert(
                    "patterns".into(),
                    serde_json::to_value(&patterns).unwrap_or_default(),
                );
                provenance.push(source("pattern-store", 0.9, true));
            }

            Capability::CodeAnalyzeArtifact => {
                let path = context_str(request, "path").unwrap_or_else(|| "src".to_string());
                let t = Instant::now();
                let reliability = services.learning.predict_reliability(&path);
                let patterns = services.learning.recent_patterns(50);
                let related: Vec<_> = patterns
                    .iter()
                    .filter(|p| p.signature.file.starts_with(&path))
                    .map(|p| {
                        json!({
                            "signature": p.signature.key(),
                            "occurrences": p.occurrences,
                        })
                    })
                    .collect();
                recorder.step(
                    "learning",
                    "analyze_artifact",
                    Some("pattern-store"),
                    false,
                    t,
                    None,
                );
                data.insert("path".into(), json!(path));
                data.insert("reliability".into(), json!(reliability));
                data.insert("known_error_patterns".into(), json!(related));
                provenance.push(source("pattern-store", 0.85, true));
            }

            Capability::CodeProposePatch => {
                // Hand the request to the healing pipeline; the proposer's
                // own governed path decides whether anything is applied.
                let file = context_str(request, "path").unwrap_or_default();
                if file.is_empty() {
                    return Err(KernelError::Core(CoreError::internal(
                        "propose_patch requires context.path",
                    )));
                }
                let signature = json!({
                    "classification": context_str(request, "classification")
                        .unwrap_or_else(|| "unknown".to_string()),
                    "error_class": context_str(request, "error_class")
                        .unwrap_or_else(|| "ReportedError".to_string()),
                    "file": file,
                    "line": request
                        .context
                        .get("line")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                });
                let t = Instant::now();
                let event = Event::new(event_types::ERROR_DETECTED, ComponentId::new("kernels"))
                    .with_resource(file.clone())
                    .with_severity(Severity::Medium)
                    .with_correlation(request.correlation_id.clone())
                    .with_payload(json!({
                        "signature": signature,
                        "message": context_str(request, "message").unwrap_or_default(),
                        "stack": [],
                        "reported_via": "code-kernel",
                    }));
                let published = services.mesh.publish(event).await;
                recorder.step(
                    "mesh",
                    "raise_error_signal",
                    Some("trigger-mesh"),
                    false,
                    t,
                    published.as_ref().err().map(|e| e.to_string()),
                );
                published.map_err(|e| KernelError::Core(CoreError::internal(e.to_string())))?;
                data.insert("signal_raised".into(), json!(true));
                data.insert("file".into(), json!(file));
            }

            Capability::GovernanceShowTier => {
                let t = Instant::now();
                let tier = services.governance.tier();
                let threshold = services.governance.confidence_threshold(tier);
                recorder.step(
                    "governance",
                    "show_tier",
                    Some("governance-engine"),
                    false,
                    t,
                    None,
                );
                data.insert("tier".into(), json!(tier.as_str()));
                data.insert("tier_level".into(), json!(tier.as_u8()));
                data.insert("auto_apply_threshold".into(), json!(threshold));
                provenance.push(source("governance-engine", 1.0, true));
            }

            Capability::GovernanceListApprovals => {
                let t = Instant::now();
                let pending = services.governance.approvals().pending();
                recorder.step(
                    "governance",
                    "list_approvals",
                    Some("approval-store"),
                    false,
                    t,
                    None,
                );
                data.insert("pending_count".into(), json!(pending.len()));
                data.insert(
                    "approvals".into(),
                    json!(pending
                        .iter()
                        .map(|a| json!({
                            "id": a.id.0,
                            "action_kind": a.request.action_kind.as_str(),
                            "resource": a.request.resource,
                            "expires_at": a.expires_at,
                        }))
                        .collect::<Vec<_>>()),
                );
                provenance.push(source("approval-store", 1.0, true));
            }

            Capability::VerificationVerifyChain => {
                let audit = services.mesh.audit();
                let t = Instant::now();
                let len = audit.len().await;
                let verification = audit
                    .verify_chain(0, len)
                    .await
                    .map_err(|e| KernelError::Core(e.into()));
                recorder.count_database_query();
                recorder.step(
                    "audit",
                    "verify_chain",
                    Some("audit-chain"),
                    false,
                    t,
                    verification.as_ref().err().map(|e| e.to_string()),
                );
                let verification = verification?;
                match verification {
                    ChainVerification::Ok { checked } => {
                        data.insert("intact".into(), json!(true));
                        data.insert("entries_checked".into(), json!(checked));
                    }
                    ChainVerification::BrokenAt { sequence, detail } => {
                        data.insert("intact".into(), json!(false));
                        data.insert("broken_at".into(), json!(sequence));
                        data.insert("detail".into(), json!(detail));
                    }
                }
                provenance.push(source("audit-chain", 1.0, true));
            }

            Capability::VerificationRecentOutcomes => {
                let audit = services.mesh.audit();
                let t = Instant::now();
                let entries = audit
                    .read_recent(100)
                    .await
                    .map_err(|e| KernelError::Core(e.into()))?;
                recorder.count_database_query();
                recorder.step(
                    "audit",
                    "recent_outcomes",
                    Some("audit-chain"),
                    false,
                    t,
                    None,
                );
                let outcomes: Vec<_> = entries
                    .iter()
                    .filter(|e| {
                        matches!(
                            e.event.event_type.as_str(),
                            event_types::SANDBOX_PASSED
                                | event_types::SANDBOX_FAILED
                                | event_types::FIX_APPLIED
                                | event_types::FIX_REVERTED
                        )
                    })
                    .map(|e| {
                        json!({
                            "sequence": e.sequence,
                            "event_type": e.event.event_type.as_str(),
                            "resource": e.event.resource,
                        })
                    })
                    .collect();
                data.insert("count".into(), json!(outcomes.len()));
                data.insert("outcomes".into(), json!(outcomes));
                provenance.push(source("audit-chain", 1.0, true));
            }

            Capability::IntelligencePredictReliability => {
                let domain = context_str(request, "domain").unwrap_or_else(|| "src".to_string());
                let t = Instant::now();
                let reliability = services.learning.predict_reliability(&domain);
                recorder.step(
                    "learning",
                    "predict_reliability",
                    Some("strategy-store"),
                    false,
                    t,
                    None,
                );
                data.insert("domain".into(), json!(domain));
                data.insert("reliability".into(), json!(reliability));
                provenance.push(source("strategy-store", 0.8, true));
            }

            Capability::IntelligenceTopStrategies => {
                let pattern = context_str(request, "pattern").unwrap_or_default();
                let t = Instant::now();
                let strategies = services.learning.top_strategies(&pattern, 5);
                recorder.step(
                    "learning",
                    "top_strategies",
                    Some("strategy-store"),
                    false,
                    t,
                    None,
                );
                data.insert("pattern".into(), json!(pattern));
                data.insert(
                    "strategies".into(),
                    json!(strategies
                        .iter()
                        .map(|s| json!({
                            "kind": s.strategy_kind.as_str(),
                            "attempts": s.attempts,
                            "successes": s.successes,
                            "smoothed_success_rate": s.smoothed_success_rate(),
                        }))
                        .collect::<Vec<_>>()),
                );
                provenance.push(source("strategy-store", 0.8, true));
            }

            Capability::InfrastructureAllocate => {
                let task_type =
                    context_str(request, "task_type").unwrap_or_else(|| "general".to_string());
                let t = Instant::now();
                let plan = allocation_plan(&task_type);
                recorder.step(
                    "infrastructure",
                    "allocate",
                    Some("allocation-table"),
                    false,
                    t,
                    None,
                );
                data.insert("task_type".into(), json!(task_type));
                data.insert("plan".into(), plan);
                provenance.push(source("allocation-table", 0.9, true));
            }

            Capability::InfrastructureReadiness => {
                let t = Instant::now();
                let snapshot = services.readiness.snapshot();
                recorder.step(
                    "infrastructure",
                    "readiness",
                    Some("readiness-board"),
                    false,
                    t,
                    None,
                );
                data.insert("all_ready".into(), json!(services.readiness.all_ready()));
                data.insert(
                    "components".into(),
                    json!(snapshot
                        .into_iter()
                        .map(|(name, ready)| json!({ "name": name, "ready": ready }))
                        .collect::<Vec<_>>()),
                );
                provenance.push(source("readiness-board", 1.0, true));
            }

            Capability::FederationListReplicas => {
                let t = Instant::now();
                recorder.step(
                    "federation",
                    "list_replicas",
                    Some("replica-registry"),
                    false,
                    t,
                    None,
                );
                // Single-process core: replicas are external audit readers,
                // none registered in this deployment shape.
                data.insert("replicas".into(), json!([]));
                data.insert("deployment".into(), json!("single-process"));
                provenance.push(source("replica-registry", 1.0, true));
                apis_called.push("replica-registry/list".to_string());
            }

            Capability::FederationSyncStatus => {
                let audit = services.mesh.audit();
                let t = Instant::now();
                let high_water = audit.len().await;
                recorder.step(
                    "federation",
                    "sync_status",
                    Some("audit-chain"),
                    false,
                    t,
                    None,
                );
                data.insert("replication_high_water".into(), json!(high_water));
                data.insert("lagging_replicas".into(), json!(0));
                provenance.push(source("audit-chain", 1.0, true));
            }
        }
        Ok(())
    }
}

fn context_str(request: &KernelRequest, key: &str) -> Option<String> {
    request
        .context
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn source(id: &str, confidence: f64, verified: bool) -> ProvenanceRecord {
    ProvenanceRecord {
        source_type: "store".to_string(),
        source_id: id.to_string(),
        confidence,
        verified,
    }
}

fn trust_from(provenance: &[ProvenanceRecord]) -> f64 {
    if provenance.is_empty() {
        return 0.5;
    }
    let sum: f64 = provenance
        .iter()
        .map(|p| p.confidence * if p.verified { 1.0 } else { 0.8 })
        .sum();
    (sum / provenance.len() as f64).clamp(0.0, 1.0)
}

/// Resource plans per task type (the `/hardware/allocate` surface).
fn allocation_plan(task_type: &str) -> Value {
    match task_type {
        "sandbox_verification" => json!({
            "cpu_cores": 2, "memory_mb": 1024, "sandbox_slots": 4, "priority": "high"
        }),
        "log_analysis" => json!({
            "cpu_cores": 1, "memory_mb": 512, "sandbox_slots": 0, "priority": "normal"
        }),
        "mission" => json!({
            "cpu_cores": 2, "memory_mb": 2048, "sandbox_slots": 2, "priority": "high"
        }),
        _ => json!({
            "cpu_cores": 1, "memory_mb": 256, "sandbox_slots": 0, "priority": "low"
        }),
    }
}

/// Templated aggregation. An LLM-backed aggregator is an external
/// collaborator that can replace this function behind the same signature.
fn aggregate_answer(capability: Capability, data: &Map<String, Value>) -> String {
    match capability {
        Capability::CoreStatus => format!(
            "Platform running at tier '{}' with {} mesh subscription(s) and {} event(s) published.",
            data["autonomy_tier"].as_str().unwrap_or("unknown"),
            data["subscriptions"],
            data["published_events"],
        ),
        Capability::CoreUptime => {
            format!("Core has been up for {} second(s).", data["uptime_seconds"])
        }
        Capability::MemoryStoreNote => {
            if data.get("stored").and_then(Value::as_bool).unwrap_or(false) {
                format!("Stored note '{}'.", data["key"].as_str().unwrap_or("note"))
            } else {
                "Note storage is queued pending approval.".to_string()
            }
        }
        Capability::MemoryRecallNotes => {
            format!("Recalled {} note(s).", data["count"])
        }
        Capability::MemoryRecallPatterns => {
            format!("{} error pattern(s) on record.", data["count"])
        }
        Capability::CodeAnalyzeArtifact => format!(
            "Artifact '{}' has predicted reliability {:.2}.",
            data["path"].as_str().unwrap_or("?"),
            data["reliability"].as_f64().unwrap_or(0.5),
        ),
        Capability::CodeProposePatch => format!(
            "Healing pipeline engaged for '{}'; any patch will be governed and sandbox-verified.",
            data["file"].as_str().unwrap_or("?"),
        ),
        Capability::GovernanceShowTier => format!(
            "Autonomy tier is '{}' (level {}); auto-apply needs confidence >= {:.2}.",
            data["tier"].as_str().unwrap_or("?"),
            data["tier_level"],
            data["auto_apply_threshold"].as_f64().unwrap_or(1.0),
        ),
        Capability::GovernanceListApprovals => {
            format!("{} approval(s) pending.", data["pending_count"])
        }
        Capability::VerificationVerifyChain => {
            if data.get("intact").and_then(Value::as_bool).unwrap_or(false) {
                format!(
                    "Audit chain intact across {} entr(ies).",
                    data["entries_checked"]
                )
            } else {
                format!("Audit chain BROKEN at sequence {}.", data["broken_at"])
            }
        }
        Capability::VerificationRecentOutcomes => {
            format!("{} verification outcome(s) in the recent window.", data["count"])
        }
        Capability::IntelligencePredictReliability => format!(
            "Predicted reliability for '{}' is {:.2}.",
            data["domain"].as_str().unwrap_or("?"),
            data["reliability"].as_f64().unwrap_or(0.5),
        ),
        Capability::IntelligenceTopStrategies => {
            format!("Ranked strategies for pattern '{}'.", data["pattern"].as_str().unwrap_or("?"))
        }
        Capability::InfrastructureAllocate => format!(
            "Resource plan prepared for task type '{}'.",
            data["task_type"].as_str().unwrap_or("?"),
        ),
        Capability::InfrastructureReadiness => {
            if data.get("all_ready").and_then(Value::as_bool).unwrap_or(false) {
                "All components report ready.".to_string()
            } else {
                "Some components are not ready.".to_string()
            }
        }
        Capability::FederationListReplicas => "No replicas registered; single-process deployment.".to_string(),
        Capability::FederationSyncStatus => format!(
            "Replication high-water mark is sequence {}.",
            data["replication_high_water"]
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{NoteStore, ReadinessBoard};
    use alder_audit::AuditLog;
    use alder_governance::{GovernanceConfig, GovernanceEngine, PolicyStore};
    use alder_learning::LearningStore;
    use alder_mesh::TriggerMesh;
    use alder_types::AutonomyTier;

    async fn gateway() -> (Arc<KernelGateway>, KernelServices, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);

        let constitution = serde_yaml::from_str("version: \"1.0\"").unwrap();
        let guardrails = serde_yaml::from_str("{}").unwrap();
        let whitelist = serde_yaml::from_str(
            r#"
per_tier_actions:
  "0": ["set_autonomy_tier"]
  "1": ["store_memory_note"]
auto_approve_actions: ["store_memory_note"]
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

        let services = KernelServices {
            mesh,
            governance,
            learning: Arc::new(LearningStore::new()),
            readiness: Arc::new(ReadinessBoard::new()),
            notes: Arc::new(NoteStore::new()),
            started_at: chrono::Utc::now(),
        };
        services.readiness.set("audit", true);
        services.readiness.set("mesh", true);
        (
            KernelGateway::new(services.clone(), GatewayConfig::default()),
            services,
            dir,
        )
    }

    #[tokio::test]
    async fn status_consults_governance_and_traces_steps() {
        let (gateway, _services, _dir) = gateway().await;
        let response = gateway
            .invoke(KernelRequest::new(KernelName::Core, "what's the status?"))
            .await
            .unwrap();

        assert!(response.answer.contains("tier"));
        assert!(response.execution_trace.steps.len() >= 2);
        assert!(response.kernels_consulted.contains(&KernelName::Governance));
        assert!(response.trust_score > 0.5);
    }

    #[tokio::test]
    async fn unknown_intent_is_a_structured_rejection() {
        let (gateway, _services, _dir) = gateway().await;
        let err = gateway
            .invoke(KernelRequest::new(KernelName::Memory, "reticulate splines"))
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::UnknownIntent { .. }));
    }

    #[tokio::test]
    async fn store_note_is_governed_and_stored() {
        let (gateway, services, _dir) = gateway().await;
        let response = gateway
            .invoke(
                KernelRequest::new(KernelName::Memory, "store_note")
                    .with_context("key", json!("deploy-window"))
                    .with_context("content", json!("Fridays are frozen")),
            )
            .await
            .unwrap();

        assert_eq!(response.data["stored"], json!(true));
        assert_eq!(response.execution_trace.governance_checks, 1);
        assert_eq!(services.notes.len(), 1);

        // The grant is in the audit stream.
        let entries = services.mesh.audit().read_recent(5).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::APPROVAL_GRANTED));
    }

    #[tokio::test]
    async fn denied_mutating_capability_returns_policy_denied() {
        let (gateway, services, _dir) = gateway().await;
        // Drop back to manual: store_memory_note is whitelisted at tier 1,
        // so tier 0 denies it.
        let outcome = services
            .governance
            .request_tier_change(ActorId::new("operator"), AutonomyTier::Manual)
            .await
            .unwrap();
        if let Some(approval) = outcome.approval {
            services
                .governance
                .grant(&approval.id, ActorId::new("operator"), "lockdown")
                .await
                .unwrap();
        }

        let err = gateway
            .invoke(KernelRequest::new(KernelName::Memory, "store_note"))
            .await
            .unwrap_err();
        match err {
            KernelError::Denied {
                source: CoreError::PolicyDenied { .. },
                partial_trace,
            } => {
                assert!(!partial_trace.steps.is_empty());
            }
            other => panic!("expected denial with partial trace, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_chain_reports_intact() {
        let (gateway, _services, _dir) = gateway().await;
        let response = gateway
            .invoke(KernelRequest::new(
                KernelName::Verification,
                "verify the chain integrity",
            ))
            .await
            .unwrap();
        assert_eq!(response.data["intact"], json!(true));
        assert_eq!(response.execution_trace.database_queries, 1);
    }

    #[tokio::test]
    async fn allocate_returns_a_plan_per_task_type() {
        let (gateway, _services, _dir) = gateway().await;
        let response = gateway
            .invoke(
                KernelRequest::new(KernelName::Infrastructure, "allocate hardware")
                    .with_context("task_type", json!("sandbox_verification")),
            )
            .await
            .unwrap();
        assert_eq!(response.data["plan"]["sandbox_slots"], json!(4));
    }

    #[tokio::test]
    async fn propose_patch_raises_an_error_signal() {
        let (gateway, services, _dir) = gateway().await;
        let response = gateway
            .invoke(
                KernelRequest::new(KernelName::Code, "propose a fix")
                    .with_context("path", json!("src/worker.py"))
                    .with_context("error_class", json!("TypeError"))
                    .with_context("line", json!(1)),
            )
            .await
            .unwrap();
        assert_eq!(response.data["signal_raised"], json!(true));

        let entries = services.mesh.audit().read_recent(5).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::ERROR_DETECTED));
    }
}
