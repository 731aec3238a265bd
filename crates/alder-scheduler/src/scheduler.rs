//! The triage scheduler: cycles, mission lifecycle, timeouts, recovery.

use crate::cadence::CadenceController;
use crate::triage::{cluster_events, EventCluster};
use alder_governance::GovernanceEngine;
use alder_mesh::TriggerMesh;
use alder_types::{
    event_types, ComponentId, CoreError, CorrelationId, Event, Mission, MissionId, MissionStatus,
    PhaseArtifact, Severity,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scheduler knobs; defaults follow deployment guidance (cap 2 missions,
/// 10-minute phases, 2 recovery attempts).
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub mission_cap: usize,
    pub phase_timeout: Duration,
    pub recovery_budget: u32,
    /// How many recent audit entries each triage pass clusters.
    pub triage_window: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mission_cap: 2,
            phase_timeout: Duration::from_secs(600),
            recovery_budget: 2,
            triage_window: 200,
        }
    }
}

/// What one triage cycle did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriageSummary {
    pub clusters_considered: usize,
    pub missions_launched: usize,
    pub missions_started: usize,
    pub missions_failed: usize,
    pub approvals_expired: usize,
}

/// Owns missions and drives the periodic triage cycle.
pub struct Scheduler {
    mesh: TriggerMesh,
    cadence: Arc<CadenceController>,
    governance: Arc<GovernanceEngine>,
    config: SchedulerConfig,
    missions: Mutex<HashMap<String, Mission>>,
    /// Cluster key -> mission id, to avoid duplicate launches while a
    /// mission for the cluster is still live.
    cluster_missions: Mutex<HashMap<String, MissionId>>,
}

impl Scheduler {
    pub fn new(
        mesh: TriggerMesh,
        cadence: Arc<CadenceController>,
        governance: Arc<GovernanceEngine>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            mesh,
            cadence,
            governance,
            config,
            missions: Mutex::new(HashMap::new()),
            cluster_missions: Mutex::new(HashMap::new()),
        })
    }

    pub fn cadence(&self) -> &CadenceController {
        &self.cadence
    }

    /// One full triage pass: expire approvals, cluster recent events,
    /// launch missions for hot clusters, enforce phase timeouts, then
    /// promote pending missions up to the cap.
    pub async fn run_triage_cycle(&self) -> Result<TriageSummary, CoreError> {
        let mut summary = TriageSummary::default();

        summary.approvals_expired = self
            .governance
            .expire_due()
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?
            .len();

        let audit = self.mesh.audit();
        let entries = audit
            .read_recent(self.config.triage_window)
            .await
            .map_err(CoreError::from)?;
        let clusters: Vec<EventCluster> = cluster_events(&entries)
            .into_iter()
            .filter(|c| self.cadence.domain_in_scope(&c.domain))
            .collect();
        summary.clusters_considered = clusters.len();

        let threshold = self.cadence.priority_threshold();
        for cluster in clusters {
            if cluster.combined_score() < threshold {
                continue;
            }
            if self.has_live_mission_for(&cluster) {
                continue;
            }
            self.launch_mission(&cluster).await?;
            summary.missions_launched += 1;
        }

        summary.missions_failed = self.fail_timed_out_missions().await?;
        summary.missions_started = self.promote_pending().await?;
        Ok(summary)
    }

    fn has_live_mission_for(&self, cluster: &EventCluster) -> bool {
        let cluster_missions = self
            .cluster_missions
            .lock()
            .expect("cluster map poisoned");
        let Some(mission_id) = cluster_missions.get(&cluster.key()) else {
            return false;
        };
        let missions = self.missions.lock().expect("mission store poisoned");
        missions
            .get(&mission_id.0)
            .map(|m| !m.status.is_terminal())
            .unwrap_or(false)
    }

    async fn launch_mission(&self, cluster: &EventCluster) -> Result<(), CoreError> {
        let mut mission = Mission::new(
            format!(
                "triage {} {} events in domain '{}'",
                cluster.count, cluster.class, cluster.domain
            ),
            CorrelationId::new(format!("cluster:{}", cluster.key())),
        );
        mission.score(cluster.risk_score(), cluster.impact_score());

        self.cluster_missions
            .lock()
            .expect("cluster map poisoned")
            .insert(cluster.key(), mission.id.clone());
        self.missions
            .lock()
            .expect("mission store poisoned")
            .insert(mission.id.0.clone(), mission.clone());

        tracing::info!(
            mission = %mission.id,
            score = mission.priority_score,
            cluster = %cluster.key(),
            "mission created for hot cluster"
        );
        Ok(())
    }

    /// Promote pending missions (highest combined score first) while the
    /// running count is under the cap. Publishes `mission.started`.
    async fn promote_pending(&self) -> Result<usize, CoreError> {
        let to_start: Vec<Mission> = {
            let mut missions = self.missions.lock().expect("mission store poisoned");
            let running = missions
                .values()
                .filter(|m| m.status == MissionStatus::Running)
                .count();
            let slots = self.config.mission_cap.saturating_sub(running);
            let ids: Vec<String> = {
                let mut pending: Vec<&Mission> = missions
                    .values()
                    .filter(|m| m.status == MissionStatus::Pending)
                    .collect();
                pending.sort_by(|a, b| {
                    b.priority_score
                        .partial_cmp(&a.priority_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                pending.iter().take(slots).map(|m| m.id.0.clone()).collect()
            };

            let mut started = Vec::new();
            for id in ids {
                if let Some(mission) = missions.get_mut(&id) {
                    if mission.transition(MissionStatus::Running).is_ok() {
                        started.push(mission.clone());
                    }
                }
            }
            started
        };

        for mission in &to_start {
            self.publish_mission_event(event_types::MISSION_STARTED, mission, None)
                .await?;
        }
        Ok(to_start.len())
    }

    /// Fail running missions whose current phase outlived the timeout and
    /// schedule a recovery mission while the budget allows.
    async fn fail_timed_out_missions(&self) -> Result<usize, CoreError> {
        let deadline = Utc::now()
            - ChronoDuration::from_std(self.config.phase_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(600));

        let (failed, recoveries): (Vec<Mission>, Vec<Mission>) = {
            let mut missions = self.missions.lock().expect("mission store poisoned");
            let timed_out: Vec<String> = missions
                .values()
                .filter(|m| m.status == MissionStatus::Running && m.updated_at < deadline)
                .map(|m| m.id.0.clone())
                .collect();

            let mut failed = Vec::new();
            let mut recoveries = Vec::new();
            for id in timed_out {
                let Some(mission) = missions.get_mut(&id) else {
                    continue;
                };
                let phase = mission.phase().map(|p| p.as_str()).unwrap_or("unknown");
                if mission
                    .fail(format!("phase '{phase}' exceeded its timeout"))
                    .is_ok()
                {
                    failed.push(mission.clone());
                    if mission.recovery_attempts < self.config.recovery_budget {
                        let mut recovery =
                            Mission::new(mission.task.clone(), mission.correlation_id.clone());
                        recovery.recovery_attempts = mission.recovery_attempts + 1;
                        recovery.score(mission.risk_score, mission.impact_score);
                        recoveries.push(recovery);
                    }
                }
            }
            for recovery in &recoveries {
                missions.insert(recovery.id.0.clone(), recovery.clone());
            }
            (failed, recoveries)
        };

        for mission in &failed {
            self.publish_mission_event(
                event_types::MISSION_FAILED,
                mission,
                mission.failure_reason.clone(),
            )
            .await?;
        }
        for recovery in &recoveries {
            tracing::info!(
                mission = %recovery.id,
                attempt = recovery.recovery_attempts,
                "recovery mission scheduled"
            );
        }
        Ok(failed.len())
    }

    /// Suspend a mission. Only `pending` missions may be suspended.
    pub async fn suspend_mission(
        &self,
        id: &MissionId,
        reason: impl Into<String>,
    ) -> Result<(), CoreError> {
        let reason = reason.into();
        let mission = {
            let mut missions = self.missions.lock().expect("mission store poisoned");
            let mission = missions
                .get_mut(&id.0)
                .ok_or_else(|| CoreError::internal(format!("unknown mission {id}")))?;
            mission.transition(MissionStatus::Suspended)?;
            mission.clone()
        };
        self.publish_mission_event(event_types::MISSION_SUSPENDED, &mission, Some(reason))
            .await
    }

    /// Return a suspended mission to the pending queue.
    pub async fn resume_mission(&self, id: &MissionId) -> Result<(), CoreError> {
        let mission = {
            let mut missions = self.missions.lock().expect("mission store poisoned");
            let mission = missions
                .get_mut(&id.0)
                .ok_or_else(|| CoreError::internal(format!("unknown mission {id}")))?;
            mission.transition(MissionStatus::Pending)?;
            mission.clone()
        };
        self.publish_mission_event(event_types::MISSION_RESUMED, &mission, None)
            .await
    }

    /// Complete the current phase of a running mission, attaching an
    /// optional artifact produced by the phase's agent.
    pub async fn advance_mission(
        &self,
        id: &MissionId,
        artifact: Option<PhaseArtifact>,
    ) -> Result<Mission, CoreError> {
        let (mission, completed_phase) = {
            let mut missions = self.missions.lock().expect("mission store poisoned");
            let mission = missions
                .get_mut(&id.0)
                .ok_or_else(|| CoreError::internal(format!("unknown mission {id}")))?;
            let phase = mission.phase();
            mission.complete_phase(artifact)?;
            (mission.clone(), phase)
        };

        self.publish_mission_event(
            event_types::MISSION_PHASE_COMPLETED,
            &mission,
            completed_phase.map(|p| p.as_str().to_string()),
        )
        .await?;
        if mission.status == MissionStatus::Completed {
            self.publish_mission_event(event_types::MISSION_COMPLETED, &mission, None)
                .await?;
        }
        Ok(mission)
    }

    pub fn missions_with_status(&self, status: MissionStatus) -> Vec<Mission> {
        let missions = self.missions.lock().expect("mission store poisoned");
        let mut list: Vec<Mission> = missions
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        list
    }

    pub fn mission(&self, id: &MissionId) -> Option<Mission> {
        self.missions
            .lock()
            .expect("mission store poisoned")
            .get(&id.0)
            .cloned()
    }

    /// Insert an externally created mission (operator or kernel surface).
    pub fn enqueue_mission(&self, mission: Mission) {
        self.missions
            .lock()
            .expect("mission store poisoned")
            .insert(mission.id.0.clone(), mission);
    }

    /// Run cycles forever at the cadence's interval.
    pub async fn run(self: Arc<Self>) {
        loop {
            let interval = self.cadence.next_interval();
            tokio::time::sleep(interval).await;
            match self.run_triage_cycle().await {
                Ok(summary) => tracing::debug!(?summary, "triage cycle complete"),
                Err(err) => tracing::error!(%err, "triage cycle failed"),
            }
        }
    }

    async fn publish_mission_event(
        &self,
        event_type: &str,
        mission: &Mission,
        detail: Option<String>,
    ) -> Result<(), CoreError> {
        let event = Event::new(event_type, ComponentId::new("scheduler"))
            .with_severity(Severity::Info)
            .with_correlation(mission.correlation_id.clone())
            .with_payload(serde_json::json!({
                "mission_id": mission.id.0,
                "task": mission.task,
                "status": mission.status.as_str(),
                "priority_score": mission.priority_score,
                "detail": detail,
            }));
        self.mesh
            .publish(event)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }
}
