//! Missions: long-running multi-phase units of work owned by the scheduler.

use crate::error::CoreError;
use crate::event::{ComponentId, CorrelationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a mission.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionId(pub String);

impl MissionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered mission phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionPhase {
    Research,
    Design,
    Implement,
    Test,
    Deploy,
}

impl MissionPhase {
    pub fn all() -> &'static [MissionPhase] {
        &[
            MissionPhase::Research,
            MissionPhase::Design,
            MissionPhase::Implement,
            MissionPhase::Test,
            MissionPhase::Deploy,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionPhase::Research => "research",
            MissionPhase::Design => "design",
            MissionPhase::Implement => "implement",
            MissionPhase::Test => "test",
            MissionPhase::Deploy => "deploy",
        }
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mission lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Suspended,
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }

    /// Allowed transitions. Suspension is only possible from `pending`, and
    /// a suspended mission can only return to `pending`.
    pub fn can_transition_to(&self, next: MissionStatus) -> bool {
        use MissionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Suspended)
                | (Pending, Failed)
                | (Suspended, Pending)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Pending => "pending",
            MissionStatus::Running => "running",
            MissionStatus::Paused => "paused",
            MissionStatus::Completed => "completed",
            MissionStatus::Failed => "failed",
            MissionStatus::Suspended => "suspended",
        }
    }
}

/// An artifact produced during one phase, read-only to later phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseArtifact {
    pub phase: MissionPhase,
    pub creator: ComponentId,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

/// A long-running, multi-phase unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub task: String,
    pub phases: Vec<MissionPhase>,
    pub current_phase: usize,
    pub status: MissionStatus,
    pub risk_score: f64,
    pub impact_score: f64,
    pub priority_score: f64,
    pub artifacts: Vec<PhaseArtifact>,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
    pub recovery_attempts: u32,
}

impl Mission {
    pub fn new(task: impl Into<String>, correlation_id: CorrelationId) -> Self {
        let now = Utc::now();
        Self {
            id: MissionId::generate(),
            task: task.into(),
            phases: MissionPhase::all().to_vec(),
            current_phase: 0,
            status: MissionStatus::Pending,
            risk_score: 0.0,
            impact_score: 0.0,
            priority_score: 0.0,
            artifacts: Vec::new(),
            correlation_id,
            created_at: now,
            updated_at: now,
            failure_reason: None,
            recovery_attempts: 0,
        }
    }

    /// Combined priority: 0.4 · risk + 0.6 · impact, both in [0, 1].
    pub fn score(&mut self, risk: f64, impact: f64) {
        self.risk_score = risk.clamp(0.0, 1.0);
        self.impact_score = impact.clamp(0.0, 1.0);
        self.priority_score = 0.4 * self.risk_score + 0.6 * self.impact_score;
    }

    pub fn phase(&self) -> Option<MissionPhase> {
        self.phases.get(self.current_phase).copied()
    }

    pub fn transition(&mut self, next: MissionStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::internal(format!(
                "mission {} cannot transition {} -> {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.failure_reason = Some(reason.into());
        self.transition(MissionStatus::Failed)
    }

    /// Advance to the next phase; completes the mission after the last one.
    pub fn complete_phase(&mut self, artifact: Option<PhaseArtifact>) -> Result<(), CoreError> {
        if self.status != MissionStatus::Running {
            return Err(CoreError::internal(format!(
                "mission {} is {}, not running",
                self.id,
                self.status.as_str()
            )));
        }
        if let Some(artifact) = artifact {
            self.artifacts.push(artifact);
        }
        self.current_phase += 1;
        self.updated_at = Utc::now();
        if self.current_phase >= self.phases.len() {
            self.transition(MissionStatus::Completed)?;
        }
        Ok(())
    }
}
