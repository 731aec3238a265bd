//! Alder shared data model.
//!
//! Every value that crosses a subsystem boundary lives here: events and their
//! dotted type namespace, action requests and policy decisions, approvals,
//! the autonomy tier, healing patterns and strategies, missions, kernel
//! request/response contracts, execution traces, and the error taxonomy.
//!
//! Subsystem crates depend on this crate and on nothing else of Alder's, so
//! the dependency graph stays a tree rooted here.

#![deny(unsafe_code)]

pub mod action;
pub mod approval;
pub mod autonomy;
pub mod decision;
pub mod error;
pub mod event;
pub mod healing;
pub mod kernel;
pub mod mission;
pub mod patch;
pub mod trace;

pub use action::{ActionKind, ActionRequest, RiskTier};
pub use approval::{Approval, ApprovalId, ApprovalState};
pub use autonomy::AutonomyTier;
pub use decision::{Disposition, LayerResult, PolicyDecision, PolicyLayer};
pub use error::{CoreError, CoreResult};
pub use event::{
    ActorId, ComponentId, CorrelationId, Event, EventId, EventType, Severity,
};
pub use healing::{
    ErrorClassification, ErrorPattern, ErrorSignature, FixStrategy, HealingAttempt, RecipeKind,
    SandboxOutcome, SMOOTHING_ALPHA,
};
pub use kernel::{KernelName, KernelRequest, KernelResponse, ProvenanceRecord};
pub use mission::{Mission, MissionId, MissionPhase, MissionStatus, PhaseArtifact};
pub use patch::CandidatePatch;
pub use trace::{ExecutionTrace, TraceStep};

/// Well-known event type strings, grouped by the subsystem that emits them.
pub mod event_types {
    pub const ERROR_DETECTED: &str = "error.detected";
    pub const WARNING_RAISED: &str = "warning.raised";

    pub const FIX_PROPOSED: &str = "fix.proposed";
    pub const FIX_APPLIED: &str = "fix.applied";
    pub const FIX_REVERTED: &str = "fix.reverted";

    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    pub const APPROVAL_GRANTED: &str = "approval.granted";
    pub const APPROVAL_DENIED: &str = "approval.denied";
    pub const APPROVAL_EXPIRED: &str = "approval.expired";

    pub const SANDBOX_PASSED: &str = "sandbox.passed";
    pub const SANDBOX_FAILED: &str = "sandbox.failed";

    pub const MISSION_STARTED: &str = "mission.started";
    pub const MISSION_PHASE_COMPLETED: &str = "mission.phase.completed";
    pub const MISSION_COMPLETED: &str = "mission.completed";
    pub const MISSION_FAILED: &str = "mission.failed";
    pub const MISSION_SUSPENDED: &str = "mission.suspended";
    pub const MISSION_RESUMED: &str = "mission.resumed";

    pub const BOOT_COMPLETE: &str = "boot.complete";
    pub const DIAGNOSTICS_BOOT_REPORT: &str = "diagnostics.boot_report";
    pub const SCHEDULER_PHASE_CHANGED: &str = "scheduler.phase_changed";
    pub const AUTONOMY_CHANGED: &str = "autonomy.changed";

    pub const PREFLIGHT_WARNING: &str = "preflight.warning";
    pub const STARTUP_ERROR: &str = "startup.error";
    pub const CHAIN_BROKEN: &str = "chain.broken";
    pub const BACKPRESSURE_OVERFLOW: &str = "backpressure.overflow";
}
