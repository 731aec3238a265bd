//! Alder scheduler and triage.
//!
//! A process-wide cadence controller with a short, focused boot phase and
//! a jittered steady phase; a triage pass that clusters recent audit
//! events, scores urgency and recurrence, and launches missions for hot
//! clusters; and the mission lifecycle itself, with a concurrency cap,
//! suspension rules, phase timeouts, and bounded auto-recovery.

#![deny(unsafe_code)]

mod cadence;
mod scheduler;
mod triage;

pub use cadence::{CadenceConfig, CadenceController, CadencePhase};
pub use scheduler::{Scheduler, SchedulerConfig, TriageSummary};
pub use triage::{cluster_events, EventCluster};
