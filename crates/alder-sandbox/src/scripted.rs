//! Scripted executor for tests: returns queued reports without running
//! anything.

use crate::{ResourceUsage, SandboxError, SandboxExecutor, SandboxReport, SandboxRequest};
use alder_types::SandboxOutcome;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Test double that replays scripted outcomes in order, falling back to a
/// default outcome, and records every request it receives.
pub struct ScriptedSandbox {
    queued: Mutex<VecDeque<SandboxReport>>,
    default_outcome: SandboxOutcome,
    seen: Mutex<Vec<SandboxRequest>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::always(SandboxOutcome::Passed)
    }

    /// Report `outcome` whenever the queue is empty.
    pub fn always(outcome: SandboxOutcome) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default_outcome: outcome,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn enqueue(&self, report: SandboxReport) {
        self.queued
            .lock()
            .expect("scripted sandbox poisoned")
            .push_back(report);
    }

    pub fn enqueue_outcome(&self, outcome: SandboxOutcome) {
        self.enqueue(report_for(outcome));
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<SandboxRequest> {
        self.seen.lock().expect("scripted sandbox poisoned").clone()
    }

    pub fn run_count(&self) -> usize {
        self.seen.lock().expect("scripted sandbox poisoned").len()
    }
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn report_for(outcome: SandboxOutcome) -> SandboxReport {
    SandboxReport {
        outcome,
        exit_status: Some(if outcome == SandboxOutcome::Passed { 0 } else { 1 }),
        stdout: String::new(),
        stderr: String::new(),
        usage: ResourceUsage::default(),
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxReport, SandboxError> {
        self.seen
            .lock()
            .expect("scripted sandbox poisoned")
            .push(request);
        let report = self
            .queued
            .lock()
            .expect("scripted sandbox poisoned")
            .pop_front()
            .unwrap_or_else(|| report_for(self.default_outcome));
        Ok(report)
    }
}
