//! Trace recording for kernel plans.

use alder_types::{ExecutionTrace, TraceStep};
use std::time::Instant;

/// Builds an [`ExecutionTrace`] step by step while a plan executes.
pub struct TraceRecorder {
    started: Instant,
    trace: ExecutionTrace,
}

impl TraceRecorder {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            trace: ExecutionTrace::new(request_id),
        }
    }

    /// Record one executed step. `data_source` feeds the trace's aggregate
    /// source list; governance checks are counted separately.
    pub fn step(
        &mut self,
        component: &str,
        action: &str,
        data_source: Option<&str>,
        cache_hit: bool,
        started: Instant,
        error: Option<String>,
    ) {
        let duration_ms = started.elapsed().as_millis() as u64;
        if let Some(source) = data_source {
            if !self.trace.data_sources_used.iter().any(|s| s == source) {
                self.trace.data_sources_used.push(source.to_string());
            }
        }
        if cache_hit {
            self.trace.cache_hits += 1;
        }
        self.trace.steps.push(TraceStep {
            component: component.to_string(),
            action: action.to_string(),
            duration_ms,
            data_source: data_source.map(str::to_string),
            cache_hit,
            error,
        });
    }

    pub fn count_governance_check(&mut self) {
        self.trace.governance_checks += 1;
    }

    pub fn count_database_query(&mut self) {
        self.trace.database_queries += 1;
    }

    pub fn add_agent(&mut self, agent: &str) {
        if !self.trace.agents_involved.iter().any(|a| a == agent) {
            self.trace.agents_involved.push(agent.to_string());
        }
    }

    /// Close the trace and hand it over.
    pub fn finish(mut self) -> ExecutionTrace {
        self.trace.total_duration_ms = self.started.elapsed().as_millis() as u64;
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_accumulate_in_order() {
        let mut recorder = TraceRecorder::new("req-1");
        let t0 = Instant::now();
        recorder.step("memory", "recall", Some("pattern-store"), true, t0, None);
        recorder.step(
            "governance",
            "check",
            None,
            false,
            t0,
            Some("denied".to_string()),
        );
        recorder.count_governance_check();

        let trace = recorder.finish();
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[0].action, "recall");
        assert_eq!(trace.steps[1].error.as_deref(), Some("denied"));
        assert_eq!(trace.cache_hits, 1);
        assert_eq!(trace.governance_checks, 1);
        assert_eq!(trace.data_sources_used, vec!["pattern-store"]);
        assert_eq!(trace.error_count(), 1);
    }
}
