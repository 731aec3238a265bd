//! Execution traces attached to kernel responses and long operations.

use serde::{Deserialize, Serialize};

/// One step of an executed plan, in execution order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub component: String,
    pub action: String,
    pub duration_ms: u64,
    pub data_source: Option<String>,
    pub cache_hit: bool,
    pub error: Option<String>,
}

/// First-class trace of a multi-step operation. Steps are locally totally
/// ordered by their index in `steps`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub request_id: String,
    pub total_duration_ms: u64,
    pub steps: Vec<TraceStep>,
    pub data_sources_used: Vec<String>,
    pub agents_involved: Vec<String>,
    pub database_queries: u32,
    pub cache_hits: u32,
    pub governance_checks: u32,
}

impl ExecutionTrace {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            total_duration_ms: 0,
            steps: Vec::new(),
            data_sources_used: Vec::new(),
            agents_involved: Vec::new(),
            database_queries: 0,
            cache_hits: 0,
            governance_checks: 0,
        }
    }

    /// Number of steps that recorded an error.
    pub fn error_count(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }
}
