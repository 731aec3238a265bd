//! Kernel gateway contracts: requests, responses, and provenance.

use crate::event::CorrelationId;
use crate::trace::ExecutionTrace;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The eight domain kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelName {
    Core,
    Memory,
    Code,
    Governance,
    Verification,
    Intelligence,
    Infrastructure,
    Federation,
}

impl KernelName {
    pub fn all() -> &'static [KernelName] {
        &[
            KernelName::Core,
            KernelName::Memory,
            KernelName::Code,
            KernelName::Governance,
            KernelName::Verification,
            KernelName::Intelligence,
            KernelName::Infrastructure,
            KernelName::Federation,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KernelName::Core => "core",
            KernelName::Memory => "memory",
            KernelName::Code => "code",
            KernelName::Governance => "governance",
            KernelName::Verification => "verification",
            KernelName::Intelligence => "intelligence",
            KernelName::Infrastructure => "infrastructure",
            KernelName::Federation => "federation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Some(KernelName::Core),
            "memory" => Some(KernelName::Memory),
            "code" => Some(KernelName::Code),
            "governance" => Some(KernelName::Governance),
            "verification" => Some(KernelName::Verification),
            "intelligence" => Some(KernelName::Intelligence),
            "infrastructure" => Some(KernelName::Infrastructure),
            "federation" => Some(KernelName::Federation),
            _ => None,
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A natural-language intent addressed to one kernel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelRequest {
    pub kernel: KernelName,
    pub intent: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub correlation_id: CorrelationId,
}

impl KernelRequest {
    pub fn new(kernel: KernelName, intent: impl Into<String>) -> Self {
        Self {
            kernel,
            intent: intent.into(),
            context: Map::new(),
            correlation_id: CorrelationId::generate(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Where a piece of response data came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub source_type: String,
    pub source_id: String,
    pub confidence: f64,
    pub verified: bool,
}

/// The kernel's aggregated answer with full traceability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelResponse {
    pub answer: String,
    pub data: Map<String, Value>,
    pub execution_trace: ExecutionTrace,
    pub data_provenance: Vec<ProvenanceRecord>,
    pub trust_score: f64,
    pub kernels_consulted: Vec<KernelName>,
    pub apis_called: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceStep;

    #[test]
    fn kernel_names_parse_round_trip() {
        for k in KernelName::all() {
            assert_eq!(KernelName::parse(k.as_str()), Some(*k));
        }
        assert_eq!(KernelName::parse("quantum"), None);
    }

    #[test]
    fn response_serde_preserves_trace_and_provenance() {
        let mut trace = ExecutionTrace::new("req-9");
        trace.steps.push(TraceStep {
            component: "memory".into(),
            action: "recall".into(),
            duration_ms: 12,
            data_source: Some("pattern-store".into()),
            cache_hit: true,
            error: None,
        });
        trace.total_duration_ms = 12;
        trace.cache_hits = 1;

        let response = KernelResponse {
            answer: "3 patterns recalled".into(),
            data: Map::new(),
            execution_trace: trace,
            data_provenance: vec![ProvenanceRecord {
                source_type: "store".into(),
                source_id: "pattern-store".into(),
                confidence: 0.9,
                verified: true,
            }],
            trust_score: 0.9,
            kernels_consulted: vec![KernelName::Memory],
            apis_called: vec![],
        };

        let json = serde_json::to_string(&response).unwrap();
        let back: KernelResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }
}
