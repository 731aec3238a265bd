//! Closed capability vocabularies, one per kernel.

use crate::KernelError;
use alder_types::KernelName;

/// Every capability the gateway can execute, scoped by kernel. The parser
/// maps free text onto exactly one of these tokens or rejects the intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    // core
    CoreStatus,
    CoreUptime,

    // memory
    MemoryStoreNote,
    MemoryRecallNotes,
    MemoryRecallPatterns,

    // code
    CodeAnalyzeArtifact,
    CodeProposePatch,

    // governance
    GovernanceShowTier,
    GovernanceListApprovals,

    // verification
    VerificationVerifyChain,
    VerificationRecentOutcomes,

    // intelligence
    IntelligencePredictReliability,
    IntelligenceTopStrategies,

    // infrastructure
    InfrastructureAllocate,
    InfrastructureReadiness,

    // federation
    FederationListReplicas,
    FederationSyncStatus,
}

impl Capability {
    pub fn kernel(&self) -> KernelName {
        use Capability::*;
        match self {
            CoreStatus | CoreUptime => KernelName::Core,
            MemoryStoreNote | MemoryRecallNotes | MemoryRecallPatterns => KernelName::Memory,
            CodeAnalyzeArtifact | CodeProposePatch => KernelName::Code,
            GovernanceShowTier | GovernanceListApprovals => KernelName::Governance,
            VerificationVerifyChain | VerificationRecentOutcomes => KernelName::Verification,
            IntelligencePredictReliability | IntelligenceTopStrategies => {
                KernelName::Intelligence
            }
            InfrastructureAllocate | InfrastructureReadiness => KernelName::Infrastructure,
            FederationListReplicas | FederationSyncStatus => KernelName::Federation,
        }
    }

    pub fn token(&self) -> &'static str {
        use Capability::*;
        match self {
            CoreStatus => "status",
            CoreUptime => "uptime",
            MemoryStoreNote => "store_note",
            MemoryRecallNotes => "recall_notes",
            MemoryRecallPatterns => "recall_patterns",
            CodeAnalyzeArtifact => "analyze_artifact",
            CodeProposePatch => "propose_patch",
            GovernanceShowTier => "show_tier",
            GovernanceListApprovals => "list_approvals",
            VerificationVerifyChain => "verify_chain",
            VerificationRecentOutcomes => "recent_outcomes",
            IntelligencePredictReliability => "predict_reliability",
            IntelligenceTopStrategies => "top_strategies",
            InfrastructureAllocate => "allocate",
            InfrastructureReadiness => "readiness",
            FederationListReplicas => "list_replicas",
            FederationSyncStatus => "sync_status",
        }
    }

    /// Whether executing this capability mutates platform state directly
    /// (and must therefore clear governance inside the gateway).
    /// `propose_patch` is absent: it hands off to the healing pipeline,
    /// which runs its own governed apply.
    pub fn mutating(&self) -> bool {
        matches!(self, Capability::MemoryStoreNote)
    }
}

/// All capability tokens of one kernel, for error messages and docs.
pub fn vocabulary(kernel: KernelName) -> Vec<&'static str> {
    all()
        .iter()
        .filter(|c| c.kernel() == kernel)
        .map(|c| c.token())
        .collect()
}

fn all() -> &'static [Capability] {
    use Capability::*;
    &[
        CoreStatus,
        CoreUptime,
        MemoryStoreNote,
        MemoryRecallNotes,
        MemoryRecallPatterns,
        CodeAnalyzeArtifact,
        CodeProposePatch,
        GovernanceShowTier,
        GovernanceListApprovals,
        VerificationVerifyChain,
        VerificationRecentOutcomes,
        IntelligencePredictReliability,
        IntelligenceTopStrategies,
        InfrastructureAllocate,
        InfrastructureReadiness,
        FederationListReplicas,
        FederationSyncStatus,
    ]
}

/// Reduce free text to one capability token of `kernel`.
///
/// Matching is deliberately simple: the exact token wins, then a small set
/// of keyword aliases. A classifier can replace this seam without touching
/// the gateway; the contract is only "one token or a structured error".
pub fn parse_intent(kernel: KernelName, intent: &str) -> Result<Capability, KernelError> {
    let lowered = intent.to_ascii_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();

    // Exact token match first.
    for capability in all().iter().filter(|c| c.kernel() == kernel) {
        if words.contains(&capability.token()) {
            return Ok(*capability);
        }
    }

    let found = match kernel {
        KernelName::Core => {
            if contains_any(&words, &["status", "health", "overview"]) {
                Some(Capability::CoreStatus)
            } else if contains_any(&words, &["uptime", "running", "alive"]) {
                Some(Capability::CoreUptime)
            } else {
                None
            }
        }
        KernelName::Memory => {
            if contains_any(&words, &["store", "remember", "save"]) {
                Some(Capability::MemoryStoreNote)
            } else if contains_any(&words, &["pattern", "patterns", "errors"]) {
                Some(Capability::MemoryRecallPatterns)
            } else if contains_any(&words, &["recall", "notes", "retrieve"]) {
                Some(Capability::MemoryRecallNotes)
            } else {
                None
            }
        }
        KernelName::Code => {
            if contains_any(&words, &["analyze", "analyse", "inspect", "review"]) {
                Some(Capability::CodeAnalyzeArtifact)
            } else if contains_any(&words, &["patch", "fix", "repair", "propose"]) {
                Some(Capability::CodeProposePatch)
            } else {
                None
            }
        }
        KernelName::Governance => {
            if contains_any(&words, &["tier", "autonomy"]) {
                Some(Capability::GovernanceShowTier)
            } else if contains_any(&words, &["approval", "approvals", "pending"]) {
                Some(Capability::GovernanceListApprovals)
            } else {
                None
            }
        }
        KernelName::Verification => {
            if contains_any(&words, &["chain", "verify", "integrity"]) {
                Some(Capability::VerificationVerifyChain)
            } else if contains_any(&words, &["sandbox", "outcomes", "runs"]) {
                Some(Capability::VerificationRecentOutcomes)
            } else {
                None
            }
        }
        KernelName::Intelligence => {
            if contains_any(&words, &["reliability", "predict", "risk"]) {
                Some(Capability::IntelligencePredictReliability)
            } else if contains_any(&words, &["strategies", "strategy", "best"]) {
                Some(Capability::IntelligenceTopStrategies)
            } else {
                None
            }
        }
        KernelName::Infrastructure => {
            if contains_any(&words, &["allocate", "allocation", "hardware", "resources"]) {
                Some(Capability::InfrastructureAllocate)
            } else if contains_any(&words, &["readiness", "ready", "components"]) {
                Some(Capability::InfrastructureReadiness)
            } else {
                None
            }
        }
        KernelName::Federation => {
            if contains_any(&words, &["replicas", "peers", "nodes"]) {
                Some(Capability::FederationListReplicas)
            } else if contains_any(&words, &["sync", "lag", "replication"]) {
                Some(Capability::FederationSyncStatus)
            } else {
                None
            }
        }
    };

    found.ok_or_else(|| KernelError::UnknownIntent {
        kernel,
        intent: intent.to_string(),
        vocabulary: vocabulary(kernel),
    })
}

fn contains_any(words: &[&str], keywords: &[&str]) -> bool {
    words.iter().any(|w| keywords.contains(w))
}
