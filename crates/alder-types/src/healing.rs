//! Healing-loop records: error patterns, fix strategies, and attempts.

use crate::event::CorrelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Laplace smoothing constant for strategy success rates. With zero attempts
/// the smoothed rate is exactly 0.5, a neutral prior.
pub const SMOOTHING_ALPHA: f64 = 1.0;

/// Closed classification tag set for detected errors. `Unknown` is the
/// catch-all; deployments extend the set by adding variants here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    IncorrectAwait,
    MissingAttribute,
    Serialization,
    ImportError,
    Timeout,
    Unknown,
}

impl ErrorClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClassification::IncorrectAwait => "incorrect_await",
            ErrorClassification::MissingAttribute => "missing_attribute",
            ErrorClassification::Serialization => "serialization",
            ErrorClassification::ImportError => "import_error",
            ErrorClassification::Timeout => "timeout",
            ErrorClassification::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized identity of an error: class plus a location template. Line
/// numbers are kept; transient parts of messages are not.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorSignature {
    pub classification: ErrorClassification,
    pub error_class: String,
    pub file: String,
    pub line: u32,
}

impl ErrorSignature {
    /// Stable string key used by the learning store and audit payloads.
    pub fn key(&self) -> String {
        format!(
            "{}:{}@{}:{}",
            self.classification.as_str(),
            self.error_class,
            self.file,
            self.line
        )
    }
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Aggregate record of one error signature over time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub signature: ErrorSignature,
    pub occurrences: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ErrorPattern {
    pub fn new(signature: ErrorSignature) -> Self {
        let now = Utc::now();
        Self {
            signature,
            occurrences: 1,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn record_occurrence(&mut self) {
        self.occurrences += 1;
        self.last_seen = Utc::now();
    }
}

/// Identifier of an edit recipe. Recipes are shared between the resilient
/// supervisor and the fix proposer so both heal the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    RemoveIncorrectAwait,
    AddMissingMethodShim,
    AddMissingImport,
    NormalizeSerialization,
    ExtendTimeout,
}

impl RecipeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeKind::RemoveIncorrectAwait => "remove_incorrect_await",
            RecipeKind::AddMissingMethodShim => "add_missing_method_shim",
            RecipeKind::AddMissingImport => "add_missing_import",
            RecipeKind::NormalizeSerialization => "normalize_serialization",
            RecipeKind::ExtendTimeout => "extend_timeout",
        }
    }

    /// Default recipe candidates for a classification, in preference order.
    pub fn candidates_for(classification: ErrorClassification) -> &'static [RecipeKind] {
        match classification {
            ErrorClassification::IncorrectAwait => &[RecipeKind::RemoveIncorrectAwait],
            ErrorClassification::MissingAttribute => &[RecipeKind::AddMissingMethodShim],
            ErrorClassification::ImportError => &[RecipeKind::AddMissingImport],
            ErrorClassification::Serialization => &[RecipeKind::NormalizeSerialization],
            ErrorClassification::Timeout => &[RecipeKind::ExtendTimeout],
            ErrorClassification::Unknown => &[],
        }
    }
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success bookkeeping for one (pattern, recipe) pairing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixStrategy {
    pub pattern_signature: String,
    pub strategy_kind: RecipeKind,
    pub attempts: u64,
    pub successes: u64,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl FixStrategy {
    pub fn new(pattern_signature: impl Into<String>, strategy_kind: RecipeKind) -> Self {
        Self {
            pattern_signature: pattern_signature.into(),
            strategy_kind,
            attempts: 0,
            successes: 0,
            last_attempt: None,
        }
    }

    /// Laplace-smoothed success rate: (s + α) / (n + 2α).
    pub fn smoothed_success_rate(&self) -> f64 {
        (self.successes as f64 + SMOOTHING_ALPHA)
            / (self.attempts as f64 + 2.0 * SMOOTHING_ALPHA)
    }

    /// Half-width of a crude confidence band; shrinks with attempts.
    pub fn confidence_band(&self) -> f64 {
        0.5 / (1.0 + (self.attempts as f64)).sqrt()
    }

    pub fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
        self.last_attempt = Some(Utc::now());
    }
}

/// Outcome of a sandbox verification run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxOutcome {
    Passed,
    Failed,
    Blocked,
    Cancelled,
}

impl SandboxOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxOutcome::Passed => "passed",
            SandboxOutcome::Failed => "failed",
            SandboxOutcome::Blocked => "blocked",
            SandboxOutcome::Cancelled => "cancelled",
        }
    }
}

/// One complete pass of the healing loop for one error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub id: String,
    pub pattern_signature: String,
    pub strategy_kind: RecipeKind,
    pub resource: String,
    pub sandbox_outcome: SandboxOutcome,
    pub applied: bool,
    pub reverted: bool,
    pub correlation_id: CorrelationId,
    pub completed_at: DateTime<Utc>,
}

impl HealingAttempt {
    pub fn new(
        pattern_signature: impl Into<String>,
        strategy_kind: RecipeKind,
        resource: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pattern_signature: pattern_signature.into(),
            strategy_kind,
            resource: resource.into(),
            sandbox_outcome: SandboxOutcome::Blocked,
            applied: false,
            reverted: false,
            correlation_id,
            completed_at: Utc::now(),
        }
    }

    /// A strategy success is a pass that was applied and stayed applied.
    pub fn counts_as_success(&self) -> bool {
        self.sandbox_outcome == SandboxOutcome::Passed && self.applied && !self.reverted
    }
}
