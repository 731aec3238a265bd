//! Alder learning store.
//!
//! Observes outcomes, never acts: the store keeps [`ErrorPattern`] and
//! [`FixStrategy`] records current as errors are detected and healing
//! attempts complete, ranks strategies for the fix proposer, and predicts
//! per-domain reliability for triage. State snapshots to a JSON checkpoint
//! and is reconstructable by replaying the audit stream.

#![deny(unsafe_code)]

use alder_audit::AuditEntry;
use alder_types::{
    event_types, ErrorPattern, ErrorSignature, FixStrategy, HealingAttempt, RecipeKind,
};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("snapshot I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialized checkpoint of the whole store.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    patterns: Vec<ErrorPattern>,
    strategies: Vec<FixStrategy>,
}

/// In-memory registry of patterns and strategies. Thread-safe; the maps are
/// the only shared state and take no other subsystem's locks.
#[derive(Default)]
pub struct LearningStore {
    patterns: DashMap<String, ErrorPattern>,
    /// Keyed by pattern signature; each entry holds that pattern's
    /// strategies in no particular order.
    strategies: DashMap<String, Vec<FixStrategy>>,
}

impl LearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of an error signature, seeding the default
    /// strategy candidates for its classification on first sight.
    pub fn observe_error(&self, signature: &ErrorSignature) -> ErrorPattern {
        let key = signature.key();
        let pattern = match self.patterns.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                occupied.get_mut().record_occurrence();
                occupied.into_ref()
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(ErrorPattern::new(signature.clone()))
            }
        };
        let snapshot = pattern.clone();
        drop(pattern);

        self.strategies.entry(key.clone()).or_insert_with(|| {
            RecipeKind::candidates_for(signature.classification)
                .iter()
                .map(|kind| FixStrategy::new(key.clone(), *kind))
                .collect()
        });
        snapshot
    }

    /// Update strategy bookkeeping from a completed healing attempt.
    pub fn record_attempt(&self, attempt: &HealingAttempt) {
        let mut strategies = self
            .strategies
            .entry(attempt.pattern_signature.clone())
            .or_default();
        let strategy = match strategies
            .iter_mut()
            .find(|s| s.strategy_kind == attempt.strategy_kind)
        {
            Some(s) => s,
            None => {
                strategies.push(FixStrategy::new(
                    attempt.pattern_signature.clone(),
                    attempt.strategy_kind,
                ));
                strategies.last_mut().expect("just pushed")
            }
        };
        strategy.record(attempt.counts_as_success());
        tracing::debug!(
            pattern = %attempt.pattern_signature,
            strategy = %attempt.strategy_kind,
            success = attempt.counts_as_success(),
            rate = strategy.smoothed_success_rate(),
            "healing attempt recorded"
        );
    }

    /// The top `k` strategies for a pattern, ranked by smoothed success
    /// rate times a recency weight that decays over a week of disuse.
    pub fn top_strategies(&self, pattern_signature: &str, k: usize) -> Vec<FixStrategy> {
        let Some(strategies) = self.strategies.get(pattern_signature) else {
            return Vec::new();
        };
        let now = Utc::now();
        let mut ranked: Vec<(f64, FixStrategy)> = strategies
            .iter()
            .map(|s| {
                let recency = match s.last_attempt {
                    Some(at) => {
                        let hours = (now - at).num_minutes() as f64 / 60.0;
                        (-hours / 168.0).exp().clamp(0.0, 1.0)
                    }
                    None => 1.0,
                };
                (s.smoothed_success_rate() * recency, s.clone())
            })
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().take(k).map(|(_, s)| s).collect()
    }

    /// Attempt-weighted mean success rate over every pattern whose file
    /// lives under `resource_domain`. 0.5 with no evidence.
    pub fn predict_reliability(&self, resource_domain: &str) -> f64 {
        let mut weighted = 0.0;
        let mut weight = 0.0;
        for entry in self.patterns.iter() {
            let pattern = entry.value();
            if !pattern.signature.file.starts_with(resource_domain) {
                continue;
            }
            if let Some(strategies) = self.strategies.get(&entry.key().clone()) {
                for strategy in strategies.iter() {
                    let n = strategy.attempts as f64;
                    if n > 0.0 {
                        weighted += strategy.smoothed_success_rate() * n;
                        weight += n;
                    }
                }
            }
        }
        if weight == 0.0 {
            0.5
        } else {
            (weighted / weight).clamp(0.0, 1.0)
        }
    }

    pub fn pattern(&self, key: &str) -> Option<ErrorPattern> {
        self.patterns.get(key).map(|p| p.clone())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// The `k` most recently seen patterns, newest first.
    pub fn recent_patterns(&self, k: usize) -> Vec<ErrorPattern> {
        let mut patterns: Vec<ErrorPattern> = self.patterns.iter().map(|p| p.clone()).collect();
        patterns.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        patterns.truncate(k);
        patterns
    }

    /// Write a JSON checkpoint of the whole store.
    pub fn snapshot_to(&self, path: impl AsRef<Path>) -> Result<(), LearningError> {
        let snapshot = Snapshot {
            patterns: self.patterns.iter().map(|p| p.clone()).collect(),
            strategies: self
                .strategies
                .iter()
                .flat_map(|entry| entry.value().clone())
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a checkpoint written by [`LearningStore::snapshot_to`].
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, LearningError> {
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let store = Self::new();
        for pattern in snapshot.patterns {
            store.patterns.insert(pattern.signature.key(), pattern);
        }
        for strategy in snapshot.strategies {
            store
                .strategies
                .entry(strategy.pattern_signature.clone())
                .or_default()
                .push(strategy);
        }
        Ok(store)
    }

    /// Fold one audit entry into the store. Replaying the stream through
    /// this method reconstructs the same counts the live process built.
    pub fn apply_audit_entry(&self, entry: &AuditEntry) {
        let event = &entry.event;
        match event.event_type.as_str() {
            event_types::ERROR_DETECTED => {
                if let Ok(signature) =
                    serde_json::from_value::<ErrorSignature>(event.payload["signature"].clone())
                {
                    self.observe_error(&signature);
                }
            }
            event_types::FIX_APPLIED
            | event_types::FIX_REVERTED
            | event_types::SANDBOX_FAILED => {
                if let Ok(attempt) =
                    serde_json::from_value::<HealingAttempt>(event.payload["attempt"].clone())
                {
                    self.record_attempt(&attempt);
                }
            }
            _ => {}
        }
    }
}
