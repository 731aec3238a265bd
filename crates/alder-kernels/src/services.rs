//! Named sub-services the kernels plan against.

use alder_governance::GovernanceEngine;
use alder_learning::LearningStore;
use alder_mesh::TriggerMesh;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Per-component readiness, populated by the composition root and read by
/// the infrastructure kernel and the health surface.
#[derive(Default)]
pub struct ReadinessBoard {
    components: DashMap<String, bool>,
}

impl ReadinessBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, component: impl Into<String>, ready: bool) {
        self.components.insert(component.into(), ready);
    }

    pub fn snapshot(&self) -> Vec<(String, bool)> {
        let mut all: Vec<(String, bool)> = self
            .components
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort();
        all
    }

    pub fn all_ready(&self) -> bool {
        self.components.iter().all(|e| *e.value())
    }
}

/// A note kept by the memory kernel.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MemoryNote {
    pub key: String,
    pub content: String,
    pub stored_at: DateTime<Utc>,
}

/// The memory kernel's own store.
#[derive(Default)]
pub struct NoteStore {
    notes: DashMap<String, MemoryNote>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, key: impl Into<String>, content: impl Into<String>) -> MemoryNote {
        let note = MemoryNote {
            key: key.into(),
            content: content.into(),
            stored_at: Utc::now(),
        };
        self.notes.insert(note.key.clone(), note.clone());
        note
    }

    pub fn all(&self) -> Vec<MemoryNote> {
        let mut notes: Vec<MemoryNote> = self.notes.iter().map(|e| e.value().clone()).collect();
        notes.sort_by(|a, b| a.key.cmp(&b.key));
        notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Everything a kernel may consult, wired once by the composition root.
/// Cross-references between subsystems stay behind these handles; kernels
/// never reach into each other directly.
#[derive(Clone)]
pub struct KernelServices {
    pub mesh: TriggerMesh,
    pub governance: Arc<GovernanceEngine>,
    pub learning: Arc<LearningStore>,
    pub readiness: Arc<ReadinessBoard>,
    pub notes: Arc<NoteStore>,
    pub started_at: DateTime<Utc>,
}
