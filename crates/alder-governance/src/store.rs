//! Policy document loading. Fails closed: until all three documents load
//! and compile, the engine denies every mutating action.

use crate::constitution::ConstitutionDoc;
use crate::guardrails::{GuardrailSet, GuardrailsDoc};
use crate::whitelist::WhitelistDoc;
use crate::GovernanceError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// One coherent set of compiled policy documents.
pub struct PolicyBundle {
    pub constitution: ConstitutionDoc,
    pub guardrails: GuardrailSet,
    pub whitelist: WhitelistDoc,
}

/// Holder of the current policy bundle, hot-reloadable from disk.
#[derive(Clone)]
pub struct PolicyStore {
    dir: PathBuf,
    current: Arc<RwLock<Option<Arc<PolicyBundle>>>>,
}

impl PolicyStore {
    /// Create a store over `dir` and attempt an initial load. The store is
    /// returned even when the load fails so the engine can run fail-closed;
    /// the load error is reported for logging.
    pub fn open(dir: impl AsRef<Path>) -> (Self, Result<(), GovernanceError>) {
        let store = Self {
            dir: dir.as_ref().to_path_buf(),
            current: Arc::new(RwLock::new(None)),
        };
        let result = store.reload();
        (store, result)
    }

    /// Build a store from in-memory documents (tests, embedded defaults).
    pub fn from_documents(
        constitution: ConstitutionDoc,
        guardrails: GuardrailsDoc,
        whitelist: WhitelistDoc,
    ) -> Result<Self, GovernanceError> {
        let compiled =
            GuardrailSet::compile(guardrails).map_err(|detail| GovernanceError::InvalidPolicy {
                name: "guardrails".to_string(),
                detail,
            })?;
        let bundle = PolicyBundle {
            constitution,
            guardrails: compiled,
            whitelist,
        };
        Ok(Self {
            dir: PathBuf::new(),
            current: Arc::new(RwLock::new(Some(Arc::new(bundle)))),
        })
    }

    /// Re-read all three documents from disk. On any failure the previous
    /// bundle is discarded: a half-loaded policy set must not keep
    /// approving actions.
    pub fn reload(&self) -> Result<(), GovernanceError> {
        let result = self.load_bundle();
        let mut current = self.current.write().expect("policy store lock poisoned");
        match result {
            Ok(bundle) => {
                *current = Some(Arc::new(bundle));
                tracing::info!(dir = %self.dir.display(), "policy documents loaded");
                Ok(())
            }
            Err(err) => {
                *current = None;
                tracing::error!(%err, dir = %self.dir.display(), "policy load failed; governance is fail-closed");
                Err(err)
            }
        }
    }

    fn load_bundle(&self) -> Result<PolicyBundle, GovernanceError> {
        let constitution: ConstitutionDoc = self.read_doc("constitution.yaml")?;
        let guardrails_doc: GuardrailsDoc = self.read_doc("guardrails.yaml")?;
        let whitelist: WhitelistDoc = self.read_doc("whitelist.yaml")?;

        let guardrails = GuardrailSet::compile(guardrails_doc).map_err(|detail| {
            GovernanceError::InvalidPolicy {
                name: "guardrails".to_string(),
                detail,
            }
        })?;

        Ok(PolicyBundle {
            constitution,
            guardrails,
            whitelist,
        })
    }

    fn read_doc<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, GovernanceError> {
        let path = self.dir.join(name);
        let text = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(|e| GovernanceError::InvalidPolicy {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }

    /// The current bundle, or `None` while fail-closed.
    pub fn bundle(&self) -> Option<Arc<PolicyBundle>> {
        self.current
            .read()
            .expect("policy store lock poisoned")
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.bundle().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSTITUTION: &str = r#"
version: "1.0"
action_catalog:
  never_allowed: ["delete_audit_log"]
"#;
    const GUARDRAILS: &str = r#"
filesystem:
  forbidden_directories: ["/etc"]
"#;
    const WHITELIST: &str = r#"
per_tier_actions:
  "2": ["apply_code_patch"]
"#;

    #[test]
    fn loads_a_complete_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("constitution.yaml"), CONSTITUTION).unwrap();
        std::fs::write(dir.path().join("guardrails.yaml"), GUARDRAILS).unwrap();
        std::fs::write(dir.path().join("whitelist.yaml"), WHITELIST).unwrap();

        let (store, result) = PolicyStore::open(dir.path());
        result.unwrap();
        assert!(store.is_loaded());
    }

    #[test]
    fn missing_documents_fail_closed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("constitution.yaml"), CONSTITUTION).unwrap();
        // guardrails.yaml and whitelist.yaml absent

        let (store, result) = PolicyStore::open(dir.path());
        assert!(result.is_err());
        assert!(!store.is_loaded());
    }

    #[test]
    fn a_bad_reload_discards_the_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("constitution.yaml"), CONSTITUTION).unwrap();
        std::fs::write(dir.path().join("guardrails.yaml"), GUARDRAILS).unwrap();
        std::fs::write(dir.path().join("whitelist.yaml"), WHITELIST).unwrap();

        let (store, result) = PolicyStore::open(dir.path());
        result.unwrap();

        std::fs::write(dir.path().join("whitelist.yaml"), "per_tier_actions: 3").unwrap();
        assert!(store.reload().is_err());
        assert!(!store.is_loaded());
    }
}
