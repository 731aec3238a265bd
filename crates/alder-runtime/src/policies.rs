//! Shipped default policy documents.
//!
//! Deployments are expected to replace these; they exist so a fresh
//! checkout reaches a governed, fail-safe state without hand-writing
//! YAML. The defaults keep the platform conservative: tier-gated patch
//! application, tier changes behind human approval, and no sandbox
//! exemptions.

use std::io;
use std::path::Path;

const CONSTITUTION: &str = r#"version: "1.0"
core_values:
  - transparency
  - reversibility
  - bounded autonomy
fundamental_rights:
  - human operators may override any automated decision
  - every mutating action leaves an audit trail
action_catalog:
  never_allowed:
    - delete_audit_log
    - disable_governance
  requires_approval:
    - set_autonomy_tier
    - reload_policy
  auto_approved: []
escalation_policy:
  low_confidence: queue_for_human_approval
  multiple_failures: suspend_strategy_and_notify
  security_threat: halt_and_page_operator
  constitutional_violation: deny_and_record
tier_definitions:
  - tier: 0
    name: manual
    description: every action needs a human
  - tier: 1
    name: supervised
    description: read paths free, mutations queued
  - tier: 2
    name: semi_autonomous
    description: known-good fixes may auto-apply
    confidence_threshold: 0.75
  - tier: 3
    name: autonomous
    description: full healing loop
    confidence_threshold: 0.6
"#;

const GUARDRAILS: &str = r#"filesystem:
  allowed_directories:
    - src
    - services
  forbidden_directories:
    - /etc
    - /root
    - secrets
code_generation:
  max_lines_per_file: 2000
  forbidden_imports:
    - import ctypes
    - import subprocess
  forbidden_patterns:
    - "eval\\s*\\("
    - "exec\\s*\\("
    - "os\\.system"
resource_limits:
  max_memory_mb: 1024
  max_cpu_percent: 80
  max_files_modified_per_session: 25
  max_actions_per_minute: 60
database:
  read_only_tables:
    - audit_entries
  forbidden_statements:
    - DROP
    - TRUNCATE
required_metadata: []
"#;

const WHITELIST: &str = r#"per_tier_actions:
  "0":
    - set_autonomy_tier
    - reload_policy
  "1":
    - store_memory_note
  "2":
    - apply_code_patch
    - revert_code_patch
per_actor_trust:
  system: 0.8
approved_file_globs:
  - "src/**"
  - "services/**"
auto_approve_actions:
  - apply_code_patch
  - revert_code_patch
  - store_memory_note
sandbox_exempt_strategies: []
"#;

/// Write the default documents into `dir` for any that are missing.
pub fn ensure_default_policies(dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    for (name, content) in [
        ("constitution.yaml", CONSTITUTION),
        ("guardrails.yaml", GUARDRAILS),
        ("whitelist.yaml", WHITELIST),
    ] {
        let path = dir.join(name);
        if !path.exists() {
            std::fs::write(&path, content)?;
            tracing::info!(path = %path.display(), "default policy document written");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_governance::PolicyStore;

    #[test]
    fn defaults_load_and_compile() {
        let dir = tempfile::tempdir().unwrap();
        ensure_default_policies(dir.path()).unwrap();
        let (store, result) = PolicyStore::open(dir.path());
        result.unwrap();
        assert!(store.is_loaded());
    }

    #[test]
    fn existing_documents_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whitelist.yaml"), "per_tier_actions: {}\n").unwrap();
        ensure_default_policies(dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("whitelist.yaml")).unwrap();
        assert_eq!(text, "per_tier_actions: {}\n");
    }
}
