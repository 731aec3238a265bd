//! The guardrails layer: typed, composable safety checks.
//!
//! Each check inspects one aspect of an action request. A check that
//! errors internally counts as failed; the engine never lets a broken
//! check wave an action through.

use alder_types::{ActionRequest, LayerResult, PolicyLayer};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilesystemRules {
    #[serde(default)]
    pub allowed_directories: Vec<String>,
    #[serde(default)]
    pub forbidden_directories: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CodeGenerationRules {
    #[serde(default)]
    pub max_lines_per_file: Option<usize>,
    #[serde(default)]
    pub forbidden_imports: Vec<String>,
    #[serde(default)]
    pub forbidden_patterns: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
    #[serde(default)]
    pub max_cpu_percent: Option<u8>,
    #[serde(default)]
    pub max_files_modified_per_session: Option<u64>,
    #[serde(default)]
    pub max_actions_per_minute: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseRules {
    #[serde(default)]
    pub read_only_tables: Vec<String>,
    #[serde(default)]
    pub forbidden_statements: Vec<String>,
}

/// The declarative guardrails document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GuardrailsDoc {
    #[serde(default)]
    pub filesystem: FilesystemRules,
    #[serde(default)]
    pub code_generation: CodeGenerationRules,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default)]
    pub database: DatabaseRules,
    /// Keys that must be present in every mutating payload.
    #[serde(default)]
    pub required_metadata: Vec<String>,
}

/// Compiled guardrails with per-session counters.
pub struct GuardrailSet {
    doc: GuardrailsDoc,
    forbidden_patterns: Vec<Regex>,
    session: Mutex<SessionCounters>,
}

struct SessionCounters {
    files_modified: u64,
    action_times: VecDeque<DateTime<Utc>>,
}

impl GuardrailSet {
    /// Compile the document. Invalid regexes fail compilation, which the
    /// loader treats as a failed (fail-closed) policy load.
    pub fn compile(doc: GuardrailsDoc) -> Result<Self, String> {
        let mut forbidden_patterns = Vec::new();
        for pattern in &doc.code_generation.forbidden_patterns {
            let regex = Regex::new(pattern)
                .map_err(|e| format!("forbidden pattern '{pattern}' is invalid: {e}"))?;
            forbidden_patterns.push(regex);
        }
        Ok(Self {
            doc,
            forbidden_patterns,
            session: Mutex::new(SessionCounters {
                files_modified: 0,
                action_times: VecDeque::new(),
            }),
        })
    }

    pub fn doc(&self) -> &GuardrailsDoc {
        &self.doc
    }

    /// Forbidden patterns compiled from the document, shared with preflight.
    pub fn forbidden_patterns(&self) -> &[Regex] {
        &self.forbidden_patterns
    }

    /// Evaluate the guardrails layer. The first failing check decides.
    pub fn evaluate(&self, request: &ActionRequest) -> LayerResult {
        let checks: [(&str, Result<(), String>); 5] = [
            ("filesystem", self.check_filesystem(request)),
            ("code_content", self.check_code_content(request)),
            ("database", self.check_database(request)),
            ("required_metadata", self.check_required_metadata(request)),
            ("resource_ceilings", self.check_resource_ceilings(request)),
        ];

        for (name, outcome) in checks {
            if let Err(detail) = outcome {
                return LayerResult::fail(
                    PolicyLayer::Guardrails,
                    format!("check '{name}' failed: {detail}"),
                );
            }
        }
        LayerResult::pass(PolicyLayer::Guardrails, "all guardrail checks passed")
    }

    /// Count an applied file mutation toward the session ceiling.
    pub fn record_file_modified(&self) {
        let mut session = self.session.lock().expect("guardrail counters poisoned");
        session.files_modified += 1;
    }

    fn check_filesystem(&self, request: &ActionRequest) -> Result<(), String> {
        let path = &request.resource;
        if path.is_empty() {
            return Ok(());
        }
        // The deny list applies to every resource; the allow list only
        // constrains actions that write files, so non-file resources
        // (queues, tiers, notes) are not forced into file directories.
        for forbidden in &self.doc.filesystem.forbidden_directories {
            if path_is_under(path, forbidden) {
                return Err(format!("path '{path}' is under forbidden '{forbidden}'"));
            }
        }
        let writes_files = matches!(
            request.action_kind.as_str(),
            alder_types::action::well_known::APPLY_CODE_PATCH
                | alder_types::action::well_known::REVERT_CODE_PATCH
        );
        let allowed = &self.doc.filesystem.allowed_directories;
        if writes_files
            && !allowed.is_empty()
            && !allowed.iter().any(|dir| path_is_under(path, dir))
        {
            return Err(format!("path '{path}' is outside every allowed directory"));
        }
        Ok(())
    }

    fn check_code_content(&self, request: &ActionRequest) -> Result<(), String> {
        let Some(content) = request.payload.get("new_content").and_then(|v| v.as_str()) else {
            return Ok(());
        };

        if let Some(max) = self.doc.code_generation.max_lines_per_file {
            let lines = content.lines().count();
            if lines > max {
                return Err(format!("{lines} lines exceeds maximum {max}"));
            }
        }
        for import in &self.doc.code_generation.forbidden_imports {
            if content.contains(import.as_str()) {
                return Err(format!("forbidden import '{import}'"));
            }
        }
        for regex in &self.forbidden_patterns {
            if regex.is_match(content) {
                return Err(format!("forbidden pattern '{}' matched", regex.as_str()));
            }
        }
        Ok(())
    }

    fn check_database(&self, request: &ActionRequest) -> Result<(), String> {
        let Some(sql) = request.payload.get("sql").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let statement = sql
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        if self
            .doc
            .database
            .forbidden_statements
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&statement))
        {
            return Err(format!("statement kind '{statement}' is forbidden"));
        }
        if is_mutating_statement(&statement) {
            let lowered = sql.to_ascii_lowercase();
            for table in &self.doc.database.read_only_tables {
                if lowered.contains(&table.to_ascii_lowercase()) {
                    return Err(format!("table '{table}' is read-only"));
                }
            }
        }
        Ok(())
    }

    fn check_required_metadata(&self, request: &ActionRequest) -> Result<(), String> {
        for key in &self.doc.required_metadata {
            if request.payload.get(key).is_none() {
                return Err(format!("payload is missing required key '{key}'"));
            }
        }
        Ok(())
    }

    fn check_resource_ceilings(&self, request: &ActionRequest) -> Result<(), String> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| "session counter lock poisoned".to_string())?;

        if let Some(max) = self.doc.resource_limits.max_files_modified_per_session {
            if request.action_kind.as_str() == alder_types::action::well_known::APPLY_CODE_PATCH
                && session.files_modified >= max
            {
                return Err(format!("session file-modification ceiling {max} reached"));
            }
        }

        if let Some(max) = self.doc.resource_limits.max_actions_per_minute {
            let now = Utc::now();
            let cutoff = now - Duration::seconds(60);
            while session
                .action_times
                .front()
                .is_some_and(|t| *t < cutoff)
            {
                session.action_times.pop_front();
            }
            if session.action_times.len() as u64 >= max {
                return Err(format!("rate ceiling of {max} actions/minute reached"));
            }
            session.action_times.push_back(now);
        }
        Ok(())
    }
}

fn is_mutating_statement(statement: &str) -> bool {
    matches!(
        statement,
        "INSERT" | "UPDATE" | "DELETE" | "DROP" | "ALTER" | "TRUNCATE" | "CREATE" | "REPLACE"
    )
}

/// Prefix containment with component boundaries: `src/api` contains
/// `src/api/handlers.rs` but not `src/apiv2/x.rs`.
fn path_is_under(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return false;
    }
    path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::{ActionKind, ActorId, RiskTier};
    use serde_json::json;

    fn rails() -> GuardrailSet {
        let doc: GuardrailsDoc = serde_yaml::from_str(
            r#"
filesystem:
  allowed_directories: ["src", "services"]
  forbidden_directories: ["/etc", "secrets"]
code_generation:
  max_lines_per_file: 100
  forbidden_imports: ["import ctypes"]
  forbidden_patterns: ["eval\\s*\\(", "os\\.system"]
resource_limits:
  max_actions_per_minute: 1000
database:
  read_only_tables: ["audit_entries"]
  forbidden_statements: ["DROP", "TRUNCATE"]
required_metadata: []
"#,
        )
        .unwrap();
        GuardrailSet::compile(doc).unwrap()
    }

    fn patch_request(resource: &str, content: &str) -> ActionRequest {
        ActionRequest::new(
            ActorId::system(),
            ActionKind::new("apply_code_patch"),
            resource,
            RiskTier::Medium,
        )
        .with_payload(json!({ "new_content": content }))
    }

    #[test]
    fn forbidden_directories_veto() {
        let g = rails();
        let result = g.evaluate(&patch_request("/etc/shadow", "x = 1"));
        assert!(!result.passed);
        assert!(result.rationale.contains("filesystem"));
    }

    #[test]
    fn paths_outside_allowlist_veto() {
        let g = rails();
        assert!(!g.evaluate(&patch_request("build/out.py", "x = 1")).passed);
        assert!(g.evaluate(&patch_request("src/worker.py", "x = 1")).passed);
    }

    #[test]
    fn allowlist_only_binds_file_writing_actions() {
        let g = rails();
        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new("set_autonomy_tier"),
            "governance/autonomy",
            RiskTier::High,
        );
        assert!(g.evaluate(&request).passed);

        // The deny list still binds everything.
        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new("set_autonomy_tier"),
            "/etc/autonomy",
            RiskTier::High,
        );
        assert!(!g.evaluate(&request).passed);
    }

    #[test]
    fn prefix_containment_respects_component_boundaries() {
        assert!(path_is_under("src/api/handlers.rs", "src/api"));
        assert!(!path_is_under("src/apiv2/handlers.rs", "src/api"));
        assert!(path_is_under("src/api", "src/api"));
    }

    #[test]
    fn forbidden_patterns_and_imports_veto() {
        let g = rails();
        assert!(
            !g.evaluate(&patch_request("src/a.py", "eval(user_input)"))
                .passed
        );
        assert!(
            !g.evaluate(&patch_request("src/a.py", "import ctypes\n"))
                .passed
        );
    }

    #[test]
    fn oversized_files_veto() {
        let g = rails();
        let content = "x = 1\n".repeat(101);
        assert!(!g.evaluate(&patch_request("src/a.py", &content)).passed);
    }

    #[test]
    fn forbidden_sql_statements_veto() {
        let g = rails();
        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new("run_migration"),
            "src/migrations",
            RiskTier::High,
        )
        .with_payload(json!({ "sql": "DROP TABLE users" }));
        assert!(!g.evaluate(&request).passed);
    }

    #[test]
    fn writes_to_read_only_tables_veto() {
        let g = rails();
        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new("run_migration"),
            "src/migrations",
            RiskTier::High,
        )
        .with_payload(json!({ "sql": "DELETE FROM audit_entries WHERE 1=1" }));
        assert!(!g.evaluate(&request).passed);
    }

    #[test]
    fn invalid_regex_fails_compilation() {
        let doc = GuardrailsDoc {
            code_generation: CodeGenerationRules {
                forbidden_patterns: vec!["[unclosed".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(GuardrailSet::compile(doc).is_err());
    }

    #[test]
    fn session_file_ceiling_is_enforced() {
        let doc = GuardrailsDoc {
            resource_limits: ResourceLimits {
                max_files_modified_per_session: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let g = GuardrailSet::compile(doc).unwrap();
        let request = patch_request("src/a.py", "x = 1");
        assert!(g.evaluate(&request).passed);
        g.record_file_modified();
        assert!(!g.evaluate(&request).passed);
    }
}
