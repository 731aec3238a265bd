//! Alder preflight validator.
//!
//! Runs once before startup (and on demand) over a configured set of code
//! artifacts: parsability in the declared language, import resolvability
//! against a manifest of known modules, the same forbidden patterns the
//! guardrails enforce at runtime, and hardcoded-secret markers.
//!
//! Non-critical findings are warnings appended to the audit stream; a
//! failed check on a `critical` artifact aborts startup.

#![deny(unsafe_code)]

use alder_governance::PolicyStore;
use alder_mesh::TriggerMesh;
use alder_types::{event_types, ComponentId, CoreError, Event, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Languages preflight can check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactLanguage {
    Python,
    Rust,
    Json,
    Yaml,
    Shell,
}

/// One artifact to validate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub path: String,
    pub language: ArtifactLanguage,
    #[serde(default)]
    pub critical: bool,
}

/// One check's verdict on one artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub passed: bool,
    pub detail: String,
}

/// All verdicts for one artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub path: String,
    pub critical: bool,
    pub checks: Vec<CheckResult>,
}

impl ArtifactReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// The full preflight run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreflightReport {
    pub artifacts: Vec<ArtifactReport>,
}

impl PreflightReport {
    pub fn critical_failures(&self) -> Vec<&ArtifactReport> {
        self.artifacts
            .iter()
            .filter(|a| a.critical && !a.passed())
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ArtifactReport> {
        self.artifacts
            .iter()
            .filter(|a| !a.critical && !a.passed())
            .collect()
    }
}

/// Preflight configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreflightConfig {
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
    /// Module names imports may resolve against. Empty disables the check.
    #[serde(default)]
    pub known_modules: Vec<String>,
}

/// The validator. Reuses the guardrails' forbidden patterns so preflight
/// and runtime enforcement cannot drift apart.
pub struct PreflightValidator {
    config: PreflightConfig,
    root_dir: PathBuf,
    mesh: TriggerMesh,
    policies: PolicyStore,
    secret_markers: Vec<Regex>,
}

impl PreflightValidator {
    pub fn new(
        config: PreflightConfig,
        root_dir: impl AsRef<Path>,
        mesh: TriggerMesh,
        policies: PolicyStore,
    ) -> Self {
        let secret_markers = [
            r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][^"']{8,}["']"#,
            r"AKIA[0-9A-Z]{16}",
            r"-----BEGIN (RSA |EC )?PRIVATE KEY-----",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("secret marker regexes are static"))
        .collect();
        Self {
            config,
            root_dir: root_dir.as_ref().to_path_buf(),
            mesh,
            policies,
            secret_markers,
        }
    }

    /// Validate every configured artifact, audit warnings, and fail on a
    /// critical artifact's failure.
    pub async fn run(&self) -> Result<PreflightReport, CoreError> {
        let mut artifacts = Vec::with_capacity(self.config.artifacts.len());
        for spec in &self.config.artifacts {
            let report = self.check_artifact(spec).await;
            if !report.passed() {
                self.audit_findings(&report).await?;
            }
            artifacts.push(report);
        }

        let report = PreflightReport { artifacts };
        if let Some(failed) = report.critical_failures().first() {
            let detail = failed
                .failures()
                .map(|c| format!("{}: {}", c.check, c.detail))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CoreError::PreflightFailure {
                artifact: failed.path.clone(),
                detail,
            });
        }
        Ok(report)
    }

    async fn check_artifact(&self, spec: &ArtifactSpec) -> ArtifactReport {
        let mut checks = Vec::new();
        let content = match tokio::fs::read_to_string(self.root_dir.join(&spec.path)).await {
            Ok(content) => content,
            Err(err) => {
                checks.push(CheckResult {
                    check: "readable".to_string(),
                    passed: false,
                    detail: err.to_string(),
                });
                return ArtifactReport {
                    path: spec.path.clone(),
                    critical: spec.critical,
                    checks,
                };
            }
        };

        checks.push(self.check_parsability(spec.language, &content));
        if spec.language == ArtifactLanguage::Python {
            checks.push(self.check_imports(&content));
            checks.push(check_await_usage(&content));
        }
        checks.push(self.check_forbidden_patterns(&content));
        checks.push(self.check_secrets(&content));

        ArtifactReport {
            path: spec.path.clone(),
            critical: spec.critical,
            checks,
        }
    }

    fn check_parsability(&self, language: ArtifactLanguage, content: &str) -> CheckResult {
        let outcome: Result<(), String> = match language {
            ArtifactLanguage::Json => serde_json::from_str::<serde_json::Value>(content)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            ArtifactLanguage::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            ArtifactLanguage::Python | ArtifactLanguage::Rust => {
                check_balanced_delimiters(content)
            }
            ArtifactLanguage::Shell => {
                if content.trim().is_empty() {
                    Err("empty script".to_string())
                } else {
                    Ok(())
                }
            }
        };
        match outcome {
            Ok(()) => CheckResult {
                check: "parsability".to_string(),
                passed: true,
                detail: "parsed".to_string(),
            },
            Err(detail) => CheckResult {
                check: "parsability".to_string(),
                passed: false,
                detail,
            },
        }
    }

    fn check_imports(&self, content: &str) -> CheckResult {
        if self.config.known_modules.is_empty() {
            return CheckResult {
                check: "imports".to_string(),
                passed: true,
                detail: "no module manifest configured".to_string(),
            };
        }
        for line in content.lines() {
            let trimmed = line.trim();
            let module = if let Some(rest) = trimmed.strip_prefix("import ") {
                Some(rest.split([' ', '.', ',']).next().unwrap_or(""))
            } else if let Some(rest) = trimmed.strip_prefix("from ") {
                Some(rest.split([' ', '.']).next().unwrap_or(""))
            } else {
                None
            };
            if let Some(module) = module {
                if !module.is_empty()
                    && !self.config.known_modules.iter().any(|m| m == module)
                {
                    return CheckResult {
                        check: "imports".to_string(),
                        passed: false,
                        detail: format!("module '{module}' is not in the manifest"),
                    };
                }
            }
        }
        CheckResult {
            check: "imports".to_string(),
            passed: true,
            detail: "all imports resolve".to_string(),
        }
    }

    fn check_forbidden_patterns(&self, content: &str) -> CheckResult {
        let Some(bundle) = self.policies.bundle() else {
            return CheckResult {
                check: "forbidden_patterns".to_string(),
                passed: true,
                detail: "no guardrails loaded".to_string(),
            };
        };
        for regex in bundle.guardrails.forbidden_patterns() {
            if regex.is_match(content) {
                return CheckResult {
                    check: "forbidden_patterns".to_string(),
                    passed: false,
                    detail: format!("pattern '{}' matched", regex.as_str()),
                };
            }
        }
        CheckResult {
            check: "forbidden_patterns".to_string(),
            passed: true,
            detail: "clean".to_string(),
        }
    }

    fn check_secrets(&self, content: &str) -> CheckResult {
        for regex in &self.secret_markers {
            if regex.is_match(content) {
                return CheckResult {
                    check: "secrets".to_string(),
                    passed: false,
                    detail: "hardcoded secret marker found".to_string(),
                };
            }
        }
        CheckResult {
            check: "secrets".to_string(),
            passed: true,
            detail: "clean".to_string(),
        }
    }

    async fn audit_findings(&self, report: &ArtifactReport) -> Result<(), CoreError> {
        let findings: Vec<_> = report
            .failures()
            .map(|c| serde_json::json!({ "check": c.check, "detail": c.detail }))
            .collect();
        let event = Event::new(
            event_types::PREFLIGHT_WARNING,
            ComponentId::new("preflight"),
        )
        .with_resource(report.path.clone())
        .with_severity(if report.critical {
            Severity::High
        } else {
            Severity::Medium
        })
        .with_payload(serde_json::json!({ "findings": findings }));
        self.mesh
            .publish(event)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }
}

/// Cheap structural parse: delimiters must balance.
fn check_balanced_delimiters(content: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    let mut in_string: Option<char> = None;
    let mut previous = '\0';
    for c in content.chars() {
        if let Some(quote) = in_string {
            if c == quote && previous != '\\' {
                in_string = None;
            }
        } else {
            match c {
                '"' | '\'' => in_string = Some(c),
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Err(format!("unbalanced '{c}'"));
                    }
                }
                _ => {}
            }
        }
        previous = c;
    }
    if let Some(open) = stack.pop() {
        return Err(format!("unclosed '{open}'"));
    }
    Ok(())
}

/// Flag `await` in a file with no `async def`: the call site cannot be a
/// coroutine context, so the await will fail at runtime.
fn check_await_usage(content: &str) -> CheckResult {
    let uses_await = content
        .lines()
        .any(|l| l.trim_start().contains("await ") && !l.trim_start().starts_with('#'));
    if uses_await && !content.contains("async def") {
        return CheckResult {
            check: "await_usage".to_string(),
            passed: false,
            detail: "'await' used outside any async function".to_string(),
        };
    }
    CheckResult {
        check: "await_usage".to_string(),
        passed: true,
        detail: "clean".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditLog;

    async fn validator(
        config: PreflightConfig,
        dir: &tempfile::TempDir,
    ) -> (PreflightValidator, TriggerMesh) {
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);
        let (policies, _) = PolicyStore::open(dir.path().join("no-policies"));
        (
            PreflightValidator::new(config, dir.path(), mesh.clone(), policies),
            mesh,
        )
    }

    fn spec(path: &str, critical: bool) -> ArtifactSpec {
        ArtifactSpec {
            path: path.to_string(),
            language: ArtifactLanguage::Python,
            critical,
        }
    }

    #[tokio::test]
    async fn clean_artifacts_pass() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.py"), "import os\n\nx = os.getpid()\n").unwrap();
        let (validator, _mesh) = validator(
            PreflightConfig {
                artifacts: vec![spec("ok.py", true)],
                known_modules: vec!["os".to_string()],
            },
            &dir,
        )
        .await;

        let report = validator.run().await.unwrap();
        assert!(report.artifacts[0].passed());
    }

    #[tokio::test]
    async fn await_outside_async_def_warns_and_audits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.py"), "result = await fetch()\n").unwrap();
        let (validator, mesh) = validator(
            PreflightConfig {
                artifacts: vec![spec("bad.py", false)],
                known_modules: vec![],
            },
            &dir,
        )
        .await;

        let report = validator.run().await.unwrap();
        assert!(!report.artifacts[0].passed());
        assert_eq!(report.warnings().len(), 1);

        let entries = mesh.audit().read_recent(5).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event.event_type.as_str() == event_types::PREFLIGHT_WARNING));
    }

    #[tokio::test]
    async fn critical_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        // The "(" never closes; on a critical artifact that kills startup.
        std::fs::write(dir.path().join("broken.py"), "def f(:\n    pass\n").unwrap();
        let (validator, _mesh) = validator(
            PreflightConfig {
                artifacts: vec![spec("broken.py", true)],
                known_modules: vec![],
            },
            &dir,
        )
        .await;

        let result = validator.run().await;
        assert!(matches!(result, Err(CoreError::PreflightFailure { .. })));
    }

    #[tokio::test]
    async fn unknown_imports_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("imp.py"), "import leftpad\n").unwrap();
        let (validator, _mesh) = validator(
            PreflightConfig {
                artifacts: vec![spec("imp.py", false)],
                known_modules: vec!["os".to_string(), "json".to_string()],
            },
            &dir,
        )
        .await;

        let report = validator.run().await.unwrap();
        let failures: Vec<_> = report.artifacts[0].failures().collect();
        assert!(failures.iter().any(|c| c.check == "imports"));
    }

    #[tokio::test]
    async fn secret_markers_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cfg.py"),
            "api_key = \"sk-abcdef1234567890\"\n",
        )
        .unwrap();
        let (validator, _mesh) = validator(
            PreflightConfig {
                artifacts: vec![spec("cfg.py", false)],
                known_modules: vec![],
            },
            &dir,
        )
        .await;

        let report = validator.run().await.unwrap();
        let failures: Vec<_> = report.artifacts[0].failures().collect();
        assert!(failures.iter().any(|c| c.check == "secrets"));
    }
}
