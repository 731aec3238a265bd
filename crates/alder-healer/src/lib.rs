//! Alder log healer.
//!
//! Periodically scans new log output (the scan interval follows the
//! scheduler's adaptive cadence), extracts normalized error records,
//! classifies them against the learning store's signature vocabulary, and
//! publishes `error.detected` events. A dedup window suppresses identical
//! `(class, file, line)` records for a configurable quiet period.

#![deny(unsafe_code)]

mod parser;

pub use parser::{ErrorRecord, LogParser};

use alder_mesh::TriggerMesh;
use alder_types::{
    event_types, ComponentId, CoreError, CorrelationId, ErrorClassification, ErrorSignature,
    Event, Severity,
};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;

/// Map a recovered record onto the classification tag set.
pub fn classify(record: &ErrorRecord) -> ErrorClassification {
    let message = record.message.to_ascii_lowercase();
    match record.error_class.as_str() {
        "TypeError" if message.contains("await") => ErrorClassification::IncorrectAwait,
        "AttributeError" => ErrorClassification::MissingAttribute,
        "ModuleNotFoundError" | "ImportError" => ErrorClassification::ImportError,
        "NameError" if message.contains("not defined") => ErrorClassification::ImportError,
        "TimeoutError" => ErrorClassification::Timeout,
        _ if message.contains("not json serializable") => ErrorClassification::Serialization,
        _ if message.contains("timed out") => ErrorClassification::Timeout,
        _ => ErrorClassification::Unknown,
    }
}

/// Healer knobs.
#[derive(Clone, Debug)]
pub struct HealerConfig {
    pub log_path: PathBuf,
    /// Suppress identical (class, file, line) records for this long.
    pub quiet_period: Duration,
}

impl HealerConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            quiet_period: Duration::from_secs(60),
        }
    }
}

/// Tails the configured log and turns new errors into mesh events. The
/// learning store picks the events up from its mesh subscription; the
/// healer itself only detects, classifies, and publishes.
pub struct LogHealer {
    mesh: TriggerMesh,
    config: HealerConfig,
    parser: LogParser,
    offset: Mutex<u64>,
    dedup: Mutex<HashMap<(String, String, u32), Instant>>,
}

impl LogHealer {
    pub fn new(mesh: TriggerMesh, config: HealerConfig) -> Arc<Self> {
        Arc::new(Self {
            mesh,
            config,
            parser: LogParser::new(),
            offset: Mutex::new(0),
            dedup: Mutex::new(HashMap::new()),
        })
    }

    /// Scan any log output appended since the last pass. Returns how many
    /// `error.detected` events were published.
    pub async fn scan_once(&self) -> Result<usize, CoreError> {
        let start_offset = *self.offset.lock().expect("healer offset poisoned");
        let Ok(mut file) = tokio::fs::File::open(&self.config.log_path).await else {
            return Ok(0); // log not created yet
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?
            .len();
        if len <= start_offset {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(start_offset))
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        let mut text = String::new();
        file.read_to_string(&mut text)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;

        // Leave a trailing partial line for the next pass.
        let consumed = match text.rfind('\n') {
            Some(last_newline) => {
                text.truncate(last_newline + 1);
                last_newline as u64 + 1
            }
            None => return Ok(0),
        };
        *self.offset.lock().expect("healer offset poisoned") = start_offset + consumed;

        let mut emitted = 0;
        for record in self.parser.parse(&text) {
            if self.suppressed(&record) {
                continue;
            }
            self.emit(&record, start_offset).await?;
            emitted += 1;
        }
        Ok(emitted)
    }

    fn suppressed(&self, record: &ErrorRecord) -> bool {
        let key = (
            record.error_class.clone(),
            record.file.clone(),
            record.line,
        );
        let mut dedup = self.dedup.lock().expect("healer dedup poisoned");
        let now = Instant::now();
        dedup.retain(|_, seen| now.duration_since(*seen) < self.config.quiet_period);
        if dedup.contains_key(&key) {
            tracing::debug!(class = %record.error_class, file = %record.file, line = record.line, "duplicate error suppressed");
            return true;
        }
        dedup.insert(key, now);
        false
    }

    async fn emit(&self, record: &ErrorRecord, scan_offset: u64) -> Result<(), CoreError> {
        let signature = ErrorSignature {
            classification: classify(record),
            error_class: record.error_class.clone(),
            file: record.file.clone(),
            line: record.line,
        };

        // Correlate back to where in the raw stream the record came from.
        let correlation = CorrelationId::new(format!(
            "logscan:{}:{}",
            self.config.log_path.display(),
            scan_offset
        ));
        let event = Event::new(event_types::ERROR_DETECTED, ComponentId::new("healer"))
            .with_resource(record.file.clone())
            .with_severity(Severity::High)
            .with_correlation(correlation)
            .with_payload(serde_json::json!({
                "signature": signature,
                "message": record.message,
                "stack": record.stack,
            }));
        self.mesh
            .publish(event)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }

    /// Run forever, rescanning at the cadence the scheduler publishes.
    pub async fn run(self: Arc<Self>, mut cadence: watch::Receiver<Duration>) {
        loop {
            let interval = *cadence.borrow();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = cadence.changed() => {
                    if changed.is_err() {
                        tracing::info!("cadence channel closed; healer stopping");
                        return;
                    }
                    continue; // pick up the new interval immediately
                }
            }
            match self.scan_once().await {
                Ok(0) => {}
                Ok(found) => tracing::info!(found, "log scan raised errors"),
                Err(err) => tracing::error!(%err, "log scan failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditLog;

    async fn fixture(quiet: Duration) -> (Arc<LogHealer>, TriggerMesh, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        let mesh = TriggerMesh::new(audit);
        let mut config = HealerConfig::new(dir.path().join("app.log"));
        config.quiet_period = quiet;
        let healer = LogHealer::new(mesh.clone(), config);
        (healer, mesh, dir)
    }

    #[tokio::test]
    async fn new_errors_become_events() {
        let (healer, mesh, dir) = fixture(Duration::from_secs(60)).await;
        std::fs::write(
            dir.path().join("app.log"),
            "TimeoutError: request timed out (src/client.py:88)\n",
        )
        .unwrap();

        assert_eq!(healer.scan_once().await.unwrap(), 1);

        let entries = mesh.audit().read_recent(5).await.unwrap();
        let event = &entries
            .iter()
            .find(|e| e.event.event_type.as_str() == event_types::ERROR_DETECTED)
            .unwrap()
            .event;
        assert_eq!(event.resource.as_deref(), Some("src/client.py"));
        assert_eq!(event.payload["signature"]["classification"], "timeout");
    }

    #[tokio::test]
    async fn identical_errors_are_suppressed_within_the_window() {
        let (healer, _mesh, dir) = fixture(Duration::from_secs(60)).await;
        let line = "TimeoutError: request timed out (src/client.py:88)\n";
        std::fs::write(dir.path().join("app.log"), line).unwrap();
        assert_eq!(healer.scan_once().await.unwrap(), 1);

        let mut existing = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        existing.push_str(line);
        std::fs::write(dir.path().join("app.log"), existing).unwrap();
        assert_eq!(healer.scan_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn suppression_lapses_after_the_quiet_period() {
        let (healer, _mesh, dir) = fixture(Duration::from_millis(10)).await;
        let line = "TimeoutError: request timed out (src/client.py:88)\n";
        std::fs::write(dir.path().join("app.log"), line).unwrap();
        assert_eq!(healer.scan_once().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut existing = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        existing.push_str(line);
        std::fs::write(dir.path().join("app.log"), existing).unwrap();
        assert_eq!(healer.scan_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn only_new_output_is_scanned() {
        let (healer, _mesh, dir) = fixture(Duration::from_millis(1)).await;
        std::fs::write(
            dir.path().join("app.log"),
            "ValueError: bad input (src/b.py:7)\n",
        )
        .unwrap();
        assert_eq!(healer.scan_once().await.unwrap(), 1);
        assert_eq!(healer.scan_once().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut existing = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        existing.push_str("AttributeError: 'W' object has no attribute 'x' (src/c.py:9)\n");
        std::fs::write(dir.path().join("app.log"), existing).unwrap();
        assert_eq!(healer.scan_once().await.unwrap(), 1);
    }

    #[test]
    fn classification_table() {
        let record = |class: &str, message: &str| ErrorRecord {
            error_class: class.to_string(),
            file: "f.py".to_string(),
            line: 1,
            message: message.to_string(),
            stack: vec![],
        };
        assert_eq!(
            classify(&record("TypeError", "can't be used in 'await' expression")),
            ErrorClassification::IncorrectAwait
        );
        assert_eq!(
            classify(&record("AttributeError", "no attribute 'x'")),
            ErrorClassification::MissingAttribute
        );
        assert_eq!(
            classify(&record("ModuleNotFoundError", "No module named 'x'")),
            ErrorClassification::ImportError
        );
        assert_eq!(
            classify(&record("TypeError", "Object of type datetime is not JSON serializable")),
            ErrorClassification::Serialization
        );
        assert_eq!(
            classify(&record("TimeoutError", "deadline exceeded")),
            ErrorClassification::Timeout
        );
        assert_eq!(
            classify(&record("ValueError", "bad input")),
            ErrorClassification::Unknown
        );
    }
}
