//! Clustering of recent audit events for the triage pass.

use alder_audit::AuditEntry;
use alder_types::Severity;
use std::collections::HashMap;

/// A group of recent events sharing (domain, severity, class).
#[derive(Clone, Debug, PartialEq)]
pub struct EventCluster {
    pub domain: String,
    pub severity: Severity,
    pub class: String,
    pub count: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
    pub urgency: f64,
    pub recurrence: f64,
}

impl EventCluster {
    /// Stable identity for dedup against already-launched missions.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.domain, self.severity.as_str(), self.class)
    }

    /// `risk = domain multiplier × severity weight`.
    pub fn risk_score(&self) -> f64 {
        (domain_multiplier(&self.domain) * severity_weight(self.severity)).clamp(0.0, 1.0)
    }

    /// `impact = normalized count × urgency × recurrence`.
    pub fn impact_score(&self) -> f64 {
        let count_norm = (self.count as f64 / 20.0).min(1.0);
        (count_norm * self.urgency * self.recurrence).clamp(0.0, 1.0)
    }

    /// `combined = 0.4·risk + 0.6·impact`.
    pub fn combined_score(&self) -> f64 {
        0.4 * self.risk_score() + 0.6 * self.impact_score()
    }
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 1.0,
        Severity::High => 0.8,
        Severity::Medium => 0.5,
        Severity::Low => 0.3,
        Severity::Info => 0.1,
    }
}

fn domain_multiplier(domain: &str) -> f64 {
    match domain {
        "chain" | "startup" => 1.0,
        "error" | "sandbox" => 0.9,
        "approval" | "fix" => 0.7,
        "backpressure" | "preflight" => 0.6,
        "mission" | "scheduler" => 0.5,
        _ => 0.4,
    }
}

/// Cluster entries by (domain, severity, class). The class is the error
/// classification when the payload carries a signature, otherwise the
/// event type itself.
pub fn cluster_events(entries: &[AuditEntry]) -> Vec<EventCluster> {
    let mut clusters: HashMap<(String, Severity, String), EventCluster> = HashMap::new();

    for entry in entries {
        let event = &entry.event;
        let domain = event.event_type.domain().to_string();
        let class = event.payload["signature"]["classification"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| event.event_type.as_str().to_string());

        let key = (domain.clone(), event.severity, class.clone());
        let cluster = clusters.entry(key).or_insert_with(|| EventCluster {
            domain,
            severity: event.severity,
            class,
            count: 0,
            first_sequence: entry.sequence,
            last_sequence: entry.sequence,
            urgency: severity_weight(event.severity),
            recurrence: 0.0,
        });
        cluster.count += 1;
        cluster.last_sequence = entry.sequence;
    }

    let mut out: Vec<EventCluster> = clusters
        .into_values()
        .map(|mut c| {
            c.recurrence = (c.count as f64 / 10.0).min(1.0);
            c
        })
        .collect();
    out.sort_by(|a, b| {
        b.combined_score()
            .partial_cmp(&a.combined_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditEntry as Entry;
    use alder_types::{ComponentId, Event};

    fn entry(sequence: u64, event_type: &str, severity: Severity, class: Option<&str>) -> Entry {
        let mut event = Event::new(event_type, ComponentId::new("tests")).with_severity(severity);
        if let Some(class) = class {
            event = event.with_payload(serde_json::json!({
                "signature": { "classification": class }
            }));
        }
        Entry {
            sequence,
            previous_hash: String::new(),
            self_hash: String::new(),
            signature: None,
            event,
        }
    }

    #[test]
    fn events_group_by_domain_severity_class() {
        let entries = vec![
            entry(0, "error.detected", Severity::High, Some("timeout")),
            entry(1, "error.detected", Severity::High, Some("timeout")),
            entry(2, "error.detected", Severity::High, Some("import_error")),
            entry(3, "mission.started", Severity::Info, None),
        ];
        let clusters = cluster_events(&entries);
        assert_eq!(clusters.len(), 3);

        let timeout = clusters
            .iter()
            .find(|c| c.class == "timeout")
            .expect("timeout cluster");
        assert_eq!(timeout.count, 2);
        assert_eq!(timeout.first_sequence, 0);
        assert_eq!(timeout.last_sequence, 1);
    }

    #[test]
    fn repeated_critical_errors_outrank_noise() {
        let mut entries = Vec::new();
        for n in 0..12 {
            entries.push(entry(n, "error.detected", Severity::Critical, Some("timeout")));
        }
        entries.push(entry(12, "mission.started", Severity::Info, None));

        let clusters = cluster_events(&entries);
        assert_eq!(clusters[0].class, "timeout");
        assert!(clusters[0].combined_score() > clusters[1].combined_score());
        assert!(clusters[0].combined_score() > 0.6);
    }

    #[test]
    fn combined_is_weighted_40_60() {
        let cluster = EventCluster {
            domain: "error".to_string(),
            severity: Severity::Critical,
            class: "timeout".to_string(),
            count: 20,
            first_sequence: 0,
            last_sequence: 19,
            urgency: 1.0,
            recurrence: 1.0,
        };
        let expected = 0.4 * cluster.risk_score() + 0.6 * cluster.impact_score();
        assert!((cluster.combined_score() - expected).abs() < 1e-12);
    }
}
