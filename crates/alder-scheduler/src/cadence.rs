//! The boot/steady cadence controller.

use alder_mesh::TriggerMesh;
use alder_types::{event_types, ComponentId, Event, Severity};
use rand::Rng;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::watch;

/// Scheduler operating phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CadencePhase {
    /// Short interval, elevated priority threshold, infrastructure-critical
    /// domains only. Active until `boot.complete`.
    Boot,
    /// Long jittered interval, lower threshold, all domains.
    Steady,
}

/// Cadence knobs with the deployment defaults.
#[derive(Clone, Debug)]
pub struct CadenceConfig {
    pub boot_interval: Duration,
    pub steady_interval_min: Duration,
    pub steady_interval_max: Duration,
    pub boot_priority_threshold: f64,
    pub steady_priority_threshold: f64,
    /// Event domains in scope during boot.
    pub boot_domains: Vec<String>,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            boot_interval: Duration::from_secs(15),
            steady_interval_min: Duration::from_secs(180),
            steady_interval_max: Duration::from_secs(300),
            boot_priority_threshold: 0.7,
            steady_priority_threshold: 0.3,
            boot_domains: vec![
                "startup".to_string(),
                "preflight".to_string(),
                "chain".to_string(),
                "backpressure".to_string(),
                "error".to_string(),
            ],
        }
    }
}

/// Owns the current phase and publishes the scan interval to followers
/// (the log healer tails it via a watch channel).
pub struct CadenceController {
    config: CadenceConfig,
    phase: RwLock<CadencePhase>,
    interval_tx: watch::Sender<Duration>,
    mesh: TriggerMesh,
}

impl CadenceController {
    pub fn new(config: CadenceConfig, mesh: TriggerMesh) -> (Self, watch::Receiver<Duration>) {
        let (interval_tx, interval_rx) = watch::channel(config.boot_interval);
        (
            Self {
                config,
                phase: RwLock::new(CadencePhase::Boot),
                interval_tx,
                mesh,
            },
            interval_rx,
        )
    }

    pub fn phase(&self) -> CadencePhase {
        *self.phase.read().expect("cadence lock poisoned")
    }

    /// The next cycle's interval: fixed in boot, jittered in steady.
    pub fn next_interval(&self) -> Duration {
        match self.phase() {
            CadencePhase::Boot => self.config.boot_interval,
            CadencePhase::Steady => {
                let min = self.config.steady_interval_min.as_secs();
                let max = self.config.steady_interval_max.as_secs();
                let secs = if max > min {
                    rand::thread_rng().gen_range(min..=max)
                } else {
                    min
                };
                Duration::from_secs(secs)
            }
        }
    }

    pub fn priority_threshold(&self) -> f64 {
        match self.phase() {
            CadencePhase::Boot => self.config.boot_priority_threshold,
            CadencePhase::Steady => self.config.steady_priority_threshold,
        }
    }

    /// Whether a cluster domain is triaged in the current phase.
    pub fn domain_in_scope(&self, domain: &str) -> bool {
        match self.phase() {
            CadencePhase::Boot => self.config.boot_domains.iter().any(|d| d == domain),
            CadencePhase::Steady => true,
        }
    }

    /// Transition to steady cadence; audited as `scheduler.phase_changed`.
    pub async fn complete_boot(&self) {
        {
            let mut phase = self.phase.write().expect("cadence lock poisoned");
            if *phase == CadencePhase::Steady {
                return;
            }
            *phase = CadencePhase::Steady;
        }
        let interval = self.next_interval();
        let _ = self.interval_tx.send(interval);
        tracing::info!(interval_secs = interval.as_secs(), "cadence moved to steady phase");

        let event = Event::new(
            event_types::SCHEDULER_PHASE_CHANGED,
            ComponentId::new("scheduler"),
        )
        .with_severity(Severity::Info)
        .with_payload(serde_json::json!({
            "from": "boot",
            "to": "steady",
            "interval_secs": interval.as_secs(),
        }));
        if let Err(err) = self.mesh.publish(event).await {
            tracing::error!(%err, "failed to audit cadence phase change");
        }
    }
}
