//! The process-wide autonomy tier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much the platform may do without a human. The tier is owned by the
/// governance engine; changing it is itself a governed action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyTier {
    Manual,
    Supervised,
    SemiAutonomous,
    Autonomous,
}

impl AutonomyTier {
    pub fn as_u8(&self) -> u8 {
        match self {
            AutonomyTier::Manual => 0,
            AutonomyTier::Supervised => 1,
            AutonomyTier::SemiAutonomous => 2,
            AutonomyTier::Autonomous => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AutonomyTier::Manual),
            1 => Some(AutonomyTier::Supervised),
            2 => Some(AutonomyTier::SemiAutonomous),
            3 => Some(AutonomyTier::Autonomous),
            _ => None,
        }
    }

    /// Whether any action kind may be applied without a human at this tier.
    pub fn allows_auto_apply(&self) -> bool {
        *self >= AutonomyTier::SemiAutonomous
    }

    /// Default confidence threshold for auto-apply. Higher tiers accept
    /// lower confidence; policy documents may override per deployment.
    pub fn default_confidence_threshold(&self) -> f64 {
        match self {
            AutonomyTier::Manual => 0.95,
            AutonomyTier::Supervised => 0.90,
            AutonomyTier::SemiAutonomous => 0.75,
            AutonomyTier::Autonomous => 0.60,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyTier::Manual => "manual",
            AutonomyTier::Supervised => "supervised",
            AutonomyTier::SemiAutonomous => "semi_autonomous",
            AutonomyTier::Autonomous => "autonomous",
        }
    }
}

impl Default for AutonomyTier {
    fn default() -> Self {
        AutonomyTier::Supervised
    }
}

impl fmt::Display for AutonomyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_round_trip_through_u8() {
        for n in 0..4u8 {
            assert_eq!(AutonomyTier::from_u8(n).unwrap().as_u8(), n);
        }
        assert!(AutonomyTier::from_u8(4).is_none());
    }

    #[test]
    fn only_upper_tiers_auto_apply() {
        assert!(!AutonomyTier::Manual.allows_auto_apply());
        assert!(!AutonomyTier::Supervised.allows_auto_apply());
        assert!(AutonomyTier::SemiAutonomous.allows_auto_apply());
        assert!(AutonomyTier::Autonomous.allows_auto_apply());
    }

    #[test]
    fn thresholds_fall_as_tiers_rise() {
        let mut last = 1.0;
        for n in 0..4u8 {
            let t = AutonomyTier::from_u8(n).unwrap().default_confidence_threshold();
            assert!(t < last);
            last = t;
        }
    }
}
