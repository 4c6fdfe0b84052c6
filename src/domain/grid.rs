use serde::{Deserialize, Serialize};

/// Instantaneous active power at the grid connection point.
///
/// Sign convention follows the meter: negative values mean power is flowing
/// into the grid (surplus export), positive values mean net consumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub active_power_w: f64,
}

impl Reading {
    pub fn new(active_power_w: f64) -> Self {
        Self { active_power_w }
    }

    /// True when the reading is strictly below the injection threshold.
    pub fn is_injecting(&self, threshold_w: f64) -> bool {
        self.active_power_w < threshold_w
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} W", self.active_power_w)
    }
}
