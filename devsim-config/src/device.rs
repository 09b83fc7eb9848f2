//! Device identity and virtual clock parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Identity of the simulated device.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct DeviceInfo {
    /// Identifier stamped on every reading (`deviceId` on the wire).
    #[validate(length(min = 1, max = 128))]
    pub id: String,

    /// Seed for the simulator's RNG. A random seed is drawn when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            id: "device-1".into(),
            seed: None,
        }
    }
}

/// Virtual clock cadence.
///
/// Every `interval` real milliseconds the virtual clock moves forward by
/// `interval * multiplier` milliseconds. With 100 ms and 60 one real tenth of a
/// second is six virtual seconds.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct ClockConfig {
    /// Real milliseconds between ticks.
    #[validate(range(min = 1, max = 3_600_000))]
    pub interval: u64,

    /// Virtual milliseconds per real millisecond.
    #[validate(range(min = 1, max = 1_000_000))]
    pub multiplier: u64,
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    /// Virtual milliseconds added per tick.
    pub fn virtual_step_ms(&self) -> u64 {
        self.interval.saturating_mul(self.multiplier)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            interval: 100,
            multiplier: 60,
        }
    }
}
