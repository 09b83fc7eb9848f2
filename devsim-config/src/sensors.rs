//! Sensor simulation parameters.
//!
//! Door timings are expressed in virtual milliseconds; numeric steps are applied once
//! per clock tick.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// One virtual year; longer open windows are treated as configuration mistakes.
pub const MAX_OPEN_MS: u64 = 31_536_000_000;

/// Parameters for every simulated sensor on the device.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    /// Door open/close behaviour.
    #[serde(default, alias = "doorOpen")]
    #[validate(nested)]
    pub door: DoorSensorConfig,

    /// Temperature drift (degrees per tick).
    #[serde(default = "NumericSensorConfig::temperature")]
    #[validate(nested)]
    pub temperature: NumericSensorConfig,

    /// Relative humidity drift (percent per tick).
    #[serde(default = "NumericSensorConfig::humidity")]
    #[validate(nested)]
    pub humidity: NumericSensorConfig,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            door: DoorSensorConfig::default(),
            temperature: NumericSensorConfig::temperature(),
            humidity: NumericSensorConfig::humidity(),
        }
    }
}

/// Door sensor: chance of opening per tick and how long it stays open.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_open_window))]
#[serde(default)]
pub struct DoorSensorConfig {
    /// Probability (0.0 to 1.0) that a closed door opens on a tick.
    #[validate(range(min = 0.0, max = 1.0))]
    pub chance: f64,

    /// Shortest time the door stays open (virtual ms).
    #[serde(alias = "minTime")]
    #[validate(range(max = MAX_OPEN_MS))]
    pub min_time: u64,

    /// Longest time the door stays open (virtual ms).
    #[serde(alias = "maxTime")]
    #[validate(range(max = MAX_OPEN_MS))]
    pub max_time: u64,
}

impl Default for DoorSensorConfig {
    fn default() -> Self {
        Self {
            chance: 0.05,
            min_time: 60_000,
            max_time: 300_000,
        }
    }
}

/// A value that climbs while the door is open and settles back when it closes.
///
/// Defaults differ per sensor, so a section given in a file must list every field.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_numeric_bounds))]
pub struct NumericSensorConfig {
    /// Resting value with the door closed.
    pub normal: f64,

    /// Step added per tick while the door is open.
    #[validate(range(exclusive_min = 0.0))]
    pub increase: f64,

    /// Step removed per tick while the door is closed and the value is above normal.
    #[validate(range(exclusive_min = 0.0))]
    pub decrease: f64,

    /// Ceiling for the value.
    pub max: f64,
}

impl NumericSensorConfig {
    pub fn temperature() -> Self {
        Self {
            normal: 4.0,
            increase: 0.5,
            decrease: 0.25,
            max: 12.0,
        }
    }

    pub fn humidity() -> Self {
        Self {
            normal: 60.0,
            increase: 1.0,
            decrease: 0.5,
            max: 95.0,
        }
    }
}

impl Default for NumericSensorConfig {
    fn default() -> Self {
        Self::temperature()
    }
}
