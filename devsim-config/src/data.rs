//! Telemetry buffer and snapshot parameters.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Buffer capacity and where / how often it is persisted.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Snapshot file.
    pub path: PathBuf,

    /// Milliseconds between autosaves.
    #[serde(alias = "saveInterval")]
    #[validate(range(min = 10))]
    pub save_interval: u64,

    /// Buffer capacity; the oldest reading is evicted beyond it.
    #[serde(alias = "maxMessages")]
    #[validate(range(min = 1, max = 10_000_000))]
    pub max_messages: usize,
}

impl DataConfig {
    pub fn save_every(&self) -> Duration {
        Duration::from_millis(self.save_interval)
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/device.json"),
            save_interval: 5_000,
            max_messages: 1_000,
        }
    }
}
