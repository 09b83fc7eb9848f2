//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate, ValidationError};

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default log filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    #[validate(custom(function = validate_log_level))]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}
