//! # Device Configuration
//!
//! Hierarchical configuration for the simulated telemetry device.
//!
//! ## Features
//! - **Unified Configuration**: one document covers clock, sensors, buffer and broker
//! - **Validation**: every parameter is checked at load time, never at simulation time
//! - **Layering**: defaults, then a YAML or JSON file, then `DEVSIM_*` environment variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod data;
mod device;
mod error;
mod mqtt;
mod sensors;
mod telemetry;
mod validation;

pub use data::DataConfig;
pub use device::{ClockConfig, DeviceInfo};
pub use error::ConfigError;
pub use mqtt::{Credentials, MqttConfig, PublishTopic, SubscribeTopic, TlsConfig};
pub use sensors::{DoorSensorConfig, NumericSensorConfig, SensorsConfig, MAX_OPEN_MS};
pub use telemetry::TelemetryConfig;

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "DEVSIM_";

/// Top‑level configuration container for the device.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    /// Identity stamped on every reading.
    #[serde(default)]
    #[validate(nested)]
    pub device: DeviceInfo,

    /// Virtual clock cadence.
    #[serde(default)]
    #[validate(nested)]
    pub clock: ClockConfig,

    /// Sensor simulation rules.
    #[serde(default)]
    #[validate(nested)]
    pub sensors: SensorsConfig,

    /// Buffer capacity and snapshot file.
    #[serde(default)]
    #[validate(nested)]
    pub data: DataConfig,

    /// Broker connection.
    #[serde(default)]
    #[validate(nested)]
    pub mqtt: MqttConfig,

    /// Logging.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl DeviceConfig {
    /// Load configuration from the default file and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values (filled in by serde for every key the layers leave out)
    /// 2. `config/device.yaml` - if missing, defaults are used.
    /// 3. `DEVSIM_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new();

        let default_file = Path::new("config/device.yaml");
        if default_file.exists() {
            figment = figment.merge(Yaml::file(default_file));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file on top of the defaults.
    ///
    /// `.json` files are read as JSON, anything else as YAML.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment = Figment::new();
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Client identifier used on the broker.
    pub fn client_id(&self) -> String {
        self.mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| format!("devsim-{}", self.device.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn full_config_validation() {
        let config = DeviceConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn loads_yaml_with_original_field_names() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "device.yaml",
                r#"
device:
  id: cold-room-7
clock:
  interval: 50
  multiplier: 120
sensors:
  doorOpen:
    chance: 0.2
    minTime: 1000
    maxTime: 4000
data:
  path: data/cold-room-7.json
  saveInterval: 2000
  maxMessages: 64
"#,
            )?;
            let config = DeviceConfig::load_from_path("device.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.device.id, "cold-room-7");
            assert_eq!(config.clock.virtual_step_ms(), 6_000);
            assert_eq!(config.sensors.door.max_time, 4_000);
            assert_eq!(config.data.max_messages, 64);
            assert_eq!(config.mqtt.port, 1883);
            Ok(())
        });
    }

    #[test]
    fn camel_case_keys_keep_remaining_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "device.yaml",
                "data:\n  maxMessages: 64\nsensors:\n  doorOpen:\n    chance: 1.0\n",
            )?;
            let config = DeviceConfig::load_from_path("device.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.data.max_messages, 64);
            assert_eq!(config.data.save_interval, 5_000);
            assert_eq!(config.sensors.door.chance, 1.0);
            assert_eq!(config.sensors.door.min_time, 60_000);
            assert_eq!(config.sensors.humidity.normal, 60.0);
            assert_eq!(config.mqtt.host, "localhost");
            Ok(())
        });
    }

    #[test]
    fn defaults_only_without_a_file() {
        Jail::expect_with(|_| {
            let config = DeviceConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.device.id, "device-1");
            assert_eq!(config.mqtt.publish.qos, 2);
            assert_eq!(config.sensors.temperature.normal, 4.0);
            Ok(())
        });
    }

    #[test]
    fn loads_json() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "device.json",
                r#"{ "device": { "id": "d2", "seed": 9 }, "mqtt": { "host": "broker", "port": 8883 } }"#,
            )?;
            let config = DeviceConfig::load_from_path("device.json").map_err(|e| e.to_string())?;
            assert_eq!(config.device.seed, Some(9));
            assert_eq!(config.mqtt.host, "broker");
            assert_eq!(config.client_id(), "devsim-d2");
            Ok(())
        });
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.create_file("device.yaml", "device:\n  id: env-test\n")?;
            jail.set_env("DEVSIM_DATA__MAX_MESSAGES", "8192");
            let config = DeviceConfig::load_from_path("device.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.data.max_messages, 8192);
            Ok(())
        });
    }

    #[test]
    fn invalid_open_window_is_fatal() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "device.yaml",
                "sensors:\n  door:\n    chance: 0.5\n    min_time: 5000\n    max_time: 10\n",
            )?;
            match DeviceConfig::load_from_path("device.yaml") {
                Err(ConfigError::Validation(errors)) => {
                    let rendered = ConfigError::Validation(errors).to_string();
                    assert!(rendered.contains("sensors.door"), "{rendered}");
                }
                other => panic!("expected validation error, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_reported() {
        let result = DeviceConfig::load_from_path("does/not/exist.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
