// devsim-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Cross-field rules that `validator`'s attribute ranges cannot express.

use std::borrow::Cow;

use validator::ValidationError;

use crate::mqtt::{MqttConfig, TlsConfig};
use crate::sensors::{DoorSensorConfig, NumericSensorConfig};

/// Reject an empty open window where the close draw could never be made.
pub fn validate_open_window(door: &DoorSensorConfig) -> Result<(), ValidationError> {
    if door.max_time < door.min_time {
        let mut error = ValidationError::new("invalid_open_window");
        error.message = Some(Cow::Owned(format!(
            "maxTime ({}) must not be lower than minTime ({})",
            door.max_time, door.min_time
        )));
        return Err(error);
    }
    Ok(())
}

/// The ceiling a value climbs to must sit at or above its resting value.
pub fn validate_numeric_bounds(sensor: &NumericSensorConfig) -> Result<(), ValidationError> {
    if !(sensor.normal.is_finite() && sensor.max.is_finite()) {
        return Err(ValidationError::new("non_finite_bounds"));
    }
    if sensor.max < sensor.normal {
        let mut error = ValidationError::new("max_below_normal");
        error.message = Some(Cow::Owned(format!(
            "max ({}) must not be lower than normal ({})",
            sensor.max, sensor.normal
        )));
        return Err(error);
    }
    Ok(())
}

/// Validate an MQTT topic name used for publishing: no wildcards, not empty.
pub fn validate_publish_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() || topic.contains('+') || topic.contains('#') || topic.contains('\0') {
        return Err(ValidationError::new("invalid_publish_topic"));
    }
    Ok(())
}

/// Validate an MQTT topic filter used for subscribing.
pub fn validate_topic_filter(filter: &str) -> Result<(), ValidationError> {
    if filter.is_empty() || filter.contains('\0') {
        return Err(ValidationError::new("invalid_topic_filter"));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != levels.len() - 1) {
            return Err(ValidationError::new("invalid_topic_filter"));
        }
        if level.contains('+') && *level != "+" {
            return Err(ValidationError::new("invalid_topic_filter"));
        }
    }
    Ok(())
}

/// Validate a QoS level.
pub fn validate_qos(qos: u8) -> Result<(), ValidationError> {
    if qos <= 2 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_qos"))
    }
}

/// Client certificate and key must be given together.
pub fn validate_tls(tls: &TlsConfig) -> Result<(), ValidationError> {
    if tls.cert.is_some() != tls.key.is_some() {
        return Err(ValidationError::new("incomplete_client_certificate"));
    }
    if tls.enabled && tls.ca.as_os_str().is_empty() {
        return Err(ValidationError::new("missing_ca_certificate"));
    }
    Ok(())
}

/// A control subscription needs a topic.
pub fn validate_subscription(mqtt: &MqttConfig) -> Result<(), ValidationError> {
    if mqtt.subscribe.enabled {
        validate_topic_filter(&mqtt.subscribe.topic)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_filters() {
        assert!(validate_topic_filter("devices/+/commands").is_ok());
        assert!(validate_topic_filter("devices/#").is_ok());
        assert!(validate_topic_filter("devices/#/x").is_err());
        assert!(validate_topic_filter("devices/a+").is_err());
        assert!(validate_topic_filter("").is_err());
    }

    #[test]
    fn publish_topics_reject_wildcards() {
        assert!(validate_publish_topic("telemetry/device-1").is_ok());
        assert!(validate_publish_topic("telemetry/+").is_err());
        assert!(validate_publish_topic("telemetry/#").is_err());
    }

    #[test]
    fn qos_levels() {
        assert!(validate_qos(0).is_ok());
        assert!(validate_qos(2).is_ok());
        assert!(validate_qos(3).is_err());
    }
}
