//! Sensor reading value type and its wire encoding.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SerializationError;

/// Door sub-state as published.
///
/// `close_time` is the instant the door last closed; while the door is open it is
/// always `None` so the scheduled close instant never leaves the device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DoorState {
    pub is_open: bool,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
}

/// One simulated sample. Produced once per clock tick and never mutated after it
/// is handed to the buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub device_id: String,
    pub door: DoorState,
    pub temperature: f64,
    pub humidity: f64,
    pub collected_at: DateTime<Utc>,
}

impl SensorReading {
    /// JSON payload published for this reading.
    pub fn to_payload(&self) -> Result<Bytes, SerializationError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(SerializationError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case_fields() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let reading = SensorReading {
            device_id: "device-1".into(),
            door: DoorState {
                is_open: true,
                open_time: Some(at),
                close_time: None,
            },
            temperature: 4.5,
            humidity: 61.0,
            collected_at: at,
        };

        let payload = reading.to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["deviceId"], "device-1");
        assert_eq!(value["door"]["isOpen"], true);
        assert!(value["door"]["closeTime"].is_null());
        assert_eq!(value["collectedAt"], "2023-11-14T22:13:20Z");
        assert_eq!(value["temperature"], 4.5);
    }
}
