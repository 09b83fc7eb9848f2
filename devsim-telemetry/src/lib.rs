//! # Device Telemetry
//!
//! Crate for logging and metrics of the device pipeline itself (not the sensor
//! readings it produces).

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{MetricsError, MetricsRecorder};
