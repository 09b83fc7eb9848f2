use thiserror::Error;

use devsim_config::ConfigError;
use devsim_core::{PersistenceError, TransportError};
use devsim_telemetry::MetricsError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] MetricsError),
}
