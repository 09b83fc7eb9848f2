//! # devsim-engine
//!
//! Runs a simulated device: the buffer service persisting the telemetry buffer, the
//! delivery loop draining it to the broker, and the pipeline composing both with
//! the virtual clock.

pub mod autosave;
pub mod delivery;
pub mod error;
pub mod persistence;
pub mod pipeline;

pub use autosave::Autosave;
pub use delivery::{CycleReport, DeliveryLoop, DeliverySettings, Subscription};
pub use error::PipelineError;
pub use persistence::{FlushOutcome, SnapshotStore};
pub use pipeline::DevicePipeline;
