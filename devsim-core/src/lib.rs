//! # devsim-core
//!
//! Foundation layer of the device pipeline: the reading value type, the shared
//! virtual time source, the bounded telemetry buffer both loops work on, and the
//! start/stop lifecycle every long-running service is built from.
//!
//! ### Key Submodules:
//! - `reading`: `SensorReading` and its wire encoding
//! - `time`: `VirtualTime` using an atomic millisecond counter
//! - `buffer`: `TelemetryBuffer`, bounded FIFO with snapshot / restore
//! - `lifecycle`: `Worker` task handle with cooperative stop

pub mod buffer;
pub mod error;
pub mod lifecycle;
pub mod reading;
pub mod time;

pub mod prelude {
    pub use crate::buffer::*;
    pub use crate::error::*;
    pub use crate::lifecycle::*;
    pub use crate::reading::*;
    pub use crate::time::*;
}

pub use buffer::TelemetryBuffer;
pub use error::{PersistenceError, SerializationError, TransportError};
pub use reading::{DoorState, SensorReading};
