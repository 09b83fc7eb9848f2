// devsim-simulator/src/lib.rs

/*!
# Device Simulator

Produces the device's sensor readings from simulated time.

## Key Components:
- **Sensor model:** door open/close state machine plus temperature and humidity drift.
- **Virtual Clock:** real-time cadence loop advancing the shared virtual time.
- **Sensor feed:** the tick step appending each reading to the telemetry buffer.
*/

pub mod feed;
pub mod sensor;
pub mod virtual_clock;

pub use feed::SensorFeed;
pub use sensor::{simulate, DoorPhase, SensorSimulator, SensorState};
pub use virtual_clock::{Tick, VirtualClock};
