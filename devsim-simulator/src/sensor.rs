//! Sensor state machine.
//!
//! [`simulate`] is a pure step: previous state, virtual instant, configuration and a
//! random source in; next state and the reading for that instant out. The same
//! seed and the same instants always produce the same readings.

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use devsim_config::{DoorSensorConfig, NumericSensorConfig, SensorsConfig, MAX_OPEN_MS};
use devsim_core::{DoorState, SensorReading};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoorPhase {
    Closed,
    /// Open until the scheduled virtual instant.
    Open { close_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub door: DoorPhase,
    pub last_opened: Option<DateTime<Utc>>,
    pub last_closed: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub humidity: f64,
}

impl SensorState {
    /// Door closed and never opened, values resting at normal.
    pub fn initial(config: &SensorsConfig) -> Self {
        Self {
            door: DoorPhase::Closed,
            last_opened: None,
            last_closed: None,
            temperature: config.temperature.normal,
            humidity: config.humidity.normal,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.door, DoorPhase::Open { .. })
    }
}

/// Advances every sensor by one tick at virtual instant `at`.
pub fn simulate<R: Rng>(
    prev: &SensorState,
    at: DateTime<Utc>,
    device_id: &str,
    config: &SensorsConfig,
    rng: &mut R,
) -> (SensorState, SensorReading) {
    let mut next = prev.clone();

    match prev.door {
        DoorPhase::Closed => {
            if let Some(close_at) = draw_opening(at, &config.door, rng) {
                next.door = DoorPhase::Open { close_at };
                next.last_opened = Some(at);
            }
        }
        DoorPhase::Open { close_at } if at >= close_at => {
            next.door = DoorPhase::Closed;
            next.last_closed = Some(at);
        }
        DoorPhase::Open { .. } => {}
    }

    let open = next.is_open();
    next.temperature = drift(prev.temperature, open, &config.temperature);
    next.humidity = drift(prev.humidity, open, &config.humidity);

    let reading = SensorReading {
        device_id: device_id.to_owned(),
        door: DoorState {
            is_open: open,
            open_time: next.last_opened,
            close_time: if open { None } else { next.last_closed },
        },
        temperature: next.temperature,
        humidity: next.humidity,
        collected_at: at,
    };

    (next, reading)
}

/// Returns the scheduled close instant when the door opens on this tick.
fn draw_opening<R: Rng>(
    at: DateTime<Utc>,
    door: &DoorSensorConfig,
    rng: &mut R,
) -> Option<DateTime<Utc>> {
    let draw: f64 = rng.random();
    if door.chance <= 0.0 || draw > door.chance {
        return None;
    }
    // max_time >= min_time is enforced when the configuration is loaded.
    let open_for = if door.max_time > door.min_time {
        rng.random_range(door.min_time..=door.max_time)
    } else {
        door.min_time
    };
    let open_for = TimeDelta::milliseconds(open_for.min(MAX_OPEN_MS) as i64);
    Some(at.checked_add_signed(open_for).unwrap_or(at))
}

fn drift(value: f64, door_open: bool, config: &NumericSensorConfig) -> f64 {
    if door_open {
        (value + config.increase).min(config.max)
    } else if value > config.normal {
        (value - config.decrease).max(config.normal)
    } else {
        value
    }
}

/// Stateful wrapper around [`simulate`] owning the state and a seedable RNG.
#[derive(Debug)]
pub struct SensorSimulator {
    device_id: String,
    config: SensorsConfig,
    state: SensorState,
    rng: SmallRng,
}

impl SensorSimulator {
    /// Draws a random seed when `seed` is `None`.
    pub fn new(device_id: impl Into<String>, config: SensorsConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        Self {
            device_id: device_id.into(),
            state: SensorState::initial(&config),
            config,
            rng,
        }
    }

    /// Replaces the current state, e.g. to resume from a known condition.
    pub fn with_state(mut self, state: SensorState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &SensorState {
        &self.state
    }

    pub fn step(&mut self, at: DateTime<Utc>) -> SensorReading {
        let (next, reading) = simulate(
            &self.state,
            at,
            &self.device_id,
            &self.config,
            &mut self.rng,
        );
        self.state = next;
        reading
    }
}
