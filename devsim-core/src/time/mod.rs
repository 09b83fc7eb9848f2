//! ## devsim-core::time
//! **Shared virtual time source**
//!
//! Simulated time is decoupled from the wall clock: only the clock loop advances it,
//! everything else reads it. Millisecond resolution, lock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

#[derive(Clone, Debug)]
pub struct VirtualTime {
    offset_ms: Arc<AtomicU64>, // Milliseconds since the Unix epoch
}

impl VirtualTime {
    /// Starts virtual time at the given instant. Instants before the epoch clamp to it.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        let millis = u64::try_from(start.timestamp_millis()).unwrap_or(0);
        Self {
            offset_ms: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Starts virtual time at the current wall-clock instant.
    pub fn starting_now() -> Self {
        Self::starting_at(Utc::now())
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    pub fn now(&self) -> DateTime<Utc> {
        to_datetime(self.now_ms())
    }

    /// Moves virtual time forward and returns the new instant.
    pub fn advance(&self, ms: u64) -> DateTime<Utc> {
        let previous = self.offset_ms.fetch_add(ms, Ordering::AcqRel);
        to_datetime(previous.saturating_add(ms))
    }
}

fn to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_initial_value() {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let time = VirtualTime::starting_at(start);
        assert_eq!(time.now(), start);
        assert_eq!(time.now_ms(), 1_700_000_000_000);
    }

    #[test]
    fn test_clock_advance() {
        let time = VirtualTime::starting_at(DateTime::from_timestamp_millis(0).unwrap());
        assert_eq!(time.advance(500).timestamp_millis(), 500);
        time.advance(250);
        assert_eq!(time.now_ms(), 750);
    }

    #[test]
    fn clones_share_the_same_instant() {
        let time = VirtualTime::starting_now();
        let reader = time.clone();
        let before = reader.now_ms();
        time.advance(6_000);
        assert_eq!(reader.now_ms(), before + 6_000);
    }
}
