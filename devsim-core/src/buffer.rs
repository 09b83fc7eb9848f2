//! Thread-safe, bounded FIFO of readings shared by the clock (producer) and the
//! delivery loop (consumer).
//!
//! One mutex guards the sequence. It is held only for in-memory list work; snapshot
//! encoding and every kind of I/O happen on copies taken out of the lock.
//!
//! Two questions are tracked independently:
//! - *needs snapshot*: the `dirty` flag, cleared by [`TelemetryBuffer::mark_persisted`]
//! - *needs delivery*: simply `!is_empty()`

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::SerializationError;
use crate::reading::SensorReading;

pub struct TelemetryBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    items: VecDeque<SensorReading>,
    dirty: bool,
    // Bumped on every mutation so a snapshot can tell whether it is still current.
    generation: u64,
}

/// Copy of the buffer taken under the lock, encoded outside of it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub readings: Vec<SensorReading>,
}

impl Snapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(&self.readings).map_err(SerializationError::Encode)
    }
}

/// Outcome of [`TelemetryBuffer::restore`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Entries decoded from the document.
    pub restored: usize,
    /// Entries that could not be decoded and were left out.
    pub skipped: usize,
    /// Oldest readings dropped to honour the capacity.
    pub evicted: usize,
}

impl TelemetryBuffer {
    /// Creates an empty buffer. A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(4096)),
                dirty: false,
                generation: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends at the tail. When full, the oldest reading is evicted first and
    /// returned so the loss can be reported.
    pub fn append(&self, reading: SensorReading) -> Option<SensorReading> {
        let mut inner = self.inner.lock();
        let evicted = if inner.items.len() >= self.capacity {
            inner.items.pop_front()
        } else {
            None
        };
        inner.items.push_back(reading);
        inner.touch();
        evicted
    }

    /// Copy of the oldest reading, left in place until delivery is confirmed.
    pub fn peek_head(&self) -> Option<SensorReading> {
        self.inner.lock().items.front().cloned()
    }

    /// Removes up to `count` readings from the head and returns how many went.
    pub fn remove_head(&self, count: usize) -> usize {
        let mut inner = self.inner.lock();
        let count = count.min(inner.items.len());
        if count > 0 {
            inner.items.drain(..count);
            inner.touch();
        }
        count
    }

    /// Removes the head only if it is still `delivered`. The producer may have
    /// evicted it while the publish was in flight, in which case nothing is removed.
    pub fn remove_delivered(&self, delivered: &SensorReading) -> bool {
        let mut inner = self.inner.lock();
        if inner.items.front() != Some(delivered) {
            return false;
        }
        inner.items.pop_front();
        inner.touch();
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// True when memory has diverged from the last persisted snapshot.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Copies the whole sequence out, or `None` when there is nothing new to persist.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let inner = self.inner.lock();
        if !inner.dirty {
            return None;
        }
        Some(Snapshot {
            generation: inner.generation,
            readings: inner.items.iter().cloned().collect(),
        })
    }

    /// Clears the dirty flag after `snapshot` was written, unless the buffer changed
    /// in the meantime. Returns whether the flag was cleared.
    pub fn mark_persisted(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.dirty = false;
            true
        } else {
            false
        }
    }

    /// Loads a snapshot document in front of whatever is already buffered.
    ///
    /// A document that is not a JSON list is rejected and leaves the buffer untouched.
    /// Individual entries that do not decode are skipped and logged.
    pub fn restore(&self, bytes: &[u8]) -> Result<RestoreReport, SerializationError> {
        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(bytes).map_err(SerializationError::Malformed)?;

        let mut report = RestoreReport::default();
        let mut restored = VecDeque::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<SensorReading>(entry) {
                Ok(reading) => restored.push_back(reading),
                Err(error) => {
                    warn!(index, %error, "Skipping unreadable snapshot entry");
                    report.skipped += 1;
                }
            }
        }
        report.restored = restored.len();

        let mut inner = self.inner.lock();
        let had_items = !inner.items.is_empty();
        restored.extend(inner.items.drain(..));
        while restored.len() > self.capacity {
            restored.pop_front();
            report.evicted += 1;
        }
        inner.items = restored;
        inner.generation += 1;
        // Memory matches the file only if nothing was added, skipped or dropped.
        inner.dirty = inner.dirty || had_items || report.skipped > 0 || report.evicted > 0;

        Ok(report)
    }
}

impl Inner {
    fn touch(&mut self) {
        self.dirty = true;
        self.generation = self.generation.wrapping_add(1);
    }
}
