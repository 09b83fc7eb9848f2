//! Snapshot file holding the buffered readings across restarts.
//!
//! Writes go to a sibling temp file that is renamed over the snapshot, so a
//! failed or partial write never replaces the previous snapshot.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use devsim_core::buffer::RestoreReport;
use devsim_core::{PersistenceError, TelemetryBuffer};

/// Result of [`SnapshotStore::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed since the last snapshot.
    Clean,
    Written { readings: usize },
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw snapshot bytes, or `None` when no snapshot has been written yet.
    pub async fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(PersistenceError::io(&self.path, error)),
        }
    }

    pub async fn save(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| PersistenceError::io(parent, error))?;
        }

        let temp = self.temp_path();
        if let Err(error) = write_synced(&temp, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(PersistenceError::io(&temp, error));
        }
        if let Err(error) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(PersistenceError::io(&self.path, error));
        }
        Ok(())
    }

    /// Loads the snapshot in front of whatever `buffer` already holds.
    pub async fn restore_into(
        &self,
        buffer: &TelemetryBuffer,
    ) -> Result<RestoreReport, PersistenceError> {
        let Some(bytes) = self.load().await? else {
            debug!(path = %self.path.display(), "No snapshot to restore");
            return Ok(RestoreReport::default());
        };
        let report = buffer.restore(&bytes)?;
        info!(
            path = %self.path.display(),
            restored = report.restored,
            skipped = report.skipped,
            evicted = report.evicted,
            "Snapshot restored"
        );
        Ok(report)
    }

    /// Persists `buffer` if it changed since the last successful flush.
    pub async fn flush(&self, buffer: &TelemetryBuffer) -> Result<FlushOutcome, PersistenceError> {
        let Some(snapshot) = buffer.snapshot() else {
            return Ok(FlushOutcome::Clean);
        };
        let bytes = snapshot.to_bytes()?;
        self.save(&bytes).await?;
        if !buffer.mark_persisted(snapshot.generation) {
            debug!("Buffer changed while saving; next flush will catch up");
        }
        Ok(FlushOutcome::Written {
            readings: snapshot.readings.len(),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use devsim_core::reading::{DoorState, SensorReading};

    fn reading(seq: i64) -> SensorReading {
        SensorReading {
            device_id: "device-1".into(),
            door: DoorState::default(),
            temperature: 4.0,
            humidity: 60.0 + seq as f64,
            collected_at: DateTime::from_timestamp_millis(seq * 1_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("device.json"));
        assert!(store.load().await.unwrap().is_none());

        let buffer = TelemetryBuffer::with_capacity(4);
        let report = store.restore_into(&buffer).await.unwrap();
        assert_eq!(report, RestoreReport::default());
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn flush_writes_only_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/device.json"));
        let buffer = TelemetryBuffer::with_capacity(4);

        assert_eq!(store.flush(&buffer).await.unwrap(), FlushOutcome::Clean);
        assert!(!store.path().exists());

        buffer.append(reading(1));
        buffer.append(reading(2));
        assert_eq!(
            store.flush(&buffer).await.unwrap(),
            FlushOutcome::Written { readings: 2 }
        );
        assert!(!buffer.is_dirty());
        assert_eq!(store.flush(&buffer).await.unwrap(), FlushOutcome::Clean);

        let saved: Vec<SensorReading> =
            serde_json::from_slice(&store.load().await.unwrap().unwrap()).unwrap();
        assert_eq!(saved, vec![reading(1), reading(2)]);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn restore_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("device.json"));

        let source = TelemetryBuffer::with_capacity(8);
        for seq in 1..=3 {
            source.append(reading(seq));
        }
        store.flush(&source).await.unwrap();

        let target = TelemetryBuffer::with_capacity(8);
        let report = store.restore_into(&target).await.unwrap();
        assert_eq!(report.restored, 3);
        assert_eq!(target.peek_head(), Some(reading(1)));
        assert_eq!(target.len(), 3);
    }

    #[tokio::test]
    async fn malformed_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("device.json"));
        store.save(b"{\"oops\": true}").await.unwrap();

        let buffer = TelemetryBuffer::with_capacity(4);
        let result = store.restore_into(&buffer).await;
        assert!(matches!(result, Err(PersistenceError::Serialization(_))));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_snapshot_and_dirty_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        let store = SnapshotStore::new(&path);
        store.save(b"[]").await.unwrap();

        // A directory squatting on the temp file name makes the write fail.
        std::fs::create_dir(store.temp_path()).unwrap();

        let buffer = TelemetryBuffer::with_capacity(4);
        buffer.append(reading(1));
        assert!(matches!(
            store.flush(&buffer).await,
            Err(PersistenceError::Io { .. })
        ));
        assert!(buffer.is_dirty());
        assert_eq!(std::fs::read(&path).unwrap(), b"[]");
    }
}
