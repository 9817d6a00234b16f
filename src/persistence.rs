//! Snapshot hand-off to external storage.
//!
//! The engine never reads state back; it only hands complete snapshots to a
//! `SnapshotSink` after each turn. A failed save is the caller's to log, the
//! in-memory state stays authoritative.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::coaching::state::CoachingState;
use crate::error::PersistenceError;

/// Destination for coaching-state snapshots, keyed by session id.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Store the latest snapshot of a session, replacing any earlier one.
    async fn save(&self, session_id: Uuid, state: &CoachingState) -> Result<(), PersistenceError>;
}

/// Keeps the latest snapshot per session in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotSink {
    snapshots: Mutex<HashMap<Uuid, CoachingState>>,
}

impl MemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: Uuid) -> Option<CoachingState> {
        self.snapshots.lock().await.get(&session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.lock().await.is_empty()
    }
}

#[async_trait]
impl SnapshotSink for MemorySnapshotSink {
    async fn save(&self, session_id: Uuid, state: &CoachingState) -> Result<(), PersistenceError> {
        self.snapshots.lock().await.insert(session_id, state.clone());
        Ok(())
    }
}

/// Writes each session's snapshot to `<dir>/<session_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Read a snapshot back, for tooling and tests.
    pub async fn load(&self, session_id: Uuid) -> Result<CoachingState, PersistenceError> {
        let bytes = tokio::fs::read(self.path_for(session_id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SnapshotSink for JsonFileSink {
    async fn save(&self, session_id: Uuid, state: &CoachingState) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // Atomic replace.
        let tmp = self.dir.join(format!("{session_id}.json.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.path_for(session_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::state::CoachingAction;

    #[tokio::test]
    async fn memory_sink_keeps_latest_snapshot() {
        let sink = MemorySnapshotSink::new();
        let id = Uuid::new_v4();
        let first = CoachingState::new();
        let second = first.apply(CoachingAction::RecordExchange);

        sink.save(id, &first).await.unwrap();
        sink.save(id, &second).await.unwrap();

        assert_eq!(sink.len().await, 1);
        assert_eq!(sink.get(id).await.unwrap(), second);
        assert!(sink.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn file_sink_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("snapshots"));
        let id = Uuid::new_v4();
        let state = CoachingState::new().apply(CoachingAction::RecordExchange);

        sink.save(id, &state).await.unwrap();

        assert!(sink.path_for(id).exists());
        assert_eq!(sink.load(id).await.unwrap(), state);
    }

    #[tokio::test]
    async fn file_sink_reports_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let err = sink.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));
    }
}
