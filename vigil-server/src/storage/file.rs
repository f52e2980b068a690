//! File backend: the in-memory maps plus a JSON snapshot on disk.
//!
//! Every update rewrites the whole snapshot as indented JSON. A torn write
//! is acceptable: the agent re-sends on restart, so recovery is re-ingestion
//! rather than journaling. A periodic save (the configured store interval)
//! persists the snapshot even when no updates arrive.

use super::{Snapshot, Storage};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use vigil_core::{MetricKind, Result, VigilError};

pub struct FileStorage {
    path: PathBuf,
    state: RwLock<Snapshot>,
}

impl FileStorage {
    /// Open the backend. With `restore` set and the file present, the
    /// snapshot is loaded; an absent file starts empty either way.
    pub async fn open(path: impl AsRef<Path>, restore: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = Snapshot::default();

        if restore {
            match tokio::fs::read(&path).await {
                Ok(raw) => {
                    state = serde_json::from_slice(&raw)
                        .map_err(|e| VigilError::Config {
                            reason: format!("corrupt snapshot {}: {e}", path.display()),
                        })?;
                    tracing::info!(
                        path = %path.display(),
                        counters = state.counters.len(),
                        gauges = state.gauges.len(),
                        "restored snapshot"
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(VigilError::Io { path, source: e }),
            }
        }

        Ok(Self { path, state: RwLock::new(state) })
    }

    /// Persist the current snapshot. Called on every update, on the store
    /// interval, and once more during shutdown.
    pub async fn save(&self) -> Result<()> {
        let state = self.state.read().await;
        let data = serde_json::to_vec_pretty(&*state)
            .map_err(|e| VigilError::Internal(e.to_string()))?;
        drop(state);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| VigilError::Io { path: parent.to_path_buf(), source: e })?;
            }
        }
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| VigilError::Io { path: self.path.clone(), source: e })
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn update_metric(
        &self,
        shutdown: &CancellationToken,
        id: &str,
        kind: MetricKind,
        delta: Option<i64>,
        value: Option<f64>,
    ) -> Result<()> {
        if shutdown.is_cancelled() {
            return Err(VigilError::Cancelled);
        }

        {
            let mut state = self.state.write().await;
            match kind {
                MetricKind::Counter => {
                    let delta = delta.ok_or_else(|| VigilError::MissingPayload {
                        id: id.to_string(),
                        kind: "counter",
                        field: "delta",
                    })?;
                    *state.counters.entry(id.to_string()).or_insert(0) += delta;
                }
                MetricKind::Gauge => {
                    let value = value.ok_or_else(|| VigilError::MissingPayload {
                        id: id.to_string(),
                        kind: "gauge",
                        field: "value",
                    })?;
                    state.gauges.insert(id.to_string(), value);
                }
            }
        }

        self.save().await
    }

    async fn get_metric(
        &self,
        shutdown: &CancellationToken,
        id: &str,
        kind: MetricKind,
    ) -> Result<(Option<i64>, Option<f64>)> {
        if shutdown.is_cancelled() {
            return Err(VigilError::Cancelled);
        }

        let state = self.state.read().await;
        match kind {
            MetricKind::Counter => match state.counters.get(id) {
                Some(delta) => Ok((Some(*delta), None)),
                None => Err(VigilError::NotFound { id: id.to_string() }),
            },
            MetricKind::Gauge => match state.gauges.get(id) {
                Some(value) => Ok((None, Some(*value))),
                None => Err(VigilError::NotFound { id: id.to_string() }),
            },
        }
    }

    async fn get_all_metrics(&self, shutdown: &CancellationToken) -> Result<Snapshot> {
        if shutdown.is_cancelled() {
            return Err(VigilError::Cancelled);
        }
        Ok(self.state.read().await.clone())
    }

    /// Usable iff the snapshot file exists on disk.
    async fn ping(&self, shutdown: &CancellationToken) -> Result<()> {
        if shutdown.is_cancelled() {
            return Err(VigilError::Cancelled);
        }
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| VigilError::Io { path: self.path.clone(), source: e })
    }
}

/// Save the snapshot every `interval` until shutdown, then once more so the
/// final state survives the process.
pub async fn run_periodic_save(
    storage: std::sync::Arc<FileStorage>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // interval() fires immediately; skip that first tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = storage.save().await {
                    tracing::error!(error = %e, "periodic snapshot save failed");
                }
            }
        }
    }

    if let Err(e) = storage.save().await {
        tracing::error!(error = %e, "final snapshot save failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn updates_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let t = token();

        {
            let s = FileStorage::open(&path, true).await.unwrap();
            for i in 0..5 {
                s.update_metric(&t, &format!("c{i}"), MetricKind::Counter, Some(i), None)
                    .await
                    .unwrap();
                s.update_metric(&t, &format!("g{i}"), MetricKind::Gauge, None, Some(i as f64))
                    .await
                    .unwrap();
            }
        }

        let reopened = FileStorage::open(&path, true).await.unwrap();
        let snap = reopened.get_all_metrics(&t).await.unwrap();
        assert_eq!(snap.counters.len(), 5);
        assert_eq!(snap.gauges.len(), 5);
        assert_eq!(snap.counters["c3"], 3);
        assert_eq!(snap.gauges["g4"], 4.0);
    }

    #[tokio::test]
    async fn restore_disabled_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let t = token();

        let s = FileStorage::open(&path, true).await.unwrap();
        s.update_metric(&t, "c", MetricKind::Counter, Some(1), None).await.unwrap();
        drop(s);

        let fresh = FileStorage::open(&path, false).await.unwrap();
        assert!(fresh.get_all_metrics(&t).await.unwrap().counters.is_empty());
    }

    #[tokio::test]
    async fn snapshot_layout_is_two_top_level_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let t = token();

        let s = FileStorage::open(&path, true).await.unwrap();
        s.update_metric(&t, "hits", MetricKind::Counter, Some(12), None).await.unwrap();
        s.update_metric(&t, "temp", MetricKind::Gauge, None, Some(36.6)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["counters"]["hits"], 12);
        assert_eq!(parsed["gauges"]["temp"], 36.6);
        // Indented, not minified.
        assert!(raw.contains('\n'));
    }

    #[tokio::test]
    async fn ping_tracks_file_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let t = token();

        let s = FileStorage::open(&path, true).await.unwrap();
        assert!(s.ping(&t).await.is_err());

        s.update_metric(&t, "c", MetricKind::Counter, Some(1), None).await.unwrap();
        assert!(s.ping(&t).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_update_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let s = FileStorage::open(&path, true).await.unwrap();
        let dead = token();
        dead.cancel();
        assert!(matches!(
            s.update_metric(&dead, "c", MetricKind::Counter, Some(1), None).await,
            Err(VigilError::Cancelled)
        ));
        assert!(!path.exists());
    }
}
