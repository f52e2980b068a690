//! In-memory backend: two maps behind a single read/write lock.

use super::{Snapshot, Storage};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use vigil_core::{MetricKind, Result, VigilError};

#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<Snapshot>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
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
        Ok(())
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

    async fn ping(&self, shutdown: &CancellationToken) -> Result<()> {
        if shutdown.is_cancelled() {
            return Err(VigilError::Cancelled);
        }
        Ok(())
    }
}
