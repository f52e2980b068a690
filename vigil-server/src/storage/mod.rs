//! Metric storage: one contract, three interchangeable backends.
//!
//! Every backend honors the same semantic contract: counters accumulate
//! (`new = old + delta`, starting from zero), gauges overwrite, identity is
//! the `(id, kind)` pair, and a metric missing the payload field for its
//! kind is rejected. All methods take the process shutdown token and return
//! promptly once it fires, without mutating state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vigil_core::{MetricKind, Result};

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

/// Storage handle shared by every request handler.
pub type SharedStorage = Arc<dyn Storage>;

/// Full contents of a backend: counter running sums and latest gauge values.
///
/// Doubles as the on-disk layout of the file backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub counters: HashMap<String, i64>,
    pub gauges: HashMap<String, f64>,
}

/// The storage contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Apply one update: add `delta` for a counter, overwrite with `value`
    /// for a gauge. Rejects a missing payload field or unknown kind.
    async fn update_metric(
        &self,
        shutdown: &CancellationToken,
        id: &str,
        kind: MetricKind,
        delta: Option<i64>,
        value: Option<f64>,
    ) -> Result<()>;

    /// Read back one metric as `(delta, value)`; exactly one side is
    /// populated. Fails with [`vigil_core::VigilError::NotFound`] when the
    /// `(id, kind)` pair has never been written.
    async fn get_metric(
        &self,
        shutdown: &CancellationToken,
        id: &str,
        kind: MetricKind,
    ) -> Result<(Option<i64>, Option<f64>)>;

    /// Snapshot everything the backend holds.
    async fn get_all_metrics(&self, shutdown: &CancellationToken) -> Result<Snapshot>;

    /// Whether the backend is currently usable.
    async fn ping(&self, shutdown: &CancellationToken) -> Result<()>;
}

/// The backend selected at startup. Selection is deterministic: a database
/// DSN wins, then a file path, then plain memory. Not hot-swappable.
pub enum Backend {
    Memory(Arc<MemoryStorage>),
    File(Arc<FileStorage>),
    Postgres(Arc<PostgresStorage>),
}

impl Backend {
    pub async fn setup(dsn: &str, file_path: &str, restore: bool) -> Result<Self> {
        if !dsn.is_empty() {
            tracing::info!("using postgres storage");
            return Ok(Self::Postgres(Arc::new(PostgresStorage::connect(dsn).await?)));
        }
        if !file_path.is_empty() {
            tracing::info!(path = %file_path, "using file storage");
            return Ok(Self::File(Arc::new(FileStorage::open(file_path, restore).await?)));
        }
        tracing::info!("using in-memory storage");
        Ok(Self::Memory(Arc::new(MemoryStorage::new())))
    }

    pub fn shared(&self) -> SharedStorage {
        match self {
            Self::Memory(s) => s.clone(),
            Self::File(s) => s.clone(),
            Self::Postgres(s) => s.clone(),
        }
    }
}
