//! Relational backend over PostgreSQL.
//!
//! One table keyed by `(id, type)`. Counter updates UPSERT with
//! `delta = EXCLUDED.delta + metrics.delta`; gauge updates overwrite. Every
//! statement runs under the transient-failure retry policy, so a dropped
//! connection (SQLSTATE class 08) is absorbed rather than surfaced.

use super::{Snapshot, Storage};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vigil_core::{with_retry, MetricKind, Result, RetryPolicy, VigilError};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

const INIT_TABLE: &str = "\
    CREATE TABLE IF NOT EXISTS metrics (
        id VARCHAR NOT NULL,
        type VARCHAR NOT NULL,
        delta BIGINT,
        value DOUBLE PRECISION,
        PRIMARY KEY (id, type)
    )";

const UPSERT: &str = "\
    INSERT INTO metrics (id, type, delta, value)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (id, type) DO UPDATE
    SET delta = EXCLUDED.delta + metrics.delta, value = EXCLUDED.value";

pub struct PostgresStorage {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PostgresStorage {
    /// Connect, verify reachability, and create the schema.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(dsn).await?;
        let storage = Self { pool, policy: RetryPolicy::default() };

        storage.ping(&CancellationToken::new()).await?;
        let pool = &storage.pool;
        with_retry(&storage.policy, || async move {
            sqlx::query(INIT_TABLE).execute(pool).await?;
            Ok(())
        })
        .await?;

        Ok(storage)
    }
}

/// Race a storage future against shutdown so a cancelled server never sits
/// in database I/O.
async fn guarded<T>(
    shutdown: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if shutdown.is_cancelled() {
        return Err(VigilError::Cancelled);
    }
    tokio::select! {
        _ = shutdown.cancelled() => Err(VigilError::Cancelled),
        res = fut => res,
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn update_metric(
        &self,
        shutdown: &CancellationToken,
        id: &str,
        kind: MetricKind,
        delta: Option<i64>,
        value: Option<f64>,
    ) -> Result<()> {
        match kind {
            MetricKind::Counter if delta.is_none() => {
                return Err(VigilError::MissingPayload {
                    id: id.to_string(),
                    kind: "counter",
                    field: "delta",
                });
            }
            MetricKind::Gauge if value.is_none() => {
                return Err(VigilError::MissingPayload {
                    id: id.to_string(),
                    kind: "gauge",
                    field: "value",
                });
            }
            _ => {}
        }

        guarded(
            shutdown,
            with_retry(&self.policy, || async move {
                sqlx::query(UPSERT)
                    .bind(id)
                    .bind(kind.as_str())
                    .bind(delta)
                    .bind(value)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }),
        )
        .await
    }

    async fn get_metric(
        &self,
        shutdown: &CancellationToken,
        id: &str,
        kind: MetricKind,
    ) -> Result<(Option<i64>, Option<f64>)> {
        let row = guarded(
            shutdown,
            with_retry(&self.policy, || async move {
                let row: Option<(Option<i64>, Option<f64>)> = sqlx::query_as(
                    "SELECT delta, value FROM metrics WHERE id = $1 AND type = $2",
                )
                .bind(id)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;
                Ok(row)
            }),
        )
        .await?;

        row.ok_or_else(|| VigilError::NotFound { id: id.to_string() })
    }

    async fn get_all_metrics(&self, shutdown: &CancellationToken) -> Result<Snapshot> {
        let rows = guarded(
            shutdown,
            with_retry(&self.policy, || async move {
                let rows: Vec<(String, String, Option<i64>, Option<f64>)> =
                    sqlx::query_as("SELECT id, type, delta, value FROM metrics")
                        .fetch_all(&self.pool)
                        .await?;
                Ok(rows)
            }),
        )
        .await?;

        let mut snapshot = Snapshot::default();
        for (id, kind, delta, value) in rows {
            match (MetricKind::parse(&kind), delta, value) {
                (Some(MetricKind::Counter), Some(delta), _) => {
                    snapshot.counters.insert(id, delta);
                }
                (Some(MetricKind::Gauge), _, Some(value)) => {
                    snapshot.gauges.insert(id, value);
                }
                _ => {}
            }
        }
        Ok(snapshot)
    }

    async fn ping(&self, shutdown: &CancellationToken) -> Result<()> {
        guarded(
            shutdown,
            with_retry(&self.policy, || async move {
                tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool))
                    .await
                    .map_err(|_| VigilError::Transport {
                        reason: "database ping timed out".into(),
                    })??;
                Ok(())
            }),
        )
        .await
    }
}
