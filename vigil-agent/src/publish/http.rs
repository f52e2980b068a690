//! HTTP worker pool: one metric per request.
//!
//! `RateLimit` workers share the queue receiver. Each worker seals one
//! metric, POSTs it to `/update` under the retry policy, discards the
//! response body, and pauses for the report interval. Send failures are
//! logged and dropped; the pool only stops when the queue closes.

use super::normalize_http_host;
use rsa::RsaPublicKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use vigil_core::{envelope, with_retry, Metric, Result, RetryPolicy, VigilError};

/// Shared receiver handle: workers take turns pulling one metric at a time.
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<Metric>>>;

pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: String,
    hash_key: Option<String>,
    public_key: Option<RsaPublicKey>,
    agent_ip: String,
    report_interval: Duration,
    policy: RetryPolicy,
}

impl HttpPublisher {
    pub fn new(
        host: &str,
        hash_key: &str,
        public_key: Option<RsaPublicKey>,
        agent_ip: String,
        report_interval: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_http_host(host),
            hash_key: (!hash_key.is_empty()).then(|| hash_key.to_string()),
            public_key,
            agent_ip,
            report_interval,
            policy: RetryPolicy::default(),
        }
    }

    /// Probe `/health` before the pool starts. Failure is logged, not fatal:
    /// the workers retry per request anyway.
    pub async fn check_server(&self) {
        let url = format!("{}/health", self.base_url);
        let url = url.as_str();
        let probe = with_retry(&self.policy, || async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| VigilError::Transport { reason: e.to_string() })?;
            if !response.status().is_success() {
                return Err(VigilError::Transport {
                    reason: format!("server returned {}", response.status()),
                });
            }
            Ok(())
        })
        .await;

        match probe {
            Ok(()) => info!(url = %self.base_url, "server reachable"),
            Err(e) => warn!(error = %e, "server availability check failed"),
        }
    }

    /// One worker: receive, seal, send, sleep, until the queue closes.
    pub async fn run_worker(self: Arc<Self>, worker: usize, queue: SharedQueue) {
        debug!(worker, "publisher worker started");
        loop {
            let metric = {
                let mut receiver = queue.lock().await;
                receiver.recv().await
            };
            let Some(metric) = metric else {
                debug!(worker, "queue closed, worker exiting");
                return;
            };

            if let Err(e) = self.send(&metric).await {
                warn!(worker, id = %metric.id, kind = %metric.kind, error = %e, "publish failed");
            }

            tokio::time::sleep(self.report_interval).await;
        }
    }

    async fn send(&self, metric: &Metric) -> Result<()> {
        let json = serde_json::to_vec(metric)?;
        let sealed = envelope::seal(&json, self.public_key.as_ref(), self.hash_key.as_deref())?;
        let sealed = &sealed;
        let content_type =
            if sealed.encrypted { "application/octet-stream" } else { "application/json" };
        let url = format!("{}/update", self.base_url);
        let url = url.as_str();

        with_retry(&self.policy, || async move {
            let mut request = self
                .client
                .post(url)
                .header("Content-Type", content_type)
                .header("Content-Encoding", "gzip")
                .body(sealed.payload.clone());
            if !sealed.hash.is_empty() {
                request = request.header("HashSHA256", &sealed.hash);
            }
            if !self.agent_ip.is_empty() {
                request = request.header("X-Real-IP", &self.agent_ip);
            }

            let response = request
                .send()
                .await
                .map_err(|e| VigilError::Transport { reason: e.to_string() })?;

            let status = response.status();
            // Body is discarded either way.
            drop(response);

            if status.is_server_error() {
                return Err(VigilError::Transport { reason: format!("server returned {status}") });
            }
            if !status.is_success() {
                return Err(VigilError::Internal(format!("server returned {status}")));
            }
            Ok(())
        })
        .await
    }
}
