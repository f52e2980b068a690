//! gRPC stream publisher: one stream, batched flushes.
//!
//! A single task drains the queue into an in-memory batch and flushes it on
//! three triggers: the report-interval tick, the 5000-metric hard cap, and
//! queue close / cancellation. Per-message send failures are logged and
//! counted, never retried; the batch is cleared regardless. On shutdown the
//! stream is half-closed and the server's `{accepted, failed}` summary is
//! awaited.

use rsa::RsaPublicKey;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_api::vigil::v1::metrics_service_client::MetricsServiceClient;
use vigil_api::vigil::v1::PushRequest;
use vigil_core::{envelope, with_retry, Metric, Result, RetryPolicy, VigilError};

/// Hard cap on buffered metrics between flushes.
const MAX_BATCH: usize = 5000;

pub struct GrpcPublisher {
    endpoint: String,
    hash_key: Option<String>,
    public_key: Option<RsaPublicKey>,
    agent_ip: String,
    report_interval: Duration,
    policy: RetryPolicy,
}

impl GrpcPublisher {
    pub fn new(
        addr: &str,
        hash_key: &str,
        public_key: Option<RsaPublicKey>,
        agent_ip: String,
        report_interval: Duration,
    ) -> Self {
        Self {
            endpoint: super::normalize_http_host(addr),
            hash_key: (!hash_key.is_empty()).then(|| hash_key.to_string()),
            public_key,
            agent_ip,
            report_interval,
            policy: RetryPolicy::default(),
        }
    }

    fn seal_request(&self, metric: &Metric) -> Result<PushRequest> {
        let json = serde_json::to_vec(metric)?;
        let sealed = envelope::seal(&json, self.public_key.as_ref(), self.hash_key.as_deref())?;
        Ok(PushRequest {
            payload: sealed.payload,
            hash: sealed.hash,
            agent_ip: self.agent_ip.clone(),
            encrypted: sealed.encrypted,
        })
    }

    /// Drain the queue until it closes or cancellation fires. A transport
    /// failure that kills the stream propagates out so the agent can shut
    /// down instead of silently buffering forever.
    pub async fn run(
        &self,
        mut queue: mpsc::Receiver<Metric>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!(endpoint = %self.endpoint, "dialing grpc server");
        let channel = with_retry(&self.policy, || async move {
            tonic::transport::Endpoint::from_shared(self.endpoint.clone())
                .map_err(|e| VigilError::Config { reason: e.to_string() })?
                .connect()
                .await
                .map_err(|e| VigilError::Transport { reason: e.to_string() })
        })
        .await?;
        info!("grpc connected, opening push stream");

        let mut client = MetricsServiceClient::new(channel);
        let (stream_tx, stream_rx) = mpsc::channel::<PushRequest>(512);
        let call = tokio::spawn(async move {
            client.push(tonic::Request::new(ReceiverStream::new(stream_rx))).await
        });

        let mut batch: Vec<Metric> = Vec::with_capacity(512);
        let start = tokio::time::Instant::now() + self.report_interval;
        let mut ticker = tokio::time::interval_at(start, self.report_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.flush(&stream_tx, &mut batch, "shutdown").await;
                    break;
                }
                _ = ticker.tick() => {
                    self.flush(&stream_tx, &mut batch, "tick").await;
                }
                metric = queue.recv() => match metric {
                    Some(metric) => {
                        batch.push(metric);
                        if batch.len() >= MAX_BATCH {
                            self.flush(&stream_tx, &mut batch, "batch cap").await;
                        }
                    }
                    None => {
                        self.flush(&stream_tx, &mut batch, "queue closed").await;
                        break;
                    }
                }
            }
        }

        // Half-close and wait for the aggregate outcome.
        drop(stream_tx);
        match call.await {
            Ok(Ok(response)) => {
                let summary = response.into_inner();
                info!(
                    accepted = summary.accepted,
                    failed = summary.failed,
                    "push stream summary"
                );
                Ok(())
            }
            Ok(Err(status)) => {
                Err(VigilError::Transport { reason: format!("push stream failed: {status}") })
            }
            Err(join) => Err(VigilError::Internal(format!("push task panicked: {join}"))),
        }
    }

    /// Send every batched metric on the stream. Individual failures don't
    /// stop the flush, and the batch empties no matter what happened.
    async fn flush(&self, stream: &mpsc::Sender<PushRequest>, batch: &mut Vec<Metric>, reason: &str) {
        if batch.is_empty() {
            return;
        }
        let total = batch.len();
        let start = std::time::Instant::now();
        let mut sent = 0usize;

        for metric in batch.drain(..) {
            let request = match self.seal_request(&metric) {
                Ok(request) => request,
                Err(e) => {
                    warn!(id = %metric.id, error = %e, "seal failed, dropping metric");
                    continue;
                }
            };
            if stream.send(request).await.is_err() {
                warn!(id = %metric.id, "push stream closed, dropping metric");
                continue;
            }
            sent += 1;
        }

        info!(
            sent,
            total,
            elapsed_ms = start.elapsed().as_millis() as u64,
            reason,
            "batch flushed"
        );
    }
}
