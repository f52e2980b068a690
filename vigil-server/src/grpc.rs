//! gRPC transport: the client-streaming ingestion service.
//!
//! One envelope per stream message. Rejections never tear the stream down;
//! they increment `failed` and the agent learns the aggregate outcome from
//! the terminating `PushResult`.

use crate::state::AppState;
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};
use vigil_api::vigil::v1::metrics_service_server::MetricsService;
use vigil_api::vigil::v1::{PushRequest, PushResult};
use vigil_core::{envelope, Metric, Result};

pub use vigil_api::vigil::v1::metrics_service_server::MetricsServiceServer;

/// gRPC service implementation.
pub struct MetricsGrpc {
    state: Arc<AppState>,
}

impl MetricsGrpc {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Open one envelope and apply it to storage. Any error here counts the
    /// message as failed without affecting the rest of the stream.
    async fn ingest(&self, req: &PushRequest, peer_ip: Option<&str>) -> Result<Metric> {
        let state = &self.state;

        let mut agent_ip = req.agent_ip.trim();
        if agent_ip.is_empty() {
            agent_ip = peer_ip.unwrap_or_default();
        }
        if !state.trusted.allows(agent_ip) {
            return Err(vigil_core::VigilError::Forbidden { ip: agent_ip.to_string() });
        }

        let plain = envelope::open(
            &req.payload,
            &req.hash,
            req.encrypted,
            state.private_key.as_ref(),
            state.hash_key.as_deref(),
        )?;

        let metric: Metric = serde_json::from_slice(&plain)?;
        metric.validate()?;

        state
            .storage
            .update_metric(&state.shutdown, &metric.id, metric.kind, metric.delta, metric.value)
            .await?;

        Ok(metric)
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsGrpc {
    async fn push(
        &self,
        request: Request<Streaming<PushRequest>>,
    ) -> std::result::Result<Response<PushResult>, Status> {
        let peer_ip = request.remote_addr().map(|addr| addr.ip().to_string());
        info!(peer = peer_ip.as_deref().unwrap_or("<unknown>"), "grpc stream opened");

        let mut stream = request.into_inner();
        let mut accepted: i64 = 0;
        let mut failed: i64 = 0;

        while let Some(req) = stream.message().await? {
            match self.ingest(&req, peer_ip.as_deref()).await {
                Ok(metric) => {
                    accepted += 1;
                    info!(id = %metric.id, kind = %metric.kind, "metric stored");
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        agent_ip = %req.agent_ip,
                        encrypted = req.encrypted,
                        payload_len = req.payload.len(),
                        error = %e,
                        "envelope rejected"
                    );
                }
            }
        }

        info!(accepted, failed, "grpc stream closing");
        Ok(Response::new(PushResult { accepted, failed }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use tokio_util::sync::CancellationToken;
    use vigil_core::{MetricKind, TrustedSubnet, VigilError};

    fn service(state: AppState) -> MetricsGrpc {
        MetricsGrpc::new(Arc::new(state))
    }

    fn memory_state() -> AppState {
        AppState::new(Arc::new(MemoryStorage::new()), CancellationToken::new())
    }

    fn sealed_request(metric: &Metric, hash_key: Option<&str>) -> PushRequest {
        let json = serde_json::to_vec(metric).unwrap();
        let sealed = envelope::seal(&json, None, hash_key).unwrap();
        PushRequest {
            payload: sealed.payload,
            hash: sealed.hash,
            agent_ip: "127.0.0.1".into(),
            encrypted: sealed.encrypted,
        }
    }

    #[tokio::test]
    async fn ingest_stores_a_plain_counter() {
        let svc = service(memory_state());
        let req = sealed_request(&Metric::counter("PollCount", 3), None);
        svc.ingest(&req, None).await.unwrap();
        let (delta, _) = svc
            .state
            .storage
            .get_metric(&svc.state.shutdown, "PollCount", MetricKind::Counter)
            .await
            .unwrap();
        assert_eq!(delta, Some(3));
    }

    #[tokio::test]
    async fn ingest_verifies_hmac() {
        let svc = service(memory_state().with_hash_key("k"));
        let mut req = sealed_request(&Metric::gauge("g", 1.0), Some("k"));
        svc.ingest(&req, None).await.unwrap();

        req.hash = "00".into();
        let err = svc.ingest(&req, None).await.unwrap_err();
        assert!(matches!(err, VigilError::HashMismatch));
    }

    #[tokio::test]
    async fn ingest_enforces_trusted_subnet_with_peer_fallback() {
        let trusted = TrustedSubnet::parse("127.0.0.0/8").unwrap();
        let svc = service(memory_state().with_trusted_subnet(trusted));

        let mut req = sealed_request(&Metric::counter("c", 1), None);
        svc.ingest(&req, None).await.unwrap();

        req.agent_ip = "10.1.2.3".into();
        assert!(matches!(
            svc.ingest(&req, None).await.unwrap_err(),
            VigilError::Forbidden { .. }
        ));

        // Empty claimed address falls back to the peer.
        req.agent_ip = String::new();
        svc.ingest(&req, Some("127.0.0.2")).await.unwrap();
        assert!(matches!(
            svc.ingest(&req, Some("192.168.0.9")).await.unwrap_err(),
            VigilError::Forbidden { .. }
        ));
    }

    #[tokio::test]
    async fn ingest_rejects_missing_payload_field() {
        let svc = service(memory_state());
        let bare = Metric {
            id: "c".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: None,
        };
        let json = serde_json::to_vec(&bare).unwrap();
        let sealed = envelope::seal(&json, None, None).unwrap();
        let req = PushRequest {
            payload: sealed.payload,
            hash: sealed.hash,
            agent_ip: "127.0.0.1".into(),
            encrypted: false,
        };
        assert!(matches!(
            svc.ingest(&req, None).await.unwrap_err(),
            VigilError::MissingPayload { .. }
        ));
    }

    #[tokio::test]
    async fn ingest_round_trips_encrypted_payloads() {
        let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&private);
        let svc = service(memory_state().with_private_key(Some(private)));

        let json = serde_json::to_vec(&Metric::gauge("enc", 2.5)).unwrap();
        let sealed = envelope::seal(&json, Some(&public), None).unwrap();
        let req = PushRequest {
            payload: sealed.payload,
            hash: sealed.hash,
            agent_ip: "127.0.0.1".into(),
            encrypted: sealed.encrypted,
        };
        svc.ingest(&req, None).await.unwrap();

        let (_, value) = svc
            .state
            .storage
            .get_metric(&svc.state.shutdown, "enc", MetricKind::Gauge)
            .await
            .unwrap();
        assert_eq!(value, Some(2.5));
    }

    #[tokio::test]
    async fn encrypted_envelope_without_key_fails() {
        let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&private);
        let svc = service(memory_state());

        let json = serde_json::to_vec(&Metric::gauge("enc", 2.5)).unwrap();
        let sealed = envelope::seal(&json, Some(&public), None).unwrap();
        let req = PushRequest {
            payload: sealed.payload,
            hash: sealed.hash,
            agent_ip: "127.0.0.1".into(),
            encrypted: true,
        };
        assert!(matches!(
            svc.ingest(&req, None).await.unwrap_err(),
            VigilError::MissingPrivateKey
        ));
    }
}
