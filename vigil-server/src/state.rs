//! Shared request-handling context for both transports.

use crate::storage::SharedStorage;
use rsa::RsaPrivateKey;
use tokio_util::sync::CancellationToken;
use vigil_core::TrustedSubnet;

/// Everything a request handler needs: the storage backend, the shutdown
/// token, and the envelope verification material. Key material is immutable
/// after startup and shared read-only.
pub struct AppState {
    pub storage: SharedStorage,
    pub shutdown: CancellationToken,
    pub hash_key: Option<String>,
    pub private_key: Option<RsaPrivateKey>,
    pub trusted: TrustedSubnet,
}

impl AppState {
    pub fn new(storage: SharedStorage, shutdown: CancellationToken) -> Self {
        Self { storage, shutdown, hash_key: None, private_key: None, trusted: TrustedSubnet::default() }
    }

    pub fn with_hash_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() {
            self.hash_key = Some(key);
        }
        self
    }

    pub fn with_private_key(mut self, key: Option<RsaPrivateKey>) -> Self {
        self.private_key = key;
        self
    }

    pub fn with_trusted_subnet(mut self, trusted: TrustedSubnet) -> Self {
        self.trusted = trusted;
        self
    }
}
