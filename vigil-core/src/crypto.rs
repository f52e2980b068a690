//! RSA key material: PEM loading and PKCS#1 v1.5 payload wrapping.
//!
//! Keys are loaded once at startup and shared read-only afterwards. A key
//! that fails to load aborts the process; an absent path simply disables
//! encryption for that side.

use crate::error::{Result, VigilError};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::path::Path;

/// Load an RSA public key from a PEM file (PKIX `PUBLIC KEY` or PKCS#1
/// `RSA PUBLIC KEY`).
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| VigilError::Key { path: path.to_path_buf(), reason: e.to_string() })?;

    RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e| VigilError::Key { path: path.to_path_buf(), reason: e.to_string() })
}

/// Load an RSA private key from a PEM file (PKCS#8 `PRIVATE KEY` or PKCS#1
/// `RSA PRIVATE KEY`).
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| VigilError::Key { path: path.to_path_buf(), reason: e.to_string() })?;

    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| VigilError::Key { path: path.to_path_buf(), reason: e.to_string() })
}

pub fn encrypt(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
        .map_err(|e| VigilError::Encrypt { reason: e.to_string() })
}

pub fn decrypt(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, data).map_err(|e| VigilError::Decrypt { reason: e.to_string() })
}
