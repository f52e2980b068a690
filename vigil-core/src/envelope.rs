//! The wire envelope discipline shared by both transports.
//!
//! Sealing order on the agent: `metric JSON → gzip (best speed) → [RSA] →
//! HMAC-SHA256 over the final bytes`. The server opens envelopes in the
//! exact inverse order. The HMAC always covers the bytes as they traverse
//! the wire, so an encrypted payload is signed in its encrypted form.

use crate::crypto;
use crate::error::{Result, VigilError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::io::{Read, Write};

type HmacSha256 = Hmac<Sha256>;

/// A sealed payload ready for transmission.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Gzipped JSON, RSA-wrapped when `encrypted` is set.
    pub payload: Vec<u8>,
    /// Lowercase hex HMAC-SHA256 of `payload`; empty without a shared key.
    pub hash: String,
    pub encrypted: bool,
}

/// Seal plaintext bytes for the wire.
pub fn seal(
    plain: &[u8],
    public_key: Option<&RsaPublicKey>,
    hash_key: Option<&str>,
) -> Result<Sealed> {
    let mut payload = compress(plain)?;
    let mut encrypted = false;

    if let Some(key) = public_key {
        payload = crypto::encrypt(key, &payload)?;
        encrypted = true;
    }

    let hash = match hash_key {
        Some(key) => sign_hex(key, &payload),
        None => String::new(),
    };

    Ok(Sealed { payload, hash, encrypted })
}

/// Open a received envelope, returning the plaintext JSON bytes.
///
/// Verification happens in wire order: HMAC over the received bytes, then
/// decryption, then decompression. A payload marked encrypted on a server
/// with no private key is rejected rather than passed through.
pub fn open(
    payload: &[u8],
    hash: &str,
    encrypted: bool,
    private_key: Option<&RsaPrivateKey>,
    hash_key: Option<&str>,
) -> Result<Vec<u8>> {
    if let Some(key) = hash_key {
        if !hash.is_empty() {
            verify_hex(key, payload, hash)?;
        }
    }

    let data = if encrypted {
        match private_key {
            Some(key) => crypto::decrypt(key, payload)?,
            None => return Err(VigilError::MissingPrivateKey),
        }
    } else {
        payload.to_vec()
    };

    decompress(&data)
}

/// Gzip at best-speed; publishing is latency-bound, not bandwidth-bound.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(data)
        .map_err(|e| VigilError::Decompress { reason: e.to_string() })?;
    encoder.finish().map_err(|e| VigilError::Decompress { reason: e.to_string() })
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut plain = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut plain)
        .map_err(|e| VigilError::Decompress { reason: e.to_string() })?;
    Ok(plain)
}

/// Lowercase hex HMAC-SHA256 of `payload` under `key`.
pub fn sign_hex(key: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a received hex digest against the computed
/// HMAC. A digest that does not even parse as hex is a plain mismatch.
pub fn verify_hex(key: &str, payload: &[u8], hash: &str) -> Result<()> {
    let received = hex::decode(hash.trim()).map_err(|_| VigilError::HashMismatch)?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&received).map_err(|_| VigilError::HashMismatch)
}
