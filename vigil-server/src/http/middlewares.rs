//! Envelope middleware: HMAC, RSA, gzip, and request logging.
//!
//! Each layer that rewrites a body buffers it whole; metric payloads are
//! tiny and the buffered form is what the HMAC has to cover anyway.

use crate::http::HASH_HEADER;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use vigil_core::{crypto, envelope};

/// Upper bound on a buffered body; a metrics batch never comes close.
const MAX_BODY: usize = 16 * 1024 * 1024;

pub async fn logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http request"
    );
    response
}

/// Verify the request `HashSHA256` header over the received body bytes and
/// sign the response body on the way out. Inactive without a shared key.
pub async fn hmac(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = state.hash_key.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let received = parts
        .headers
        .get(&HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let req = if let Some(hash) = received {
        let bytes = match to_bytes(body, MAX_BODY).await {
            Ok(bytes) => bytes,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        if envelope::verify_hex(&key, &bytes, &hash).is_err() {
            tracing::warn!("request hash mismatch");
            return StatusCode::BAD_REQUEST.into_response();
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        Request::from_parts(parts, body)
    };

    let response = next.run(req).await;

    // Sign the bytes exactly as they will hit the wire.
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&envelope::sign_hex(&key, &bytes)) {
        parts.headers.insert(HASH_HEADER, value);
    }
    Response::from_parts(parts, Body::from(bytes))
}

/// Unwrap RSA-encrypted request bodies. Active only when a private key is
/// loaded and the agent marked the body as wrapped
/// (`Content-Type: application/octet-stream`).
pub async fn rsa_decrypt(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = &state.private_key else {
        return next.run(req).await;
    };

    let wrapped = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/octet-stream"))
        .unwrap_or(false);
    if !wrapped {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let plain = match crypto::decrypt(key, &bytes) {
        Ok(plain) => plain,
        Err(e) => {
            tracing::warn!(error = %e, "request decryption failed");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

/// Transparent gzip: decode `Content-Encoding: gzip` requests and compress
/// responses for clients that advertise `Accept-Encoding: gzip`.
pub async fn gzip(req: Request, next: Next) -> Response {
    let wants_gzip = req
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|enc| enc.contains("gzip"))
        .unwrap_or(false);

    let compressed_request = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|enc| enc.contains("gzip"))
        .unwrap_or(false);

    let req = if compressed_request {
        let (mut parts, body) = req.into_parts();
        let bytes = match to_bytes(body, MAX_BODY).await {
            Ok(bytes) => bytes,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        let plain = match envelope::decompress(&bytes) {
            Ok(plain) => plain,
            Err(e) => {
                tracing::warn!(error = %e, "request gunzip failed");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };
        parts.headers.remove(header::CONTENT_ENCODING);
        parts.headers.remove(header::CONTENT_LENGTH);
        Request::from_parts(parts, Body::from(plain))
    } else {
        req
    };

    let response = next.run(req).await;
    if !wants_gzip {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    match envelope::compress(&bytes) {
        Ok(packed) => {
            parts.headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(packed))
        }
        Err(e) => {
            tracing::error!(error = %e, "response gzip failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
