//! HTTP transport: router and the envelope middleware stack.
//!
//! Layer order matters and mirrors the wire discipline. From the outside
//! in: request logging → HMAC (verify the bytes exactly as received, sign
//! the bytes exactly as sent) → RSA decrypt → gzip. The innermost layers
//! therefore see plaintext JSON while the HMAC always covers wire bytes.

use crate::state::AppState;
use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;

pub mod handlers;
mod middlewares;

/// Hex HMAC-SHA256 of the body, request and response.
pub const HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");
/// Claimed sender address for trusted-subnet admission.
pub const REAL_IP_HEADER: HeaderName = HeaderName::from_static("x-real-ip");

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/ping", get(handlers::ping))
        .route("/update", post(handlers::update_json))
        .route("/update/", post(handlers::update_json))
        .route("/updates/", post(handlers::update_batch))
        .route("/value", post(handlers::value_json))
        .route("/value/", post(handlers::value_json))
        .route("/value/{kind}/{name}", get(handlers::value_path))
        .route("/update/{kind}/{name}/{value}", post(handlers::update_path))
        .layer(middleware::from_fn(middlewares::gzip))
        .layer(middleware::from_fn_with_state(state.clone(), middlewares::rsa_decrypt))
        .layer(middleware::from_fn_with_state(state.clone(), middlewares::hmac))
        .layer(middleware::from_fn(middlewares::logging))
        .with_state(state)
}
