//! HTTP request handlers.
//!
//! Both JSON update endpoints echo the metric as stored (counters come back
//! as the new running sum), matching what a publisher needs to confirm an
//! update landed.

use crate::http::REAL_IP_HEADER;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use std::sync::Arc;
use vigil_core::{Metric, MetricKind, VigilError};

fn status_for(err: &VigilError) -> StatusCode {
    match err {
        VigilError::NotFound { .. } => StatusCode::NOT_FOUND,
        VigilError::Forbidden { .. } => StatusCode::FORBIDDEN,
        VigilError::MissingPayload { .. }
        | VigilError::EmptyId
        | VigilError::UnknownKind(_)
        | VigilError::Json(_)
        | VigilError::HashMismatch
        | VigilError::Decrypt { .. }
        | VigilError::MissingPrivateKey
        | VigilError::Decompress { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: &VigilError) -> Response {
    (status_for(err), err.to_string()).into_response()
}

/// Trusted-subnet admission over the claimed `X-Real-IP`. Only the
/// ingestion endpoints are gated; reads stay open.
fn admitted(state: &AppState, headers: &HeaderMap) -> bool {
    if state.trusted.is_open() {
        return true;
    }
    let claimed =
        headers.get(&REAL_IP_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    state.trusted.allows(claimed)
}

/// Read a metric back so the response reflects the stored state.
async fn echo_metric(state: &AppState, id: &str, kind: MetricKind) -> Result<Metric, VigilError> {
    let (delta, value) = state.storage.get_metric(&state.shutdown, id, kind).await?;
    Ok(Metric { id: id.to_string(), kind, delta, value })
}

/// POST /update/{kind}/{name}/{value}: plain-text single update.
pub async fn update_path(
    State(state): State<Arc<AppState>>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    let Some(kind) = MetricKind::parse(&kind) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if name.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let (delta, gauge) = match kind {
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(v) => (Some(v), None),
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        },
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(v) => (None, Some(v)),
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        },
    };

    match state.storage.update_metric(&state.shutdown, &name, kind, delta, gauge).await {
        Ok(()) => {
            ([(header::CONTENT_TYPE, "text/plain")], StatusCode::OK).into_response()
        }
        Err(e) => reject(&e),
    }
}

/// POST /update: JSON single update, echoing the stored metric.
pub async fn update_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !admitted(&state, &headers) {
        return (StatusCode::FORBIDDEN, "client ip is forbidden").into_response();
    }

    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    if let Err(e) = metric.validate() {
        return reject(&e);
    }

    if let Err(e) = state
        .storage
        .update_metric(&state.shutdown, &metric.id, metric.kind, metric.delta, metric.value)
        .await
    {
        tracing::warn!(id = %metric.id, kind = %metric.kind, error = %e, "update rejected");
        return reject(&e);
    }

    match echo_metric(&state, &metric.id, metric.kind).await {
        Ok(stored) => Json(stored).into_response(),
        Err(e) => reject(&e),
    }
}

/// POST /updates/: JSON batch update.
///
/// Entries that fail validation are skipped rather than failing the batch;
/// a storage failure is terminal for the request.
pub async fn update_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !admitted(&state, &headers) {
        return (StatusCode::FORBIDDEN, "client ip is forbidden").into_response();
    }

    let entries: Vec<serde_json::Value> = match serde_json::from_slice(&body) {
        Ok(entries) => entries,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let mut stored = Vec::with_capacity(entries.len());
    for entry in entries {
        let Ok(metric) = serde_json::from_value::<Metric>(entry) else { continue };
        if metric.validate().is_err() {
            continue;
        }

        if let Err(e) = state
            .storage
            .update_metric(&state.shutdown, &metric.id, metric.kind, metric.delta, metric.value)
            .await
        {
            tracing::warn!(id = %metric.id, kind = %metric.kind, error = %e, "batch update failed");
            return reject(&e);
        }
        match echo_metric(&state, &metric.id, metric.kind).await {
            Ok(echo) => stored.push(echo),
            Err(e) => return reject(&e),
        }
    }

    Json(stored).into_response()
}

/// POST /value: JSON metric lookup.
pub async fn value_json(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let query: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(query) => query,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let id = query.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let kind = query.get("type").and_then(|v| v.as_str()).unwrap_or_default();
    let Some(kind) = MetricKind::parse(kind) else {
        return (StatusCode::NOT_FOUND, format!("no such metric type for {id}")).into_response();
    };

    match echo_metric(&state, &id, kind).await {
        Ok(metric) => Json(metric).into_response(),
        Err(e) => reject(&e),
    }
}

/// GET /value/{kind}/{name}: textual metric lookup.
pub async fn value_path(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let Some(kind) = MetricKind::parse(&kind) else {
        return (StatusCode::NOT_FOUND, format!("no such metric type for {name}")).into_response();
    };

    match state.storage.get_metric(&state.shutdown, &name, kind).await {
        Ok((Some(delta), _)) => delta.to_string().into_response(),
        Ok((_, Some(value))) => value.to_string().into_response(),
        Ok((None, None)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => reject(&e),
    }
}

/// GET /: HTML dump of everything stored.
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = match state.storage.get_all_metrics(&state.shutdown).await {
        Ok(snapshot) => snapshot,
        Err(e) => return reject(&e),
    };

    let mut counters: Vec<_> = snapshot.counters.iter().collect();
    counters.sort_by(|a, b| a.0.cmp(b.0));
    let mut gauges: Vec<_> = snapshot.gauges.iter().collect();
    gauges.sort_by(|a, b| a.0.cmp(b.0));

    let mut page = String::from("<html><head><title>Metrics</title></head><body>\n");
    page.push_str("<h2>Counters</h2>\n<ul>\n");
    for (id, delta) in counters {
        page.push_str(&format!("<li>{id}: {delta}</li>\n"));
    }
    page.push_str("</ul>\n<h2>Gauges</h2>\n<ul>\n");
    for (id, value) in gauges {
        page.push_str(&format!("<li>{id}: {value}</li>\n"));
    }
    page.push_str("</ul>\n</body></html>\n");

    Html(page).into_response()
}

/// GET /health: liveness, storage not consulted.
pub async fn health() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], r#"{"status":"ok"}"#).into_response()
}

/// GET /ping: storage reachability.
pub async fn ping(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.ping(&state.shutdown).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "storage ping failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
