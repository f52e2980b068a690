//! File-backend persistence across a simulated server restart.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use vigil_server::http::router;
use vigil_server::storage::{FileStorage, Storage};
use vigil_server::AppState;

#[tokio::test]
async fn snapshot_survives_restart_with_restore() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let shutdown = CancellationToken::new();

    // First server: ingest 5 counters and 5 gauges over HTTP.
    {
        let storage = Arc::new(FileStorage::open(&path, true).await.unwrap());
        let app = router(Arc::new(AppState::new(storage, shutdown.clone())));

        for i in 0..5 {
            let counter = format!(r#"{{"id":"c{i}","type":"counter","delta":{i}}}"#);
            let gauge = format!(r#"{{"id":"g{i}","type":"gauge","value":{i}.5}}"#);
            for body in [counter, gauge] {
                let response = app
                    .clone()
                    .oneshot(
                        Request::builder()
                            .method("POST")
                            .uri("/update")
                            .header("content-type", "application/json")
                            .body(Body::from(body))
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            }
        }
    }

    // Second server on the same path with restore enabled sees all ten.
    let restored = FileStorage::open(&path, true).await.unwrap();
    let snapshot = restored.get_all_metrics(&shutdown).await.unwrap();
    assert_eq!(snapshot.counters.len(), 5);
    assert_eq!(snapshot.gauges.len(), 5);
    for i in 0..5i64 {
        assert_eq!(snapshot.counters[&format!("c{i}")], i);
        assert_eq!(snapshot.gauges[&format!("g{i}")], i as f64 + 0.5);
    }
}
