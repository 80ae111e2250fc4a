//! End-to-end test over a real TCP listener.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chaos_posts::api::build_router;
use chaos_posts::app_state::AppState;
use chaos_posts::middleware::{ChaosSettings, FaultInjector, TRACE_ID_HEADER};
use chaos_posts::persistence::InMemoryPostStore;
use chaos_posts::telemetry::{MemorySink, Tracer};

#[tokio::test]
async fn serves_posts_over_http() {
    let sink = Arc::new(MemorySink::new());
    let state = AppState {
        store: Arc::new(InMemoryPostStore::new(5, Duration::from_secs(1))),
        tracer: Tracer::new("chaos-posts", Arc::clone(&sink) as _),
        fault_injector: Arc::new(FaultInjector::new(ChaosSettings {
            enabled: false,
            ..ChaosSettings::default()
        })),
    };

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local address");
    };
    let server = tokio::spawn(async move { axum::serve(listener, build_router(state)).await });

    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let Ok(response) = client.get(format!("{base}/")).send().await else {
        panic!("ping failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().contains_key(TRACE_ID_HEADER));
    assert!(matches!(response.text().await.as_deref(), Ok("pong")));

    let Ok(response) = client.post(format!("{base}/init")).send().await else {
        panic!("init failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let Ok(response) = client
        .post(format!("{base}/posts"))
        .json(&serde_json::json!({"title": "t", "content": "c", "username": "erin"}))
        .send()
        .await
    else {
        panic!("create failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let Some(location) = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
    else {
        panic!("missing location header");
    };

    let Ok(response) = client.get(format!("{base}{location}")).send().await else {
        panic!("get failed");
    };
    let Ok(rows) = response.json::<serde_json::Value>().await else {
        panic!("body is not JSON");
    };
    assert_eq!(rows[0]["username"], "erin");

    assert_eq!(sink.segments().len(), 4);
    server.abort();
}
