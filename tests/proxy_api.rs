//! HTTP surface tests driven through the router without a bound socket.

use async_trait::async_trait;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use beacon::app_state::AppState;
use beacon::catalog::Catalog;
use beacon::config::ServersDocument;
use beacon::domain::Snapshot;
use beacon::error::Result;
use beacon::query::{QueryBackend, QueryPlayers, QueryRequest, QueryStatus, QueryVersion};
use beacon::server::router;
use beacon::store::StatusStore;

struct ScriptedBackend {
    response: Option<QueryStatus>,
}

#[async_trait]
impl QueryBackend for ScriptedBackend {
    async fn query(&self, _request: &QueryRequest) -> Result<QueryStatus> {
        match &self.response {
            Some(status) => Ok(status.clone()),
            None => Err(beacon::err!("scripted backend failure")),
        }
    }
}

fn online_status() -> QueryStatus {
    QueryStatus {
        online: true,
        description: Some("A test server".to_string()),
        favicon: None,
        latency: 42,
        players: QueryPlayers {
            max: 64,
            online: 4,
            sample: vec!["steve".to_string()],
        },
        version: QueryVersion {
            name: "1.20.4".to_string(),
            protocol: 765,
        },
    }
}

fn state(backend: ScriptedBackend) -> (AppState, mpsc::Receiver<()>) {
    let doc: ServersDocument = serde_json::from_str(
        r#"{ "MCServerList": [ { "name": "Alpha", "servers": [
            { "name": "N1", "address": "a.example.com", "port-java": 25565 } ] } ] }"#,
    )
    .unwrap();
    let catalog = Arc::new(Catalog::from_document(&doc).unwrap());
    let store = StatusStore::new(Snapshot::initial(&catalog));
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    (
        AppState {
            catalog,
            store,
            refresh: refresh_tx,
            query: Arc::new(backend),
        },
        refresh_rx,
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_requires_an_address() {
    let (state, _rx) = state(ScriptedBackend {
        response: Some(online_status()),
    });
    let response = router(state)
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("address"));
}

#[tokio::test]
async fn status_rejects_a_malformed_port() {
    let (state, _rx) = state(ScriptedBackend {
        response: Some(online_status()),
    });
    let response = router(state)
        .oneshot(
            Request::get("/api/status?address=host:notaport")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_returns_the_backend_answer() {
    let (state, _rx) = state(ScriptedBackend {
        response: Some(online_status()),
    });
    let response = router(state)
        .oneshot(
            Request::get("/api/status?address=play.example.com&type=java")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["online"], Value::Bool(true));
    assert_eq!(body["latency"], 42);
    assert_eq!(body["players"]["online"], 4);
    assert_eq!(body["version"]["name"], "1.20.4");
}

#[tokio::test]
async fn backend_failure_degrades_to_the_offline_shape() {
    let (state, _rx) = state(ScriptedBackend { response: None });
    let response = router(state)
        .oneshot(
            Request::get("/api/status?address=play.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["online"], Value::Bool(false));
    assert_eq!(body["latency"], -1);
    assert_eq!(body["version"]["name"], "N/A");
    assert_eq!(body["version"]["protocol"], -1);
    assert!(body["players"]["sample"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn servers_returns_the_snapshot_with_liveness() {
    let (state, _rx) = state(ScriptedBackend { response: None });
    let response = router(state)
        .oneshot(Request::get("/api/servers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["refreshing"], Value::Bool(false));
    assert_eq!(body["generation"], 0);
    assert_eq!(body["groups"][0]["name"], "Alpha");
    assert_eq!(body["groups"][0]["state"], "testing");
    assert_eq!(body["groups"][0]["nodes"][0]["best_latency"], -1);
}

#[tokio::test]
async fn refresh_is_accepted_and_forwarded() {
    let (state, mut rx) = state(ScriptedBackend { response: None });
    let response = router(state)
        .oneshot(Request::post("/api/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn refresh_is_still_accepted_when_one_is_pending() {
    let (state, _rx) = state(ScriptedBackend { response: None });
    let app = router(state);
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(Request::post("/api/refresh").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}

#[tokio::test]
async fn expand_toggles_a_known_node_and_404s_otherwise() {
    let (state, _rx) = state(ScriptedBackend { response: None });
    let store = state.store.clone();
    let app = router(state);

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/expand")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{ "group": "Alpha", "node": "N1", "expanded": true }"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.snapshot().await.groups[0].nodes[0].is_expanded);

    let response = app
        .oneshot(
            Request::post("/api/expand")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{ "group": "Alpha", "node": "missing", "expanded": true }"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn operational_endpoints_respond() {
    let (state, _rx) = state(ScriptedBackend { response: None });
    let app = router(state);

    let health = app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body = body_json(health).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["groups"], 1);
    assert_eq!(body["endpoints"], 1);

    let metrics = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let content_type = metrics.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
    let bytes = metrics.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("beacon_cycles_total"));
}

#[tokio::test]
async fn api_responses_allow_any_origin() {
    let (state, _rx) = state(ScriptedBackend { response: None });
    let response = router(state)
        .oneshot(Request::get("/api/servers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
