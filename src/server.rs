//! HTTP surface: the snapshot and refresh endpoints the dashboard consumes,
//! the single-server proxy query, and the operational endpoints.

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::config::HttpConfig;
use crate::error::{Context, Result};
use crate::metrics::{metrics, render, MetricsCollector};
use crate::query::parse_target;
use crate::store::CycleProgress;

pub struct ApiServer {
    listener: TcpListener,
}

impl ApiServer {
    pub async fn build(config: &HttpConfig) -> Result<Self> {
        let address = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {address}"))?;
        tracing::info!(address = address.as_str(), "HTTP listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    pub async fn serve(self, state: AppState, shutdown: CancellationToken) -> Result<()> {
        axum::serve(self.listener, router(state))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("HTTP server terminated abnormally")
    }
}

/// Builds the full route table. Exposed separately so tests can drive the
/// handlers without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_query))
        .route("/api/servers", get(servers_snapshot))
        .route("/api/refresh", post(refresh))
        .route("/api/expand", post(expand))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .layer(middleware::from_fn(allow_any_origin))
        .with_state(state)
}

/// Browsers load the dashboard from a different origin than the API.
async fn allow_any_origin(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    address: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Single-server proxy query. A missing or malformed target is the caller's
/// fault and yields 400; a backend failure is indistinguishable from an
/// offline server and yields the fixed offline shape with 200, so the
/// dashboard never has to special-case upstream trouble.
async fn status_query(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Response {
    let Some(address) = params.address.as_deref() else {
        metrics().inc_proxy_query_rejected();
        return bad_request("missing required parameter `address`");
    };

    let request = match parse_target(address, params.kind.as_deref()) {
        Ok(request) => request,
        Err(err) => {
            metrics().inc_proxy_query_rejected();
            return bad_request(&err.to_string());
        }
    };

    match state.query.query(&request).await {
        Ok(status) => {
            if status.online {
                metrics().inc_proxy_query_ok();
            } else {
                metrics().inc_proxy_query_offline();
            }
            Json(status).into_response()
        }
        Err(err) => {
            tracing::debug!(
                host = request.host.as_str(),
                port = request.port,
                error = %err,
                "proxy query failed"
            );
            metrics().inc_proxy_query_offline();
            Json(crate::query::QueryStatus::offline()).into_response()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

#[derive(Serialize)]
struct ProgressBody {
    generation: u64,
    completed: usize,
    total: usize,
    ratio: f64,
}

impl From<CycleProgress> for ProgressBody {
    fn from(progress: CycleProgress) -> Self {
        Self {
            generation: progress.generation,
            completed: progress.completed,
            total: progress.total,
            ratio: progress.ratio(),
        }
    }
}

/// The latest published snapshot plus cycle liveness, in one payload.
async fn servers_snapshot(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot().await;
    let progress: ProgressBody = state.store.progress().into();
    Json(json!({
        "groups": snapshot.groups,
        "generation": snapshot.generation,
        "completed_at": snapshot.completed_at,
        "refreshing": state.store.is_refreshing(),
        "progress": progress,
    }))
    .into_response()
}

/// Requests an immediate polling cycle. Always 202: if the channel is full a
/// refresh is already queued, which is the same outcome for the caller.
async fn refresh(State(state): State<AppState>) -> Response {
    if let Err(err) = state.refresh.try_send(()) {
        tracing::debug!(error = %err, "refresh already pending");
    }
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
}

#[derive(Debug, Deserialize)]
struct ExpandBody {
    group: String,
    node: String,
    expanded: bool,
}

async fn expand(State(state): State<AppState>, Json(body): Json<ExpandBody>) -> Response {
    if state
        .store
        .set_expanded(&body.group, &body.node, body.expanded)
        .await
    {
        Json(json!({ "updated": true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown group or node" })),
        )
            .into_response()
    }
}

async fn healthz(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "groups": state.catalog.groups.len(),
        "endpoints": state.catalog.endpoint_count(),
    }))
    .into_response()
}

async fn metrics_endpoint() -> Response {
    let mut body = String::new();
    render(&mut body, MetricsCollector::global().snapshot());
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
        .into_response()
}
