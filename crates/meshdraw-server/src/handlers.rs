//! HTTP handlers for the meshdraw server.
//!
//! A thin gateway over [`Session`]: each handler performs one session
//! operation and serializes the answer as JSON.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Liveness, participant count, keyword |
//! | GET | `/status` | Full session snapshot |
//! | POST | `/trigger-draw` | Start a draw |
//! | POST | `/reset` | Clear roster and results |
//! | GET | `/stats` | Known nodes and per-sender message counts |
//! | GET | `/health` | Health check |

use crate::config::Config;
use crate::{listener, metrics};
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use meshdraw_core::{DrawOutcome, Session, SessionError, StatusView};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The draw session.
    pub session: Session,
}

/// Build the HTTP router.
///
/// CORS is permissive: the front end is served from a different origin.
pub fn build_router(session: Session) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/status", get(status_handler))
        .route("/trigger-draw", post(trigger_draw_handler))
        .route("/reset", post(reset_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { session })
}

/// Run the HTTP server and the mesh listener.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let session = Session::new(config.session_config());

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let listener_task = listener::spawn(config.ingest.clone(), session.clone());

    let app = build_router(session);

    // Bind and serve
    let addr = config.bind_addr()?;
    let tcp = TcpListener::bind(addr).await?;

    info!("meshdraw server listening on {}", addr);
    info!(keyword = %config.lottery.keyword, "Waiting for registrations");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = listener_task {
        task.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Session errors rendered as client errors.
struct ApiError(SessionError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0 {
            SessionError::AlreadyRunning => (StatusCode::CONFLICT, "already_running"),
            SessionError::NoParticipants => (StatusCode::BAD_REQUEST, "no_participants"),
        };
        (
            status,
            Json(json!({
                "error": self.0.to_string(),
                "code": code,
            })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(flatten)]
    view: StatusView,
}

#[derive(Serialize)]
struct SenderStats {
    id: String,
    name: String,
    messages: u64,
}

/// Liveness handler.
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "message": "meshdraw prize draw server is running",
        "participants": state.session.participant_count(),
        "keyword": state.session.keyword(),
    }))
}

/// Full status handler.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "running",
        view: state.session.status(),
    })
}

/// Draw trigger handler.
async fn trigger_draw_handler(State(state): State<AppState>) -> Response {
    match state.session.trigger_draw() {
        Ok(handle) => {
            metrics::record_draw("started");
            let generation = handle.generation();
            let session = state.session.clone();

            tokio::spawn(async move {
                match handle.wait().await {
                    Ok(DrawOutcome::Published { .. }) => metrics::record_draw("published"),
                    Ok(DrawOutcome::Discarded) => metrics::record_draw("discarded"),
                    Err(e) => error!(generation, error = %e, "Draw task failed"),
                }
                metrics::set_participants(session.participant_count());
            });

            (
                StatusCode::ACCEPTED,
                Json(json!({ "message": "Draw started", "generation": generation })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Draw rejected");
            metrics::record_draw("rejected");
            ApiError(e).into_response()
        }
    }
}

/// Reset handler.
async fn reset_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.session.reset();
    metrics::set_participants(0);
    Json(json!({ "message": "Draw state reset" }))
}

/// Node statistics handler.
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let senders: Vec<SenderStats> = state
        .session
        .message_counts()
        .into_iter()
        .map(|(id, messages)| SenderStats {
            name: state.session.display_name(&id),
            id,
            messages,
        })
        .collect();

    Json(json!({
        "nodes": state.session.node_count(),
        "senders": senders,
    }))
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request as HttpRequest};
    use meshdraw_core::{MeshEvent, SessionConfig};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_session(delay: Duration) -> Session {
        Session::new(SessionConfig {
            draw_delay: delay,
            ..SessionConfig::default()
        })
    }

    async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_index() {
        let session = test_session(Duration::ZERO);
        session.register("!a1");
        let router = build_router(session);

        let (status, json) = send(&router, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "running");
        assert_eq!(json["participants"], 1);
        assert_eq!(json["keyword"], "我要抽奖");
    }

    #[tokio::test]
    async fn test_trigger_without_participants() {
        let router = build_router(test_session(Duration::ZERO));

        let (status, json) = send(&router, "POST", "/trigger-draw").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "no_participants");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_flow() {
        let session = test_session(Duration::from_secs(2));
        session.handle_event(MeshEvent::node_info("!a1", "Alice"));
        for id in ["!a1", "!b2", "!c3"] {
            session.register(id);
        }
        let router = build_router(session.clone());

        let (status, _) = send(&router, "POST", "/trigger-draw").await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, json) = send(&router, "POST", "/trigger-draw").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], "already_running");

        let (_, json) = send(&router, "GET", "/status").await;
        assert_eq!(json["inProgress"], true);
        assert!(json["results"].is_null());

        tokio::time::sleep(Duration::from_secs(3)).await;

        let (status, json) = send(&router, "GET", "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["inProgress"], false);
        assert_eq!(json["participantCount"], 0);
        assert_eq!(json["results"]["一等奖"].as_array().unwrap().len(), 1);
        assert_eq!(json["results"]["二等奖"].as_array().unwrap().len(), 2);
        assert!(json["results"].get("三等奖").is_none());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let session = test_session(Duration::ZERO);
        session.register("!a1");
        let router = build_router(session.clone());

        for _ in 0..2 {
            let (status, _) = send(&router, "POST", "/reset").await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(session.participant_count(), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let session = test_session(Duration::ZERO);
        session.handle_event(MeshEvent::node_info("!a1", "Alice"));
        session.handle_event(MeshEvent::text("!a1", "hello"));
        session.handle_event(MeshEvent::text("!a1", "again"));
        session.handle_event(MeshEvent::text("!b2", "hi"));
        let router = build_router(session);

        let (status, json) = send(&router, "GET", "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["nodes"], 1);
        assert_eq!(json["senders"][0]["id"], "!a1");
        assert_eq!(json["senders"][0]["name"], "Alice");
        assert_eq!(json["senders"][0]["messages"], 2);
        assert_eq!(json["senders"][1]["name"], "!b2");
    }

    #[tokio::test]
    async fn test_cors_headers_and_preflight() {
        let router = build_router(test_session(Duration::ZERO));

        let req = HttpRequest::builder()
            .method("OPTIONS")
            .uri("/trigger-draw")
            .header(header::ORIGIN, "http://frontend.local")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );

        let req = HttpRequest::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://frontend.local")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
