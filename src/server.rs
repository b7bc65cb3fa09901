use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::bridge::{Notification, PanelSnapshot};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::page;
use crate::surface::RenderedSurface;
use crate::transcript::{Transcript, TranscriptEntry};

/// Start the panel server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    info!(
        name: "backend.config.loaded",
        url = %config.backend.url,
        path = %config.backend.path,
        format = config.backend.format.as_str(),
        "Chat backend configured"
    );

    let state = AppState::new(Arc::clone(&config))?;
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the panel router.
pub fn router(state: AppState) -> Router {
    let static_dir = state.config.panel.static_dir.clone();
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/panel", axum::routing::delete(dispose_panel))
        .route("/panel/state", get(panel_state))
        .route("/panel/submit", post(submit))
        .route("/panel/visible", post(panel_visible))
        .route("/panel/alert", post(panel_alert))
        .route("/panel/revive", post(revive_panel))
        .route("/panel/events", get(panel_events))
        .route("/api/notifications", get(list_notifications))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Open or focus the panel and render its page.
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    let panel = state.panels.create_or_show();
    let nonce = page::generate_nonce();
    let frame = panel.render();
    let body = page::panel_page(panel.title(), &nonce, &frame);
    (
        [(
            header::CONTENT_SECURITY_POLICY,
            page::content_security_policy(&nonce),
        )],
        Html(body),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for a submission.
#[derive(Debug, Deserialize)]
struct SubmitRequest {
    /// Raw input text.
    text: String,
}

/// Response to a submission.
#[derive(Debug, Serialize)]
struct SubmitResponse {
    /// False when the surface ignored the input (blank or busy).
    accepted: bool,
}

/// Request body for a view-raised alert.
#[derive(Debug, Deserialize)]
struct AlertRequest {
    text: String,
}

/// Request body for reviving a panel.
#[derive(Debug, Deserialize)]
struct ReviveRequest {
    transcript: Vec<TranscriptEntry>,
}

/// POST /panel/submit - Hand user input to the surface.
async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, String)> {
    let panel = state.panels.current().map_err(error_response)?;
    let accepted = panel.submit(&req.text).map_err(error_response)?;
    tracing::debug!(panel_id = %panel.id(), accepted, "Submission handled");
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { accepted })))
}

/// POST /panel/visible - The view became visible again; push a full frame.
async fn panel_visible(
    State(state): State<AppState>,
) -> Result<Json<RenderedSurface>, (StatusCode, String)> {
    let panel = state.panels.current().map_err(error_response)?;
    panel.refresh().map(Json).map_err(error_response)
}

/// POST /panel/alert - Forward a view-side alert to the host.
async fn panel_alert(
    State(state): State<AppState>,
    Json(req): Json<AlertRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let panel = state.panels.current().map_err(error_response)?;
    panel.alert(&req.text).map_err(error_response)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /panel/revive - Recreate the panel from a saved transcript.
async fn revive_panel(
    State(state): State<AppState>,
    Json(req): Json<ReviveRequest>,
) -> (StatusCode, Json<PanelSnapshot>) {
    let panel = state
        .panels
        .revive(Transcript::from_entries(req.transcript));
    (StatusCode::CREATED, Json(panel.snapshot()))
}

/// GET /panel/state - Snapshot of the live panel.
async fn panel_state(
    State(state): State<AppState>,
) -> Result<Json<PanelSnapshot>, (StatusCode, String)> {
    let panel = state.panels.current().map_err(error_response)?;
    Ok(Json(panel.snapshot()))
}

/// DELETE /panel - Close the panel.
async fn dispose_panel(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state.panels.dispose().map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /panel/events - SSE stream of rendered transcript frames.
async fn panel_events(State(state): State<AppState>) -> Response {
    let subscription = state
        .panels
        .current()
        .and_then(|panel| panel.subscribe());
    let (initial, receiver) = match subscription {
        Ok(subscription) => subscription,
        Err(e) => return error_response(e).into_response(),
    };

    let sse_stream = async_stream::stream! {
        yield Ok::<String, Infallible>(transcript_event(&initial));

        let mut frames = BroadcastStream::new(receiver);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => yield Ok::<String, Infallible>(transcript_event(&frame)),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Viewer lagged, skipping frames");
                }
            }
        }
    };

    let body = axum::body::Body::from_stream(sse_stream);
    build_sse_response(body)
}

/// GET /api/notifications - Recent host-level notifications.
async fn list_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.recent())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn error_response(err: BridgeError) -> (StatusCode, String) {
    let status = match err {
        BridgeError::NoPanel => StatusCode::NOT_FOUND,
        BridgeError::PanelDisposed => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Format a frame as a `transcript` SSE event.
fn transcript_event(frame: &RenderedSurface) -> String {
    let json = serde_json::to_string(frame).unwrap_or_else(|e| {
        serde_json::json!({ "html": "", "busy": false, "error": e.to_string() }).to_string()
    });
    format!("event: transcript\ndata: {json}\n\n")
}

fn build_sse_response(body: axum::body::Body) -> Response {
    (
        [
            ("Content-Type", "text/event-stream"),
            ("Cache-Control", "no-cache"),
            ("Connection", "keep-alive"),
            ("X-Accel-Buffering", "no"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_event_format() {
        let sse = transcript_event(&RenderedSurface {
            html: "<div>hi</div>".to_string(),
            busy: true,
        });
        assert!(sse.starts_with("event: transcript\n"));
        assert!(sse.contains(r#""busy":true"#));
        assert!(sse.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn test_health_and_missing_panel() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let config = AppConfig::load_from_args(["air-chat"]).unwrap();
        let app = router(AppState::new(Arc::new(config)).unwrap());

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let state = app
            .oneshot(Request::get("/panel/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(state.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_response(BridgeError::NoPanel).0, StatusCode::NOT_FOUND);
        assert_eq!(error_response(BridgeError::PanelDisposed).0, StatusCode::GONE);
        assert_eq!(
            error_response(BridgeError::Backend {
                status: 502,
                message: "bad gateway".to_string()
            })
            .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
