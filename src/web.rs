use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::view::SharedView;
use crate::watchdog::WatchdogHandle;

pub struct StatusState {
    pub view: SharedView,
    pub watchdog: Option<WatchdogHandle>,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

/// Local control surface for the running page
pub fn create_status_router(state: StatusState) -> Router {
    Router::new()
        .route("/api/view", get(get_view))
        .route("/api/stream/retry", post(retry_stream))
        .route("/api/visibility", post(set_visibility))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn start_status_server(
    port: u16,
    state: StatusState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_status_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Status server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("🔧 Status server stopped");
    Ok(())
}

/// Current page state as rendered
async fn get_view(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let view = state.view.read().await.clone();
    Json(view)
}

fn no_video_panel() -> axum::response::Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": "this page has no video stream" })),
    )
        .into_response()
}

fn watchdog_gone() -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "video watchdog is not running" })),
    )
        .into_response()
}

/// The error panel's Retry button
async fn retry_stream(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let Some(watchdog) = state.watchdog.as_ref() else {
        return no_video_panel();
    };
    info!("🔄 Manual stream retry requested");
    match watchdog.manual_retry().await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "retrying" }))).into_response(),
        Err(_) => watchdog_gone(),
    }
}

async fn set_visibility(
    State(state): State<Arc<StatusState>>,
    Json(request): Json<VisibilityRequest>,
) -> impl IntoResponse {
    let Some(watchdog) = state.watchdog.as_ref() else {
        return no_video_panel();
    };
    info!("👀 Page visibility changed: visible={}", request.visible);
    match watchdog.set_visibility(request.visible).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "visible": request.visible }))).into_response(),
        Err(_) => watchdog_gone(),
    }
}
