use super::dto::{
    CapabilityReport, EncoderSettingsResponse, MediaProgressEvent, MediaProgressMessage,
    SweepRequest, SweepResponse,
};
use super::model::MediaStatus;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::config::encoder::EncoderSettingsUpdate;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Get the processing status of an asset
#[utoipa::path(
    get,
    path = "/api/v1/media/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Processing status", body = ApiResponse<MediaStatus>),
        (status = 404, description = "Unknown asset")
    ),
    tag = "Media"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.orchestrator.status(id).await {
        Ok(Some(status)) => ApiSuccess(
            ApiResponse::success(status, "Status retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Ok(None) => ApiError("Asset not found".to_string(), StatusCode::NOT_FOUND).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Fail an owner's jobs that have been PROCESSING for too long
#[utoipa::path(
    post,
    path = "/api/v1/media/sweep",
    request_body = SweepRequest,
    responses(
        (status = 200, description = "Number of jobs reset", body = ApiResponse<SweepResponse>),
        (status = 400, description = "Bad Request")
    ),
    tag = "Media"
)]
pub async fn sweep_stuck_jobs(
    State(state): State<AppState>,
    Json(payload): Json<SweepRequest>,
) -> impl IntoResponse {
    let minutes = payload
        .timeout_minutes
        .unwrap_or(state.config.stuck_job_timeout_minutes);
    if minutes == 0 {
        return ApiError("timeout_minutes must be positive".to_string(), StatusCode::BAD_REQUEST)
            .into_response();
    }

    let timeout = Duration::from_secs(minutes * 60);
    match state.orchestrator.sweep_stuck_jobs(payload.owner_id, timeout).await {
        Ok(reset) => ApiSuccess(
            ApiResponse::success(SweepResponse { reset }, "Sweep finished"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Report the detected encoder, core count and worker pool size
#[utoipa::path(
    get,
    path = "/api/v1/media/capabilities",
    responses(
        (status = 200, description = "Capability report", body = ApiResponse<CapabilityReport>)
    ),
    tag = "Media"
)]
pub async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    ApiSuccess(
        ApiResponse::success(state.orchestrator.capability_report(), "Capabilities retrieved"),
        StatusCode::OK,
    )
}

/// Forget the cached encoder choice and probe again
#[utoipa::path(
    post,
    path = "/api/v1/media/capabilities/refresh",
    responses(
        (status = 200, description = "Fresh capability report", body = ApiResponse<CapabilityReport>)
    ),
    tag = "Media"
)]
pub async fn refresh_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.orchestrator.refresh_capability().await;
    info!(
        "🎛️ Capability refreshed on request: {}",
        report.encoder.as_deref().unwrap_or("none")
    );
    ApiSuccess(
        ApiResponse::success(report, "Capabilities refreshed"),
        StatusCode::OK,
    )
}

/// Current encoder settings
#[utoipa::path(
    get,
    path = "/api/v1/media/settings",
    responses(
        (status = 200, description = "Encoder settings", body = ApiResponse<EncoderSettingsResponse>)
    ),
    tag = "Media"
)]
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    ApiSuccess(
        ApiResponse::success(state.orchestrator.current_settings(), "Settings retrieved"),
        StatusCode::OK,
    )
}

/// Update encoder settings
#[utoipa::path(
    put,
    path = "/api/v1/media/settings",
    request_body = EncoderSettingsUpdate,
    responses(
        (status = 200, description = "Settings updated", body = ApiResponse<EncoderSettingsResponse>),
        (status = 400, description = "Invalid settings")
    ),
    tag = "Media"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<EncoderSettingsUpdate>,
) -> impl IntoResponse {
    match state.orchestrator.update_settings(&payload) {
        Ok(settings) => ApiSuccess(
            ApiResponse::success(settings, "Settings updated successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Live processing updates for every asset of an owner (WebSocket)
#[utoipa::path(
    get,
    path = "/api/v1/media/progress/{owner_id}",
    params(
        ("owner_id" = Uuid, Path, description = "Owner ID")
    ),
    responses(
        (status = 101, description = "Switching to WebSocket; frames are {\"type\":\"media_progress\",\"data\":MediaProgressEvent}")
    ),
    tag = "Media"
)]
pub async fn progress_socket(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let events = state.orchestrator.subscribe(owner_id);
    ws.on_upgrade(move |socket| stream_progress(socket, owner_id, events))
}

async fn stream_progress(
    mut socket: WebSocket,
    owner_id: Uuid,
    mut events: broadcast::Receiver<MediaProgressEvent>,
) {
    debug!("Progress observer connected for {}", owner_id);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&MediaProgressMessage::new(&event)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Could not encode progress event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Observer of {} lagged, {} updates dropped", owner_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Progress observer disconnected for {}", owner_id);
}
