use super::dto::{ChunkReceivedResponse, CreateUploadRequest, UploadSessionResponse};
use super::session::NewUpload;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::modules::transcode::model::{ContentKind, MediaStatus};
use crate::modules::transcode::orchestrator::SubmitRequest;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::error;
use uuid::Uuid;

/// Open a chunked upload session
#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    request_body = CreateUploadRequest,
    responses(
        (status = 201, description = "Upload session opened", body = ApiResponse<UploadSessionResponse>),
        (status = 400, description = "Bad Request")
    ),
    tag = "Uploads"
)]
pub async fn create_upload(
    State(state): State<AppState>,
    Json(payload): Json<CreateUploadRequest>,
) -> impl IntoResponse {
    let total_chunks = payload.total_chunks;
    let opened = state
        .uploads
        .open(NewUpload {
            owner_id: payload.owner_id,
            filename: payload.filename,
            content_type: payload.content_type,
            duration: payload.duration,
            total_chunks,
        })
        .await;

    match opened {
        Ok(opened) => ApiSuccess(
            ApiResponse::success(
                UploadSessionResponse {
                    upload_id: opened.upload_id,
                    asset_id: opened.asset_id,
                    total_chunks,
                    expires_in_seconds: state.uploads.ttl().as_secs(),
                },
                "Upload session created",
            ),
            StatusCode::CREATED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Upload one chunk (raw body)
#[utoipa::path(
    put,
    path = "/api/v1/uploads/{id}/chunks/{index}",
    params(
        ("id" = Uuid, Path, description = "Upload session ID"),
        ("index" = u32, Path, description = "Zero-based chunk index")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk stored", body = ApiResponse<ChunkReceivedResponse>),
        (status = 400, description = "Chunk index out of range"),
        (status = 404, description = "Unknown or expired session")
    ),
    tag = "Uploads"
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, u32)>,
    body: Bytes,
) -> impl IntoResponse {
    match state.uploads.write_chunk(id, index, &body).await {
        Ok(progress) => ApiSuccess(
            ApiResponse::success(
                ChunkReceivedResponse {
                    index,
                    received: progress.received,
                    total: progress.total,
                },
                "Chunk received",
            ),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Assemble the uploaded chunks and hand the asset to the transcoder
#[utoipa::path(
    post,
    path = "/api/v1/uploads/{id}/complete",
    params(
        ("id" = Uuid, Path, description = "Upload session ID")
    ),
    responses(
        (status = 202, description = "Asset accepted for processing", body = ApiResponse<MediaStatus>),
        (status = 404, description = "Unknown or expired session"),
        (status = 409, description = "Chunks are missing")
    ),
    tag = "Uploads"
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let upload = match state.uploads.assemble(id, &state.config.media_dir).await {
        Ok(upload) => upload,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let request = SubmitRequest {
        asset_id: upload.asset_id,
        owner_id: upload.owner_id,
        content_kind: ContentKind::detect(upload.content_type.as_deref(), &upload.filename),
        filename: upload.filename,
        source_path: upload.path,
        duration: upload.duration,
    };

    match state.orchestrator.submit(request).await {
        Ok(status) => ApiSuccess(
            ApiResponse::success(status, "Upload complete, processing started"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => {
            error!("❌ Could not submit asset {}: {}", upload.asset_id, e);
            ApiError::from(e).into_response()
        }
    }
}
