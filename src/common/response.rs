use crate::common::error::PipelineError;
use crate::config::encoder::SettingsError;
use crate::modules::upload::session::UploadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            data: None,
        }
    }
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<ApiResponse<T>>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (response, status) = (self.0, self.1);
        (status, Json(response)).into_response()
    }
}

pub struct ApiError(pub String, pub StatusCode);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (message, status) = (self.0, self.1);
        let response = ApiResponse::<()>::error(&message);
        (status, Json(response)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::AlreadyQueued(_) => StatusCode::CONFLICT,
            PipelineError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::MissingSource(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(e.to_string(), status)
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        ApiError(e.to_string(), StatusCode::BAD_REQUEST)
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        let status = match &e {
            UploadError::NotFound(_) => StatusCode::NOT_FOUND,
            UploadError::ChunkOutOfRange { .. } | UploadError::Invalid(_) => StatusCode::BAD_REQUEST,
            UploadError::Incomplete(_) => StatusCode::CONFLICT,
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(e.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn pipeline_errors_map_to_http_statuses() {
        let ApiError(_, status) = PipelineError::AlreadyQueued(Uuid::nil()).into();
        assert_eq!(status, StatusCode::CONFLICT);

        let ApiError(message, status) = PipelineError::Store("connection reset".into()).into();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn upload_errors_map_to_http_statuses() {
        let ApiError(_, status) = UploadError::Incomplete(vec![1]).into();
        assert_eq!(status, StatusCode::CONFLICT);

        let ApiError(_, status) = UploadError::ChunkOutOfRange { index: 5, total: 2 }.into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
