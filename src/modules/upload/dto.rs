use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUploadRequest {
    pub owner_id: Uuid,
    pub filename: String,
    /// Guessed from the filename when omitted.
    pub content_type: Option<String>,
    pub total_chunks: u32,
    /// Media duration in seconds, if the client already knows it.
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadSessionResponse {
    pub upload_id: Uuid,
    pub asset_id: Uuid,
    pub total_chunks: u32,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChunkReceivedResponse {
    pub index: u32,
    pub received: u32,
    pub total: u32,
}
