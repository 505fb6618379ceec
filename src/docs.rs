use utoipa::OpenApi;
use crate::config::encoder::{EncoderSettingsUpdate, SkipProfile};
use crate::modules::transcode::capability::Capability;
use crate::modules::transcode::dto::*;
use crate::modules::transcode::model::{MediaStatus, ProcessingStatus};
use crate::modules::upload::dto::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::transcode::handler::get_status,
        crate::modules::transcode::handler::sweep_stuck_jobs,
        crate::modules::transcode::handler::get_capabilities,
        crate::modules::transcode::handler::refresh_capabilities,
        crate::modules::transcode::handler::get_settings,
        crate::modules::transcode::handler::update_settings,
        crate::modules::transcode::handler::progress_socket,
        crate::modules::upload::handler::create_upload,
        crate::modules::upload::handler::upload_chunk,
        crate::modules::upload::handler::complete_upload,
    ),
    components(
        schemas(
            MediaStatus, ProcessingStatus, MediaProgressEvent,
            Capability, CapabilityReport,
            SweepRequest, SweepResponse,
            EncoderSettingsResponse, EncoderSettingsUpdate, SkipProfile,
            CreateUploadRequest, UploadSessionResponse, ChunkReceivedResponse,
        )
    ),
    tags(
        (name = "Media", description = "Transcoding status, recovery and encoder settings"),
        (name = "Uploads", description = "Chunked video uploads")
    )
)]
pub struct ApiDoc;
