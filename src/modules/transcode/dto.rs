use super::capability::Capability;
use super::model::{MediaStatus, ProcessingStatus};
use crate::config::encoder::{EncoderSettings, SkipProfile};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MEDIA_PROGRESS_TYPE: &str = "media_progress";

/// The payload pushed to an owner's live observers on every status change.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MediaProgressEvent {
    pub asset_id: Uuid,
    pub filename: String,
    pub status: ProcessingStatus,
    pub progress: f64,
    pub eta_seconds: Option<i64>,
    pub speed: Option<String>,
}

impl From<&MediaStatus> for MediaProgressEvent {
    fn from(s: &MediaStatus) -> Self {
        Self {
            asset_id: s.asset_id,
            filename: s.filename.clone(),
            status: s.status,
            progress: s.progress,
            eta_seconds: s.eta_seconds,
            speed: s.speed.clone(),
        }
    }
}

/// WebSocket frame: `{"type": "media_progress", "data": {...}}`.
#[derive(Debug, Serialize)]
pub struct MediaProgressMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: &'a MediaProgressEvent,
}

impl<'a> MediaProgressMessage<'a> {
    pub fn new(data: &'a MediaProgressEvent) -> Self {
        Self {
            kind: MEDIA_PROGRESS_TYPE,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CapabilityReport {
    /// `None` until the first detection has finished.
    pub capability: Option<Capability>,
    pub encoder: Option<String>,
    pub hardware_accelerated: bool,
    pub cpu_cores: usize,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SweepRequest {
    pub owner_id: Uuid,
    /// Defaults to the configured stuck-job timeout.
    pub timeout_minutes: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResponse {
    pub reset: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EncoderSettingsResponse {
    pub preset: String,
    pub crf: u8,
    pub pool_size: usize,
    pub skip_reencode: SkipProfile,
}

impl EncoderSettingsResponse {
    pub fn new(settings: EncoderSettings, pool_size: usize) -> Self {
        Self {
            preset: settings.preset,
            crf: settings.crf,
            pool_size,
            skip_reencode: settings.skip_reencode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_frame_matches_the_client_contract() {
        let event = MediaProgressEvent {
            asset_id: Uuid::nil(),
            filename: "menu-board.mp4".into(),
            status: ProcessingStatus::Processing,
            progress: 37.5,
            eta_seconds: Some(12),
            speed: Some("2.1x".into()),
        };

        let json = serde_json::to_value(MediaProgressMessage::new(&event)).unwrap();
        assert_eq!(json["type"], "media_progress");
        assert_eq!(json["data"]["status"], "PROCESSING");
        assert_eq!(json["data"]["progress"], 37.5);
        assert_eq!(json["data"]["speed"], "2.1x");
        assert_eq!(json["data"]["filename"], "menu-board.mp4");
    }
}
