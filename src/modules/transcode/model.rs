use super::progress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// PENDING -> PROCESSING -> {COMPLETED, FAILED}. A non-video asset goes
    /// straight from PENDING to COMPLETED.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Completed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ProcessingStatus::Pending),
            "PROCESSING" => Ok(ProcessingStatus::Processing),
            "COMPLETED" => Ok(ProcessingStatus::Completed),
            "FAILED" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Video,
    Other,
}

impl ContentKind {
    /// Uses the declared MIME type, falling back to a guess from the filename.
    pub fn detect(content_type: Option<&str>, filename: &str) -> Self {
        let declared = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .filter(|m| *m != mime::APPLICATION_OCTET_STREAM);

        let mime = declared.or_else(|| mime_guess::from_path(filename).first());
        match mime {
            Some(m) if m.type_() == mime::VIDEO => ContentKind::Video,
            _ => ContentKind::Other,
        }
    }
}

/// The persisted per-asset status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaStatus {
    pub asset_id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub status: ProcessingStatus,
    pub progress: f64,
    pub eta_seconds: Option<i64>,
    pub speed: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<OffsetDateTime>,
    pub thumbnail_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub duration: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

/// One throttled progress tick emitted by the encode runner.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub eta_seconds: Option<u64>,
    pub speed: Option<String>,
}

/// A live transcode job, owned by the orchestrator until it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub asset_id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub source_path: PathBuf,
    pub duration: Option<f64>,
    pub status: ProcessingStatus,
    pub progress: f64,
    pub eta_seconds: Option<u64>,
    pub speed: Option<String>,
    pub started_at: Option<OffsetDateTime>,
    pub thumbnail_path: Option<String>,
    pub size_bytes: Option<u64>,
}

impl TranscodeJob {
    pub fn new(
        asset_id: Uuid,
        owner_id: Uuid,
        filename: String,
        source_path: PathBuf,
        duration: Option<f64>,
    ) -> Self {
        Self {
            asset_id,
            owner_id,
            filename,
            source_path,
            duration: duration.filter(|d| d.is_finite() && *d > 0.0),
            status: ProcessingStatus::Pending,
            progress: 0.0,
            eta_seconds: None,
            speed: None,
            started_at: None,
            thumbnail_path: None,
            size_bytes: None,
        }
    }

    pub fn claim(&mut self, now: OffsetDateTime) -> bool {
        if !self.status.can_transition_to(ProcessingStatus::Processing) {
            return false;
        }
        self.status = ProcessingStatus::Processing;
        self.progress = 0.0;
        self.eta_seconds = None;
        self.speed = None;
        self.started_at = Some(now);
        true
    }

    /// Ignores ticks outside PROCESSING; the percentage never moves backwards.
    /// ETA and speed are kept only inside the 5-99% band.
    pub fn apply_progress(&mut self, update: &ProgressUpdate) -> bool {
        if self.status != ProcessingStatus::Processing {
            return false;
        }
        self.progress = self.progress.max(update.percent.clamp(0.0, 100.0));
        if progress::in_eta_band(self.progress) {
            self.eta_seconds = update.eta_seconds;
            self.speed = update.speed.clone();
        } else {
            self.eta_seconds = None;
            self.speed = None;
        }
        true
    }

    pub fn complete(&mut self, size_bytes: Option<u64>) -> bool {
        if !self.status.can_transition_to(ProcessingStatus::Completed) {
            return false;
        }
        self.status = ProcessingStatus::Completed;
        self.progress = 100.0;
        self.eta_seconds = None;
        self.speed = None;
        if size_bytes.is_some() {
            self.size_bytes = size_bytes;
        }
        true
    }

    /// Progress stays frozen at its last observed value.
    pub fn fail(&mut self) -> bool {
        if !self.status.can_transition_to(ProcessingStatus::Failed) {
            return false;
        }
        self.status = ProcessingStatus::Failed;
        self.eta_seconds = None;
        self.speed = None;
        true
    }

    pub fn to_status(&self) -> MediaStatus {
        MediaStatus {
            asset_id: self.asset_id,
            owner_id: self.owner_id,
            filename: self.filename.clone(),
            status: self.status,
            progress: self.progress,
            eta_seconds: self.eta_seconds.map(|e| e as i64),
            speed: self.speed.clone(),
            started_at: self.started_at,
            thumbnail_path: self.thumbnail_path.clone(),
            size_bytes: self.size_bytes.map(|s| s as i64),
            duration: self.duration,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}
