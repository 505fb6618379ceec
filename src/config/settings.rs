use serde::Deserialize;
use std::path::PathBuf;
use crate::config::env::{self, EnvKey};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    /// Without a database the status records live in memory only.
    pub database_url: Option<String>,
    pub media_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub upload_staging_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Overrides the pool size derived from the core count.
    pub pool_size: Option<usize>,
    pub preset: String,
    pub crf: u8,
    pub stuck_job_timeout_minutes: u64,
    pub sweep_schedule: String,
    pub upload_session_ttl_seconds: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        let media_dir = PathBuf::from(env::get_or(EnvKey::MediaDir, "./media_files"));
        let thumbnail_dir = env::get_opt(EnvKey::ThumbnailDir)
            .map(PathBuf::from)
            .unwrap_or_else(|| media_dir.join("thumbnails"));
        let upload_staging_dir = env::get_opt(EnvKey::UploadStagingDir)
            .map(PathBuf::from)
            .unwrap_or_else(|| media_dir.join(".uploads"));

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get_opt(EnvKey::DatabaseUrl),
            media_dir,
            thumbnail_dir,
            upload_staging_dir,
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            pool_size: env::get_opt(EnvKey::PoolSize)
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0),
            preset: env::get_or(EnvKey::Preset, "fast"),
            crf: env::get_parsed(EnvKey::Crf, 23),
            stuck_job_timeout_minutes: env::get_parsed(EnvKey::StuckJobTimeoutMinutes, 30),
            // sec min hour day-of-month month day-of-week
            sweep_schedule: env::get_or(EnvKey::SweepSchedule, "0 */5 * * * *"),
            upload_session_ttl_seconds: env::get_parsed(EnvKey::UploadSessionTtlSeconds, 3600),
        })
    }
}
