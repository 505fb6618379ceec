use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    MediaDir,
    ThumbnailDir,
    UploadStagingDir,
    FfmpegPath,
    FfprobePath,
    PoolSize,
    Preset,
    Crf,
    StuckJobTimeoutMinutes,
    SweepSchedule,
    UploadSessionTtlSeconds,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::MediaDir => "MEDIA_DIR",
            EnvKey::ThumbnailDir => "THUMBNAIL_DIR",
            EnvKey::UploadStagingDir => "UPLOAD_STAGING_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::PoolSize => "TRANSCODE_POOL_SIZE",
            EnvKey::Preset => "TRANSCODE_PRESET",
            EnvKey::Crf => "TRANSCODE_CRF",
            EnvKey::StuckJobTimeoutMinutes => "STUCK_JOB_TIMEOUT_MINUTES",
            EnvKey::SweepSchedule => "SWEEP_SCHEDULE",
            EnvKey::UploadSessionTtlSeconds => "UPLOAD_SESSION_TTL_SECONDS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
