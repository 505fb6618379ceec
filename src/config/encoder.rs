use crate::infrastructure::ffmpeg::probe::VideoStreamInfo;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use utoipa::ToSchema;

pub const X264_PRESETS: [&str; 9] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

pub const MAX_POOL_SIZE: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("unknown preset '{0}'")]
    InvalidPreset(String),
    #[error("crf must be between 0 and 51, got {0}")]
    InvalidCrf(u8),
    #[error("pool size must be between 1 and {MAX_POOL_SIZE}, got {0}")]
    InvalidPoolSize(usize),
    #[error("invalid skip profile: {0}")]
    InvalidSkipProfile(String),
}

/// Sources matching this profile are already web-deliverable and skip the encode step.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SkipProfile {
    pub enabled: bool,
    pub codec: String,
    pub profiles: Vec<String>,
    /// In ffprobe units, i.e. level 4.0 is 40.
    pub max_level: i64,
}

impl Default for SkipProfile {
    fn default() -> Self {
        Self {
            enabled: true,
            codec: "h264".to_string(),
            profiles: vec!["Main".to_string(), "High".to_string()],
            max_level: 40,
        }
    }
}

impl SkipProfile {
    pub fn matches(&self, video: &VideoStreamInfo) -> bool {
        if !self.enabled || !video.codec.eq_ignore_ascii_case(&self.codec) {
            return false;
        }

        let profile_ok = video.profile.as_deref().is_some_and(|p| {
            self.profiles.iter().any(|allowed| allowed.eq_ignore_ascii_case(p))
        });

        profile_ok && video.level.is_some_and(|l| l > 0 && l <= self.max_level)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.codec.trim().is_empty() {
            return Err(SettingsError::InvalidSkipProfile("codec is empty".into()));
        }
        if self.max_level <= 0 {
            return Err(SettingsError::InvalidSkipProfile(format!(
                "max_level must be positive, got {}",
                self.max_level
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct EncoderSettings {
    pub preset: String,
    pub crf: u8,
    pub skip_reencode: SkipProfile,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: "fast".to_string(),
            crf: 23,
            skip_reencode: SkipProfile::default(),
        }
    }
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !X264_PRESETS.contains(&self.preset.as_str()) {
            return Err(SettingsError::InvalidPreset(self.preset.clone()));
        }
        if self.crf > 51 {
            return Err(SettingsError::InvalidCrf(self.crf));
        }
        self.skip_reencode.validate()
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct EncoderSettingsUpdate {
    pub preset: Option<String>,
    pub crf: Option<u8>,
    pub pool_size: Option<usize>,
    pub skip_reencode: Option<SkipProfile>,
}

impl EncoderSettingsUpdate {
    pub fn validate_pool_size(&self) -> Result<(), SettingsError> {
        match self.pool_size {
            Some(n) if n == 0 || n > MAX_POOL_SIZE => Err(SettingsError::InvalidPoolSize(n)),
            _ => Ok(()),
        }
    }
}

/// Runtime-tunable encoder settings shared by every worker.
#[derive(Clone, Default)]
pub struct SharedEncoderSettings {
    inner: Arc<RwLock<EncoderSettings>>,
}

impl SharedEncoderSettings {
    pub fn new(initial: EncoderSettings) -> Result<Self, SettingsError> {
        initial.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(initial)),
        })
    }

    pub fn snapshot(&self) -> EncoderSettings {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Applies the encoder fields of `update`; nothing changes unless the
    /// resulting settings validate. Pool size is handled by the orchestrator.
    pub fn apply(&self, update: &EncoderSettingsUpdate) -> Result<EncoderSettings, SettingsError> {
        update.validate_pool_size()?;

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.clone();
        if let Some(preset) = &update.preset {
            next.preset = preset.trim().to_lowercase();
        }
        if let Some(crf) = update.crf {
            next.crf = crf;
        }
        if let Some(skip) = &update.skip_reencode {
            next.skip_reencode = skip.clone();
        }
        next.validate()?;

        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec: &str, profile: &str, level: i64) -> VideoStreamInfo {
        VideoStreamInfo {
            codec: codec.to_string(),
            profile: Some(profile.to_string()),
            level: Some(level),
            pix_fmt: Some("yuv420p".to_string()),
        }
    }

    #[test]
    fn default_skip_profile_accepts_web_ready_h264() {
        let skip = SkipProfile::default();
        assert!(skip.matches(&stream("h264", "High", 40)));
        assert!(skip.matches(&stream("h264", "Main", 31)));
        assert!(!skip.matches(&stream("h264", "High", 41)));
        assert!(!skip.matches(&stream("h264", "High 10", 40)));
        assert!(!skip.matches(&stream("hevc", "Main", 40)));
    }

    #[test]
    fn skip_threshold_is_configurable() {
        let skip = SkipProfile {
            max_level: 51,
            ..SkipProfile::default()
        };
        assert!(skip.matches(&stream("h264", "High", 51)));

        let disabled = SkipProfile {
            enabled: false,
            ..SkipProfile::default()
        };
        assert!(!disabled.matches(&stream("h264", "High", 40)));
    }

    #[test]
    fn invalid_update_leaves_settings_untouched() {
        let shared = SharedEncoderSettings::default();
        let err = shared
            .apply(&EncoderSettingsUpdate {
                preset: Some("slow".into()),
                crf: Some(60),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(err, SettingsError::InvalidCrf(60));
        assert_eq!(shared.snapshot(), EncoderSettings::default());
    }

    #[test]
    fn valid_update_is_visible_to_later_snapshots() {
        let shared = SharedEncoderSettings::default();
        let updated = shared
            .apply(&EncoderSettingsUpdate {
                preset: Some("Medium".into()),
                crf: Some(20),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(updated.preset, "medium");
        assert_eq!(shared.snapshot().crf, 20);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let shared = SharedEncoderSettings::default();
        let update = EncoderSettingsUpdate {
            pool_size: Some(0),
            ..Default::default()
        };
        assert_eq!(shared.apply(&update), Err(SettingsError::InvalidPoolSize(0)));
    }
}
