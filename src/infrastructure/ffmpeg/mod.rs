pub mod probe;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Locations of the ffmpeg/ffprobe binaries used by the pipeline.
#[derive(Clone, Debug)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn ffmpeg(&self) -> Command {
        Self::command(&self.ffmpeg)
    }

    pub fn ffprobe(&self) -> Command {
        Self::command(&self.ffprobe)
    }

    pub fn ffmpeg_name(&self) -> String {
        self.ffmpeg.display().to_string()
    }

    fn command(program: &Path) -> Command {
        let mut cmd = Command::new(program);
        // A dropped future must not leave an orphaned encoder behind.
        cmd.kill_on_drop(true).stdin(Stdio::null());
        cmd
    }
}
