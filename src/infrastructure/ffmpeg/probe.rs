use super::FfmpegTools;
use crate::common::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub profile: Option<String>,
    /// ffprobe reports H.264 levels multiplied by ten (4.0 -> 40).
    pub level: Option<i64>,
    pub pix_fmt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub duration: Option<f64>,
    pub video: Option<VideoStreamInfo>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    profile: Option<String>,
    level: Option<i64>,
    pix_fmt: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Reads container duration and the first video stream's codec parameters.
pub async fn probe_media(tools: &FfmpegTools, path: &Path) -> PipelineResult<MediaProbe> {
    let mut cmd = tools.ffprobe();
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        "-select_streams",
        "v:0",
    ])
    .arg(path)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let output = timeout(PROBE_TIMEOUT, cmd.output())
        .await
        .map_err(|_| PipelineError::Probe(format!("ffprobe timed out on {}", path.display())))?
        .map_err(|e| PipelineError::Spawn {
            tool: tools.ffprobe.display().to_string(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Probe(stderr.trim().to_string()));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(raw: &[u8]) -> PipelineResult<MediaProbe> {
    let parsed: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| PipelineError::Probe(format!("invalid ffprobe json: {}", e)))?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let video = parsed.streams.into_iter().next().and_then(|s| {
        s.codec_name.map(|codec| VideoStreamInfo {
            codec,
            profile: s.profile,
            level: s.level,
            pix_fmt: s.pix_fmt,
        })
    });

    Ok(MediaProbe { duration, video })
}
