use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::ffmpeg::FfmpegTools;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const SHORT_CLIP_SECONDS: f64 = 15.0;
const EDGE_MARGIN_SECONDS: f64 = 3.0;
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(15);

/// (fraction of the search window, position priority), first third favoured.
const PRIMARY_POSITIONS: [(f64, f64); 4] = [(0.15, 1.0), (0.30, 0.9), (0.45, 0.75), (0.60, 0.6)];
const FALLBACK_POSITIONS: [f64; 3] = [0.25, 0.5, 0.75];

const PRIMARY_FLOOR: f64 = 25.0 / 255.0;
const FALLBACK_FLOOR: f64 = 20.0 / 255.0;
const BRIGHTNESS_WEIGHT: f64 = 0.7;
const POSITION_WEIGHT: f64 = 0.3;

/// Yields a 0-255 brightness proxy for the frame at a timestamp.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    async fn brightness(&self, timestamp: f64) -> Option<u8>;
}

#[derive(Debug, Clone, Copy)]
struct ThumbnailCandidate {
    timestamp: f64,
    priority: f64,
    brightness: f64,
}

impl ThumbnailCandidate {
    fn score(&self) -> f64 {
        BRIGHTNESS_WEIGHT * self.brightness + POSITION_WEIGHT * self.priority
    }
}

/// Picks a representative timestamp away from fades and credits. Always
/// returns a usable value, even when every sample is black or unreadable.
pub async fn select_timestamp(sampler: &dyn FrameSampler, duration: f64) -> f64 {
    if !(duration >= SHORT_CLIP_SECONDS) {
        return (duration * 0.4).max(0.0);
    }

    let start = (duration * 0.10).max(EDGE_MARGIN_SECONDS);
    let end = (duration - EDGE_MARGIN_SECONDS).min(duration * 0.85);
    let span = end - start;

    let mut best: Option<ThumbnailCandidate> = None;
    for (fraction, priority) in PRIMARY_POSITIONS {
        let timestamp = start + span * fraction;
        let candidate = ThumbnailCandidate {
            timestamp,
            priority,
            brightness: sample(sampler, timestamp).await,
        };
        debug!(
            "thumbnail candidate t={:.2}s brightness={:.3} score={:.3}",
            candidate.timestamp,
            candidate.brightness,
            candidate.score()
        );
        if best.is_none_or(|b| candidate.score() > b.score()) {
            best = Some(candidate);
        }
    }

    if let Some(winner) = best.filter(|b| b.brightness >= PRIMARY_FLOOR) {
        return winner.timestamp;
    }

    let mut fallback: Option<(f64, f64)> = None;
    for fraction in FALLBACK_POSITIONS {
        let timestamp = start + span * fraction;
        let brightness = sample(sampler, timestamp).await;
        if brightness >= FALLBACK_FLOOR && fallback.is_none_or(|(_, b)| brightness > b) {
            fallback = Some((timestamp, brightness));
        }
    }

    match fallback {
        Some((timestamp, _)) => timestamp,
        None => start + span / 2.0,
    }
}

async fn sample(sampler: &dyn FrameSampler, timestamp: f64) -> f64 {
    sampler.brightness(timestamp).await.unwrap_or(0) as f64 / 255.0
}

/// Measures the mean luma of the central crop of a frame by letting ffmpeg
/// scale it down to a single grey pixel.
pub struct FfmpegFrameSampler<'a> {
    tools: &'a FfmpegTools,
    source: &'a Path,
}

impl<'a> FfmpegFrameSampler<'a> {
    pub fn new(tools: &'a FfmpegTools, source: &'a Path) -> Self {
        Self { tools, source }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler<'_> {
    async fn brightness(&self, timestamp: f64) -> Option<u8> {
        let mut cmd = self.tools.ffmpeg();
        cmd.args(["-hide_banner", "-loglevel", "error", "-ss"])
            .arg(format!("{:.3}", timestamp))
            .arg("-i")
            .arg(self.source)
            .args([
                "-frames:v",
                "1",
                "-vf",
                "crop=iw/2:ih/2,scale=1:1,format=gray",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        match timeout(SAMPLE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output.stdout.first().copied(),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                debug!("brightness sample at {:.2}s could not run: {}", timestamp, e);
                None
            }
            Err(_) => None,
        }
    }
}

/// Grabs the frame at `timestamp` into `dest` as a JPEG no wider than 640px.
pub async fn capture(
    tools: &FfmpegTools,
    source: &Path,
    timestamp: f64,
    dest: &Path,
) -> PipelineResult<()> {
    let mut cmd = tools.ffmpeg();
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-ss"])
        .arg(format!("{:.3}", timestamp))
        .arg("-i")
        .arg(source)
        .args(["-frames:v", "1", "-vf", "scale='min(640,iw)':-2", "-q:v", "3"])
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = timeout(SAMPLE_TIMEOUT, cmd.output())
        .await
        .map_err(|_| PipelineError::Probe("thumbnail capture timed out".into()))?
        .map_err(|e| PipelineError::Spawn {
            tool: tools.ffmpeg_name(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Probe(format!(
            "thumbnail capture failed: {}",
            stderr.trim()
        )));
    }

    let written = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(PipelineError::Probe("thumbnail capture wrote nothing".into()));
    }
    Ok(())
}
