use super::capability::Capability;
use super::model::ProgressUpdate;
use super::progress::{self, ProgressSample};
use crate::common::error::{PipelineError, PipelineResult};
use crate::config::encoder::EncoderSettings;
use crate::infrastructure::ffmpeg::FfmpegTools;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::ChildStderr;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tracing::{debug, info, warn};

const TAIL_LINES: usize = 20;
const MAX_LINE_BYTES: usize = 64 * 1024;
const MIN_PERCENT_STEP: f64 = 1.0;
const MAX_SILENCE: Duration = Duration::from_secs(3);

pub struct EncodeRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub capability: Capability,
    pub duration: f64,
    pub settings: &'a EncoderSettings,
}

#[derive(Debug)]
pub struct EncodeOutcome {
    pub size_bytes: u64,
}

#[derive(Clone)]
pub struct EncodeRunner {
    tools: FfmpegTools,
}

impl EncodeRunner {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }

    pub fn build_args(req: &EncodeRequest<'_>) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-stats", "-y"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(req.capability.input_args());
        args.push("-i".into());
        args.push(req.input.display().to_string());
        args.extend(req.capability.video_args(req.settings));
        args.extend(
            ["-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart", "-f", "mp4"]
                .into_iter()
                .map(String::from),
        );
        args.push(req.output.display().to_string());
        args
    }

    /// Runs one encode to completion. Progress ticks go to `progress`; on
    /// success the output atomically replaces the input. The caller removes
    /// `req.output` if anything fails.
    pub async fn run(
        &self,
        req: EncodeRequest<'_>,
        progress: UnboundedSender<ProgressUpdate>,
    ) -> PipelineResult<EncodeOutcome> {
        let started = Instant::now();
        let args = Self::build_args(&req);
        info!(
            "🎬 Encoding {} with {} ({:.1}s of media)",
            req.input.display(),
            req.capability.encoder(),
            req.duration
        );
        debug!("ffmpeg {}", args.join(" "));

        let mut child = self
            .tools
            .ffmpeg()
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::Spawn {
                tool: self.tools.ffmpeg_name(),
                source: e,
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Probe("encoder stderr was not captured".into()))?;

        // Draining stderr while waiting keeps a full pipe from stalling the child.
        let (status, tail) = tokio::join!(
            child.wait(),
            drain_diagnostics(stderr, req.duration, progress)
        );
        let status = status?;

        if !status.success() {
            let tail: Vec<String> = tail.into_iter().collect();
            return Err(PipelineError::EncoderFailed {
                code: status.code(),
                tail: tail.join("\n"),
            });
        }

        let size_bytes = tokio::fs::metadata(req.output).await?.len();
        if size_bytes == 0 {
            return Err(PipelineError::EmptyOutput);
        }

        tokio::fs::rename(req.output, req.input).await?;

        info!(
            "✅ Encoded {} in {:.1}s ({} bytes)",
            req.input.display(),
            started.elapsed().as_secs_f64(),
            size_bytes
        );
        Ok(EncodeOutcome { size_bytes })
    }
}

/// Reads the encoder's stderr to EOF, forwarding throttled progress and
/// keeping the last few lines for error reports.
async fn drain_diagnostics(
    stderr: ChildStderr,
    duration: f64,
    progress: UnboundedSender<ProgressUpdate>,
) -> VecDeque<String> {
    // ffmpeg rewrites its stats line with '\r'.
    let codec = AnyDelimiterCodec::new_with_max_length(b"\r\n".to_vec(), Vec::new(), MAX_LINE_BYTES);
    let mut lines = FramedRead::new(stderr, codec);
    let mut throttle = ProgressThrottle::default();
    let mut tail = VecDeque::with_capacity(TAIL_LINES);

    // After a decode error FramedRead yields one `None` and then resumes
    // reading; the codec discards the rest of the oversized line.
    let mut resuming = false;
    loop {
        let chunk = match lines.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                debug!("skipping encoder output line over {} bytes", MAX_LINE_BYTES);
                resuming = true;
                continue;
            }
            Some(Err(e)) => {
                warn!("encoder stderr became unreadable: {}", e);
                break;
            }
            None if resuming => {
                resuming = false;
                continue;
            }
            None => break,
        };
        resuming = false;

        let line = String::from_utf8_lossy(&chunk);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let sample = progress::parse(line, duration);
        if !sample.is_empty() {
            if let Some(update) = throttle.offer(sample, Instant::now()) {
                if progress.send(update).is_err() {
                    debug!("progress receiver dropped, update discarded");
                }
            }
        }

        if tail.len() == TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }

    tail
}

/// Rate-limits progress: a tick passes when the percentage moved by at least
/// one point or nothing was emitted for three seconds. Emitted percentages
/// never decrease.
#[derive(Debug, Default)]
struct ProgressThrottle {
    last_percent: Option<f64>,
    last_emit: Option<Instant>,
    high_water: f64,
}

impl ProgressThrottle {
    fn offer(&mut self, sample: ProgressSample, now: Instant) -> Option<ProgressUpdate> {
        let percent = sample.percent?.max(self.high_water);
        self.high_water = percent;

        let due = match (self.last_percent, self.last_emit) {
            (Some(last), Some(at)) => {
                percent - last >= MIN_PERCENT_STEP || now.duration_since(at) >= MAX_SILENCE
            }
            _ => true,
        };
        if !due {
            return None;
        }

        self.last_percent = Some(percent);
        self.last_emit = Some(now);
        Some(ProgressUpdate {
            percent,
            eta_seconds: sample.eta_seconds,
            speed: sample.speed,
        })
    }
}
