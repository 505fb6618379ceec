use crate::config::encoder::EncoderSettings;
use crate::infrastructure::ffmpeg::FfmpegTools;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

const TRIAL_TIMEOUT: Duration = Duration::from_secs(10);
const VAAPI_DEVICE: &str = "/dev/dri/renderD128";
const UNPROBED: u8 = 0;

/// The encoding path selected for this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Cpu,
    Nvenc,
    Qsv,
    Vaapi,
    VideoToolbox,
}

impl Capability {
    /// Hardware paths in the order they are tried.
    pub fn hardware_candidates() -> Vec<Capability> {
        let mut candidates = vec![Capability::Nvenc, Capability::Qsv];
        if cfg!(target_os = "linux") {
            candidates.push(Capability::Vaapi);
        }
        if cfg!(target_os = "macos") {
            candidates.push(Capability::VideoToolbox);
        }
        candidates
    }

    pub fn encoder(&self) -> &'static str {
        match self {
            Capability::Cpu => "libx264",
            Capability::Nvenc => "h264_nvenc",
            Capability::Qsv => "h264_qsv",
            Capability::Vaapi => "h264_vaapi",
            Capability::VideoToolbox => "h264_videotoolbox",
        }
    }

    pub fn is_hardware(&self) -> bool {
        *self != Capability::Cpu
    }

    /// Arguments that must precede `-i`.
    pub fn input_args(&self) -> Vec<String> {
        match self {
            Capability::Vaapi => vec!["-vaapi_device".into(), VAAPI_DEVICE.into()],
            _ => Vec::new(),
        }
    }

    /// Video encoding arguments producing web-compatible H.264.
    pub fn video_args(&self, settings: &EncoderSettings) -> Vec<String> {
        let quality = settings.crf.to_string();
        let args: Vec<&str> = match self {
            Capability::Cpu => vec![
                "-c:v", "libx264",
                "-preset", settings.preset.as_str(),
                "-crf", quality.as_str(),
                "-profile:v", "high",
                "-level:v", "4.0",
                "-pix_fmt", "yuv420p",
            ],
            Capability::Nvenc => vec![
                "-c:v", "h264_nvenc",
                "-preset", "p4",
                "-rc", "vbr",
                "-cq", quality.as_str(),
                "-profile:v", "high",
                "-pix_fmt", "yuv420p",
            ],
            Capability::Qsv => vec![
                "-c:v", "h264_qsv",
                "-preset", "medium",
                "-global_quality", quality.as_str(),
                "-profile:v", "high",
            ],
            Capability::Vaapi => vec![
                "-vf", "format=nv12,hwupload",
                "-c:v", "h264_vaapi",
                "-qp", quality.as_str(),
                "-profile:v", "high",
            ],
            Capability::VideoToolbox => vec![
                "-c:v", "h264_videotoolbox",
                "-q:v", "60",
                "-profile:v", "high",
                "-pix_fmt", "yuv420p",
            ],
        };
        args.into_iter().map(String::from).collect()
    }

    fn code(&self) -> u8 {
        match self {
            Capability::Cpu => 1,
            Capability::Nvenc => 2,
            Capability::Qsv => 3,
            Capability::Vaapi => 4,
            Capability::VideoToolbox => 5,
        }
    }

    fn from_code(code: u8) -> Option<Capability> {
        match code {
            1 => Some(Capability::Cpu),
            2 => Some(Capability::Nvenc),
            3 => Some(Capability::Qsv),
            4 => Some(Capability::Vaapi),
            5 => Some(Capability::VideoToolbox),
            _ => None,
        }
    }
}

/// Detects the best available encoder once and caches the answer. Readers of
/// the cache never lock; only a probe in progress holds the mutex.
pub struct CapabilityProber {
    tools: FfmpegTools,
    cached: AtomicU8,
    probing: Mutex<()>,
}

impl CapabilityProber {
    pub fn new(tools: FfmpegTools) -> Self {
        Self {
            tools,
            cached: AtomicU8::new(UNPROBED),
            probing: Mutex::new(()),
        }
    }

    pub fn cached(&self) -> Option<Capability> {
        Capability::from_code(self.cached.load(Ordering::Acquire))
    }

    pub async fn detect(&self) -> Capability {
        if let Some(capability) = self.cached() {
            return capability;
        }

        let _guard = self.probing.lock().await;
        if let Some(capability) = self.cached() {
            return capability;
        }

        let picked = self.run_trials().await;
        self.cached.store(picked.code(), Ordering::Release);
        info!("🎛️ Encoder capability: {:?} ({})", picked, picked.encoder());
        picked
    }

    pub fn invalidate(&self) {
        self.cached.store(UNPROBED, Ordering::Release);
        info!("Encoder capability cache invalidated");
    }

    async fn run_trials(&self) -> Capability {
        for candidate in Capability::hardware_candidates() {
            if self.trial(candidate).await {
                return candidate;
            }
        }
        Capability::Cpu
    }

    /// Encodes a one-second synthetic pattern through `candidate`.
    async fn trial(&self, candidate: Capability) -> bool {
        let mut cmd = self.tools.ffmpeg();
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(candidate.input_args())
            .args(["-f", "lavfi", "-i", "testsrc=duration=1:size=320x240:rate=25"]);
        if candidate == Capability::Vaapi {
            cmd.args(["-vf", "format=nv12,hwupload"]);
        }
        cmd.args(["-c:v", candidate.encoder(), "-frames:v", "25", "-f", "null", "-"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        match timeout(TRIAL_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => true,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!(
                    "{} trial failed: {}",
                    candidate.encoder(),
                    stderr.lines().last().unwrap_or("no output")
                );
                false
            }
            Ok(Err(e)) => {
                warn!("Could not run {} for {} trial: {}", self.tools.ffmpeg_name(), candidate.encoder(), e);
                false
            }
            Err(_) => {
                warn!("{} trial timed out after {:?}", candidate.encoder(), TRIAL_TIMEOUT);
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::modules::transcode::testutil::write_script;

    fn counting_ffmpeg(dir: &std::path::Path, succeed_on: Option<&str>) -> FfmpegTools {
        let log = dir.join("calls.log");
        let accept = succeed_on
            .map(|enc| format!("case \"$*\" in *{enc}*) exit 0 ;; esac\n"))
            .unwrap_or_default();
        let script = format!(
            "echo \"$*\" >> '{}'\n{}echo 'No such device' >&2\nexit 1\n",
            log.display(),
            accept
        );
        let ffmpeg = write_script(dir, "ffmpeg", &script);
        FfmpegTools::new(ffmpeg, "ffprobe")
    }

    fn calls(dir: &std::path::Path) -> usize {
        std::fs::read_to_string(dir.join("calls.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn falls_back_to_cpu_when_every_trial_fails() {
        let dir = tempfile::tempdir().unwrap();
        let prober = CapabilityProber::new(counting_ffmpeg(dir.path(), None));

        assert_eq!(prober.detect().await, Capability::Cpu);
        assert_eq!(calls(dir.path()), Capability::hardware_candidates().len());
    }

    #[tokio::test]
    async fn picks_the_first_working_hardware_path() {
        let dir = tempfile::tempdir().unwrap();
        let prober = CapabilityProber::new(counting_ffmpeg(dir.path(), Some("h264_qsv")));

        assert_eq!(prober.detect().await, Capability::Qsv);
        // nvenc, then qsv; later candidates are never tried.
        assert_eq!(calls(dir.path()), 2);
    }

    #[tokio::test]
    async fn second_detect_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let prober = CapabilityProber::new(counting_ffmpeg(dir.path(), None));

        let first = prober.detect().await;
        let after_first = calls(dir.path());
        let second = prober.detect().await;

        assert_eq!(first, second);
        assert_eq!(calls(dir.path()), after_first);
        assert_eq!(prober.cached(), Some(first));
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_probe() {
        let dir = tempfile::tempdir().unwrap();
        let prober = CapabilityProber::new(counting_ffmpeg(dir.path(), None));

        prober.detect().await;
        let after_first = calls(dir.path());
        prober.invalidate();
        assert_eq!(prober.cached(), None);
        prober.detect().await;

        assert_eq!(calls(dir.path()), after_first * 2);
    }

    #[tokio::test]
    async fn missing_binary_is_not_an_error() {
        let prober = CapabilityProber::new(FfmpegTools::new("/nonexistent/ffmpeg", "ffprobe"));
        assert_eq!(prober.detect().await, Capability::Cpu);
    }

    #[test]
    fn cpu_arguments_follow_settings() {
        let settings = EncoderSettings {
            preset: "slow".into(),
            crf: 20,
            ..EncoderSettings::default()
        };
        let args = Capability::Cpu.video_args(&settings);
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset slow"));
        assert!(joined.contains("-crf 20"));
        assert!(Capability::Cpu.input_args().is_empty());
        assert_eq!(Capability::Vaapi.input_args()[0], "-vaapi_device");
    }
}
