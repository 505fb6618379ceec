use super::capability::CapabilityProber;
use super::dto::{CapabilityReport, EncoderSettingsResponse, MediaProgressEvent};
use super::model::{ContentKind, MediaStatus, ProgressUpdate, TranscodeJob};
use super::repository::StatusStore;
use super::runner::{EncodeRequest, EncodeRunner};
use super::thumbnail::{self, FfmpegFrameSampler};
use crate::common::error::{PipelineError, PipelineResult};
use crate::config::encoder::{
    EncoderSettingsUpdate, MAX_POOL_SIZE, SettingsError, SharedEncoderSettings, SkipProfile,
};
use crate::infrastructure::ffmpeg::FfmpegTools;
use crate::infrastructure::ffmpeg::probe::{self, MediaProbe};
use crate::infrastructure::notify::hub::NotificationHub;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore, broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Worker count for a host with `cores` logical CPUs.
pub fn recommended_pool_size(cores: usize) -> usize {
    let n = cores.max(1);
    match n {
        1..=4 => n,
        5..=8 => n - 1,
        9..=16 => n / 2,
        _ => (n / 2).min(12),
    }
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub asset_id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub source_path: PathBuf,
    pub content_kind: ContentKind,
    pub duration: Option<f64>,
}

pub struct OrchestratorOptions {
    pub tools: FfmpegTools,
    pub thumbnail_dir: PathBuf,
    pub pool_size: usize,
}

enum PipelineOutcome {
    Encoded { size_bytes: u64 },
    AlreadyWebReady,
}

struct Inner {
    jobs: Mutex<HashMap<Uuid, TranscodeJob>>,
    queue_tx: async_channel::Sender<Uuid>,
    queue_rx: async_channel::Receiver<Uuid>,
    permits: Arc<Semaphore>,
    pool_size: AtomicUsize,
    resizing: Mutex<()>,
    store: Arc<dyn StatusStore>,
    hub: NotificationHub<MediaProgressEvent>,
    prober: Arc<CapabilityProber>,
    runner: EncodeRunner,
    tools: FfmpegTools,
    settings: SharedEncoderSettings,
    thumbnail_dir: PathBuf,
}

/// Owns every live transcode job and drives it through
/// PENDING -> PROCESSING -> COMPLETED | FAILED.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        options: OrchestratorOptions,
        store: Arc<dyn StatusStore>,
        hub: NotificationHub<MediaProgressEvent>,
        prober: Arc<CapabilityProber>,
        settings: SharedEncoderSettings,
    ) -> Self {
        let pool_size = options.pool_size.clamp(1, MAX_POOL_SIZE);
        let (queue_tx, queue_rx) = async_channel::unbounded();

        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                queue_tx,
                queue_rx,
                permits: Arc::new(Semaphore::new(pool_size)),
                pool_size: AtomicUsize::new(pool_size),
                resizing: Mutex::new(()),
                store,
                hub,
                prober,
                runner: EncodeRunner::new(options.tools.clone()),
                tools: options.tools,
                settings,
                thumbnail_dir: options.thumbnail_dir,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, owner_id: Uuid) -> broadcast::Receiver<MediaProgressEvent> {
        self.inner.hub.subscribe(owner_id)
    }

    pub(crate) fn queue(&self) -> async_channel::Receiver<Uuid> {
        self.inner.queue_rx.clone()
    }

    pub(crate) async fn acquire_worker(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.inner.permits.clone().acquire_owned().await
    }

    /// Registers an uploaded asset. Videos are queued as PENDING; anything
    /// else needs no work and is COMPLETED on the spot.
    pub async fn submit(&self, req: SubmitRequest) -> PipelineResult<MediaStatus> {
        let mut job = TranscodeJob::new(
            req.asset_id,
            req.owner_id,
            req.filename,
            req.source_path,
            req.duration,
        );

        if req.content_kind != ContentKind::Video {
            let size = tokio::fs::metadata(&job.source_path).await.ok().map(|m| m.len());
            job.complete(size);
            let status = job.to_status();
            self.record(&status).await?;
            info!("📄 {} ({}) is not a video, marked complete", job.filename, job.asset_id);
            return Ok(status);
        }

        {
            let mut jobs = self.inner.jobs.lock().unwrap_or_else(|e| e.into_inner());
            if jobs.contains_key(&job.asset_id) {
                return Err(PipelineError::AlreadyQueued(job.asset_id));
            }
            jobs.insert(job.asset_id, job.clone());
        }

        let status = job.to_status();
        let queued = match self.record(&status).await {
            Ok(()) => self
                .inner
                .queue_tx
                .send(job.asset_id)
                .await
                .map_err(|_| PipelineError::QueueClosed),
            Err(e) => Err(e),
        };
        if let Err(e) = queued {
            self.retire(job.asset_id);
            return Err(e);
        }

        info!("📥 Queued {} ({}) for transcoding", job.filename, job.asset_id);
        Ok(status)
    }

    /// Runs one queued job to a terminal state. Every failure is contained
    /// here; nothing propagates to the caller.
    pub async fn process(&self, asset_id: Uuid) {
        let Some(job) = self.claim(asset_id) else {
            warn!("Job {} is no longer pending, skipping", asset_id);
            return;
        };
        info!("🎥 Processing {} ({})", job.filename, asset_id);
        self.record_quietly(&job.to_status()).await;

        let output = temp_output_path(&job.source_path, asset_id);
        let filename = job.filename.clone();

        let pipeline = {
            let this = self.clone();
            let output = output.clone();
            tokio::spawn(async move { this.run_pipeline(job, &output).await })
        };
        let outcome = match pipeline.await {
            Ok(outcome) => outcome,
            Err(e) => Err(PipelineError::Aborted(e.to_string())),
        };

        let terminal = self
            .update_job(asset_id, |job| {
                let moved = match &outcome {
                    Ok(PipelineOutcome::Encoded { size_bytes }) => job.complete(Some(*size_bytes)),
                    Ok(PipelineOutcome::AlreadyWebReady) => job.complete(None),
                    Err(_) => job.fail(),
                };
                moved.then(|| job.to_status())
            })
            .flatten();

        match &outcome {
            Ok(_) => info!("✅ {} ({}) is ready", filename, asset_id),
            Err(e) => error!("❌ Transcode of {} ({}) failed: {}", filename, asset_id, e),
        }

        if let Some(status) = terminal {
            if let Err(e) = self.record(&status).await {
                error!("Could not persist final status of {}: {}", asset_id, e);
            }
        }

        remove_if_present(&output).await;
        self.retire(asset_id);
    }

    async fn run_pipeline(&self, job: TranscodeJob, output: &Path) -> PipelineResult<PipelineOutcome> {
        let source = job.source_path.as_path();
        let source_len = tokio::fs::metadata(source).await.map(|m| m.len()).unwrap_or(0);
        if source_len == 0 {
            return Err(PipelineError::MissingSource(source.to_path_buf()));
        }

        let probed = match probe::probe_media(&self.inner.tools, source).await {
            Ok(probed) => Some(probed),
            Err(e) => {
                warn!("ffprobe could not read {}: {}", source.display(), e);
                None
            }
        };

        let duration = job
            .duration
            .or_else(|| probed.as_ref().and_then(|p| p.duration))
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| PipelineError::UnknownDuration(source.to_path_buf()))?;
        self.update_job(job.asset_id, |j| j.duration = Some(duration));

        match self.make_thumbnail(&job, duration).await {
            Ok(path) => {
                let status = self.update_job(job.asset_id, |j| {
                    j.thumbnail_path = Some(path.display().to_string());
                    j.to_status()
                });
                if let Some(status) = status {
                    self.record_quietly(&status).await;
                }
            }
            Err(e) => warn!("Thumbnail for {} skipped: {}", job.asset_id, e),
        }

        let settings = self.inner.settings.snapshot();
        if is_web_ready(probed.as_ref(), &settings.skip_reencode) {
            info!("⏭️ {} is already web-compatible, skipping encode", job.filename);
            return Ok(PipelineOutcome::AlreadyWebReady);
        }

        let capability = self.inner.prober.detect().await;
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(self.clone().forward_progress(job.asset_id, progress_rx));

        let encoded = self
            .inner
            .runner
            .run(
                EncodeRequest {
                    input: source,
                    output,
                    capability,
                    duration,
                    settings: &settings,
                },
                progress_tx,
            )
            .await;

        // The runner has dropped its sender; wait for the last tick to land
        // before the terminal record is written.
        if let Err(e) = forwarder.await {
            warn!("Progress forwarding for {} stopped early: {}", job.asset_id, e);
        }

        let outcome = encoded?;
        Ok(PipelineOutcome::Encoded {
            size_bytes: outcome.size_bytes,
        })
    }

    async fn make_thumbnail(&self, job: &TranscodeJob, duration: f64) -> PipelineResult<PathBuf> {
        tokio::fs::create_dir_all(&self.inner.thumbnail_dir).await?;

        let sampler = FfmpegFrameSampler::new(&self.inner.tools, &job.source_path);
        let timestamp = thumbnail::select_timestamp(&sampler, duration).await;
        let dest = self.inner.thumbnail_dir.join(format!("{}.jpg", job.asset_id));

        thumbnail::capture(&self.inner.tools, &job.source_path, timestamp, &dest).await?;
        info!("🖼️ Thumbnail for {} taken at {:.2}s", job.asset_id, timestamp);
        Ok(dest)
    }

    async fn forward_progress(self, asset_id: Uuid, mut updates: mpsc::UnboundedReceiver<ProgressUpdate>) {
        while let Some(update) = updates.recv().await {
            let status = self
                .update_job(asset_id, |job| job.apply_progress(&update).then(|| job.to_status()))
                .flatten();
            if let Some(status) = status {
                self.record_quietly(&status).await;
            }
        }
    }

    /// Fails every PROCESSING record of `owner_id` that started more than
    /// `timeout` ago. Returns how many were reset; repeating it is a no-op.
    pub async fn sweep_stuck_jobs(&self, owner_id: Uuid, timeout: Duration) -> PipelineResult<usize> {
        self.sweep(Some(owner_id), timeout).await
    }

    pub async fn sweep_all(&self, timeout: Duration) -> PipelineResult<usize> {
        self.sweep(None, timeout).await
    }

    async fn sweep(&self, owner_id: Option<Uuid>, timeout: Duration) -> PipelineResult<usize> {
        let cutoff = OffsetDateTime::now_utc() - timeout;
        let failed = self.inner.store.fail_stuck(owner_id, cutoff).await?;

        for record in &failed {
            // A live job that outlived the timeout must not complete afterwards.
            self.update_job(record.asset_id, |job| job.fail());
            warn!("🧹 Marked stuck job {} ({}) as FAILED", record.filename, record.asset_id);
            self.inner
                .hub
                .publish(record.owner_id, MediaProgressEvent::from(record));
        }
        Ok(failed.len())
    }

    /// Live jobs answer from memory; everything else from the store.
    pub async fn status(&self, asset_id: Uuid) -> PipelineResult<Option<MediaStatus>> {
        if let Some(status) = self.update_job(asset_id, |job| job.to_status()) {
            return Ok(Some(status));
        }
        self.inner.store.load(asset_id).await
    }

    pub fn capability_report(&self) -> CapabilityReport {
        let capability = self.inner.prober.cached();
        CapabilityReport {
            capability,
            encoder: capability.map(|c| c.encoder().to_string()),
            hardware_accelerated: capability.is_some_and(|c| c.is_hardware()),
            cpu_cores: num_cpus::get(),
            pool_size: self.pool_size(),
        }
    }

    pub async fn refresh_capability(&self) -> CapabilityReport {
        self.inner.prober.invalidate();
        self.inner.prober.detect().await;
        self.capability_report()
    }

    pub fn current_settings(&self) -> EncoderSettingsResponse {
        EncoderSettingsResponse::new(self.inner.settings.snapshot(), self.pool_size())
    }

    /// Validates and applies an update; nothing changes if any field is invalid.
    pub fn update_settings(
        &self,
        update: &EncoderSettingsUpdate,
    ) -> Result<EncoderSettingsResponse, SettingsError> {
        let settings = self.inner.settings.apply(update)?;
        if let Some(size) = update.pool_size {
            self.resize_pool(size)?;
        }
        Ok(EncoderSettingsResponse::new(settings, self.pool_size()))
    }

    /// Growing takes effect at once. Shrinking retires idle permits now and
    /// the rest as running jobs finish.
    pub fn resize_pool(&self, size: usize) -> Result<(), SettingsError> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(SettingsError::InvalidPoolSize(size));
        }

        let _guard = self.inner.resizing.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.inner.pool_size.swap(size, Ordering::AcqRel);

        if size > current {
            self.inner.permits.add_permits(size - current);
        } else if size < current {
            let shrink = current - size;
            let remaining = shrink - self.inner.permits.forget_permits(shrink);
            if remaining > 0 {
                let permits = self.inner.permits.clone();
                tokio::spawn(async move {
                    if let Ok(taken) = permits.acquire_many_owned(remaining as u32).await {
                        taken.forget();
                    }
                });
            }
        }

        if size != current {
            info!("🔧 Transcode pool resized from {} to {}", current, size);
        }
        Ok(())
    }

    fn claim(&self, asset_id: Uuid) -> Option<TranscodeJob> {
        self.update_job(asset_id, |job| {
            job.claim(OffsetDateTime::now_utc()).then(|| job.clone())
        })
        .flatten()
    }

    fn update_job<R>(&self, asset_id: Uuid, f: impl FnOnce(&mut TranscodeJob) -> R) -> Option<R> {
        let mut jobs = self.inner.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get_mut(&asset_id).map(f)
    }

    fn retire(&self, asset_id: Uuid) {
        let mut jobs = self.inner.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.remove(&asset_id);
    }

    /// Persists first, then notifies. Notification is best effort.
    async fn record(&self, status: &MediaStatus) -> PipelineResult<()> {
        let saved = self.inner.store.save(status).await;
        self.inner
            .hub
            .publish(status.owner_id, MediaProgressEvent::from(status));
        saved
    }

    async fn record_quietly(&self, status: &MediaStatus) {
        if let Err(e) = self.record(status).await {
            warn!("Could not persist status of {}: {}", status.asset_id, e);
        }
    }
}

fn is_web_ready(probed: Option<&MediaProbe>, skip: &SkipProfile) -> bool {
    probed
        .and_then(|p| p.video.as_ref())
        .is_some_and(|video| skip.matches(video))
}

/// Sibling of the source, so the final rename never crosses filesystems.
fn temp_output_path(source: &Path, asset_id: Uuid) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset".to_string());
    source.with_file_name(format!(".{}.{}.transcode.mp4", stem, asset_id))
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
