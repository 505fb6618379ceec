use anyhow::{anyhow, Context};
use cron::Schedule;
use dotenvy::dotenv;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

use crate::config::encoder::{EncoderSettings, SharedEncoderSettings};
use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::{connect_to_db, ensure_schema};
use crate::infrastructure::ffmpeg::FfmpegTools;
use crate::infrastructure::notify::hub::NotificationHub;
use crate::modules::transcode::capability::CapabilityProber;
use crate::modules::transcode::orchestrator::{recommended_pool_size, Orchestrator, OrchestratorOptions};
use crate::modules::transcode::repository::{MemoryStatusStore, PgStatusStore, StatusStore};
use crate::modules::upload::session::UploadSessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Failed to load configuration")?;
    for dir in [&config.media_dir, &config.thumbnail_dir, &config.upload_staging_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let store: Arc<dyn StatusStore> = match &config.database_url {
        Some(url) => {
            let pool = connect_to_db(url).await?;
            ensure_schema(&pool).await?;
            Arc::new(PgStatusStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL is not set, processing status is kept in memory only");
            Arc::new(MemoryStatusStore::new())
        }
    };

    let settings = SharedEncoderSettings::new(EncoderSettings {
        preset: config.preset.clone(),
        crf: config.crf,
        ..EncoderSettings::default()
    })?;

    let tools = FfmpegTools::new(&config.ffmpeg_path, &config.ffprobe_path);
    let prober = Arc::new(CapabilityProber::new(tools.clone()));
    let pool_size = config
        .pool_size
        .unwrap_or_else(|| recommended_pool_size(num_cpus::get()));

    let orchestrator = Orchestrator::new(
        OrchestratorOptions {
            tools,
            thumbnail_dir: config.thumbnail_dir.clone(),
            pool_size,
        },
        store,
        NotificationHub::default(),
        prober.clone(),
        settings,
    );

    // Warm the capability cache so the first job does not pay for the probe.
    tokio::spawn(async move {
        prober.detect().await;
    });

    let uploads = UploadSessionStore::new(
        &config.upload_staging_dir,
        Duration::from_secs(config.upload_session_ttl_seconds),
    );
    let schedule = Schedule::from_str(&config.sweep_schedule)
        .map_err(|e| anyhow!("Invalid SWEEP_SCHEDULE '{}': {}", config.sweep_schedule, e))?;

    tokio::spawn(workers::transcoder::start_transcoder_worker(orchestrator.clone()));
    tokio::spawn(workers::sweeper::start_sweeper(
        orchestrator.clone(),
        uploads.clone(),
        schedule,
        Duration::from_secs(config.stuck_job_timeout_minutes * 60),
    ));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState::new(config, orchestrator, uploads);
    let app = app::create_app(state).await;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
