use crate::modules::transcode::orchestrator::Orchestrator;
use crate::modules::upload::session::UploadSessionStore;
use chrono::Utc;
use cron::Schedule;
use std::time::Duration;
use tracing::{debug, error, info};

/// On every tick of `schedule`, fails jobs stuck in PROCESSING for longer
/// than `timeout` and evicts idle upload sessions.
pub async fn start_sweeper(
    orchestrator: Orchestrator,
    uploads: UploadSessionStore,
    schedule: Schedule,
    timeout: Duration,
) {
    info!("🧹 Starting sweeper on schedule '{}'", schedule);

    for next in schedule.upcoming(Utc) {
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        match orchestrator.sweep_all(timeout).await {
            Ok(0) => debug!("sweep found no stuck jobs"),
            Ok(reset) => info!("🧹 Sweep reset {} stuck job(s)", reset),
            Err(e) => error!("❌ Stuck-job sweep failed: {}", e),
        }

        uploads.purge_expired().await;
        debug!("{} upload session(s) in flight", uploads.active_sessions());
    }
}
