use crate::modules::transcode::orchestrator::Orchestrator;
use tracing::{error, info};

/// Pulls queued asset ids and runs each on its own task, never more at once
/// than the orchestrator's pool allows. Returns once the queue is closed and
/// drained.
pub async fn start_transcoder_worker(orchestrator: Orchestrator) {
    info!(
        "🎥 Starting Transcoder Worker ({} concurrent jobs)...",
        orchestrator.pool_size()
    );

    let queue = orchestrator.queue();
    while let Ok(asset_id) = queue.recv().await {
        info!("📦 Received transcoding job {}", asset_id);

        let permit = match orchestrator.acquire_worker().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("❌ Worker pool unavailable: {}", e);
                break;
            }
        };

        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.process(asset_id).await;
            drop(permit);
        });
    }

    info!("🎥 Transcoder Worker stopped");
}
