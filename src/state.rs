use crate::config::settings::AppConfig;
use crate::modules::transcode::orchestrator::Orchestrator;
use crate::modules::upload::session::UploadSessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    pub uploads: UploadSessionStore,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Orchestrator, uploads: UploadSessionStore) -> Self {
        Self {
            config,
            orchestrator,
            uploads,
        }
    }
}
