use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source file is missing or empty: {0}")]
    MissingSource(PathBuf),

    #[error("could not determine a positive duration for {0}")]
    UnknownDuration(PathBuf),

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder exited with status {code:?}: {tail}")]
    EncoderFailed { code: Option<i32>, tail: String },

    #[error("encoder produced an empty output file")]
    EmptyOutput,

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("asset {0} already has a live transcode job")]
    AlreadyQueued(uuid::Uuid),

    #[error("transcode queue is closed")]
    QueueClosed,

    #[error("transcode task aborted: {0}")]
    Aborted(String),

    #[error("status store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}
