use std::time::Duration;
use thiserror::Error;

/// Result alias for all samvad operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the agent core.
///
/// Only `ToolArgument` is recovered locally (fed back into the model
/// transcript as a tool-result error message). Everything else propagates to
/// the interaction boundary and terminates that single interaction without
/// corrupting session state.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to ingest source '{source_name}': {reason}")]
    Ingestion { source_name: String, reason: String },

    #[error("embedding service failure: {0}")]
    EmbeddingService(String),

    #[error("generation service failure: {0}")]
    Generation(String),

    #[error("upstream call timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("no index found with id '{0}'")]
    IndexNotFound(String),

    #[error("index id '{0}' already exists; re-ingest under a fresh id")]
    IndexExists(String),

    #[error("malformed arguments for tool '{tool}': {reason}")]
    ToolArgument { tool: String, reason: String },

    #[error("tool loop exceeded {0} cycles without a final answer")]
    ToolLoopExceeded(usize),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}
