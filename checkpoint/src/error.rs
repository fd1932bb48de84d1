use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint for job `{job_id}`")]
    NotFound { job_id: String },

    #[error("checkpoint I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("job `{job_id}` has no chunk {index}")]
    UnknownChunk { job_id: String, index: usize },
}

impl CheckpointError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CheckpointError::NotFound { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, CheckpointError>;
