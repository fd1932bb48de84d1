use checkpoint::CheckpointError;
use lingproc::ChunkError;
use std::path::PathBuf;
use thiserror::Error;

/// Job-level failures. Chunk-level synthesis errors never end up here; they
/// are recorded in the checkpoint and the job carries on.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "checkpoint failure for job `{job_id}` (last completed chunk: {}): {source}",
        last_chunk(.last_done)
    )]
    Checkpoint {
        job_id: String,
        last_done: Option<usize>,
        #[source]
        source: CheckpointError,
    },

    #[error(
        "saved progress for job `{job_id}` does not match the source (last completed chunk: {}): {detail}",
        last_chunk(.last_done)
    )]
    ResumeMismatch {
        job_id: String,
        last_done: Option<usize>,
        detail: String,
    },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot join audio into {}: {source}", path.display())]
    Join {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn checkpoint(
        job_id: impl Into<String>,
        last_done: Option<usize>,
        source: CheckpointError,
    ) -> Self {
        ConvertError::Checkpoint {
            job_id: job_id.into(),
            last_done,
            source,
        }
    }
}

impl From<ChunkError> for ConvertError {
    fn from(e: ChunkError) -> Self {
        ConvertError::InvalidInput(e.to_string())
    }
}

/// Human-facing (1-based) chunk number.
fn last_chunk(last_done: &Option<usize>) -> String {
    match last_done {
        Some(i) => (i + 1).to_string(),
        None => "none".into(),
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_chunk_numbers() {
        let err = ConvertError::ResumeMismatch {
            job_id: "book".into(),
            last_done: Some(5),
            detail: "text changed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("last completed chunk: 6"));
        assert!(msg.contains("text changed"));
    }

    #[test]
    fn empty_text_is_invalid_input() {
        let err: ConvertError = ChunkError::EmptyText.into();
        assert!(matches!(err, ConvertError::InvalidInput(_)));
    }
}
