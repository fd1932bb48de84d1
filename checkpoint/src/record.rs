use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CheckpointError, Result};

/// Lifecycle of a conversion job as seen from disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Done,
    Errored,
}

/// What is known about one chunk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub status: ChunkStatus,
    /// Audio file holding the chunk's speech, once done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Last failure reported for the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times the chunk ended up errored.
    #[serde(default)]
    pub failures: u32,
}

/// Settings a resumed run must reuse to produce the same audio.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    pub language: String,
    pub slow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// File name prefix for chunk and final audio files.
    pub prefix: String,
    /// Chunk size in characters.
    pub max_chars: usize,
}

/// Persisted progress of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_id: String,
    pub source: PathBuf,
    /// Digest of the source text the boundaries were computed from.
    pub fingerprint: String,
    /// Byte span of every chunk, in order.
    pub boundaries: Vec<(usize, usize)>,
    pub settings: JobSettings,
    pub state: JobState,
    /// Records for chunks that were touched. Missing entries are pending.
    #[serde(default)]
    pub chunks: BTreeMap<usize, ChunkRecord>,
    /// Processing time accumulated over all sessions.
    #[serde(default)]
    pub elapsed_secs: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        job_id: impl Into<String>,
        source: impl Into<PathBuf>,
        fingerprint: impl Into<String>,
        boundaries: Vec<(usize, usize)>,
        settings: JobSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            source: source.into(),
            fingerprint: fingerprint.into(),
            boundaries,
            settings,
            state: JobState::Created,
            chunks: BTreeMap::new(),
            elapsed_secs: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.boundaries.len()
    }

    pub fn status(&self, index: usize) -> ChunkStatus {
        self.chunks
            .get(&index)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.status(index) == ChunkStatus::Done
    }

    pub fn done_count(&self) -> usize {
        self.done_indices().len()
    }

    pub fn done_indices(&self) -> Vec<usize> {
        self.indices_with(ChunkStatus::Done)
    }

    pub fn errored_indices(&self) -> Vec<usize> {
        self.indices_with(ChunkStatus::Errored)
    }

    /// Chunks still to synthesize, errored ones included, in ascending order.
    pub fn pending_indices(&self) -> Vec<usize> {
        (0..self.total_chunks())
            .filter(|&i| !self.is_done(i))
            .collect()
    }

    /// Highest index that is done.
    pub fn last_done(&self) -> Option<usize> {
        self.done_indices().last().copied()
    }

    /// Audio files of all done chunks, in chunk order.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.chunks
            .values()
            .filter(|r| r.status == ChunkStatus::Done)
            .filter_map(|r| r.output.clone())
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.elapsed_secs).unwrap_or_default()
    }

    /// Mark `index` done. Returns whether anything changed.
    pub fn apply_done(&mut self, index: usize, output: &Path) -> Result<bool> {
        self.check_index(index)?;
        let record = self.chunks.entry(index).or_default();
        if record.status == ChunkStatus::Done && record.output.as_deref() == Some(output) {
            return Ok(false);
        }
        record.status = ChunkStatus::Done;
        record.output = Some(output.to_path_buf());
        record.error = None;
        Ok(true)
    }

    /// Mark `index` errored. Done chunks stay done. Returns whether anything
    /// changed.
    pub fn apply_errored(&mut self, index: usize, reason: &str) -> Result<bool> {
        self.check_index(index)?;
        let record = self.chunks.entry(index).or_default();
        if record.status == ChunkStatus::Done {
            return Ok(false);
        }
        record.status = ChunkStatus::Errored;
        record.error = Some(reason.to_string());
        record.failures += 1;
        Ok(true)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn indices_with(&self, status: ChunkStatus) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(&i, _)| i)
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.total_chunks() {
            Ok(())
        } else {
            Err(CheckpointError::UnknownChunk {
                job_id: self.job_id.clone(),
                index,
            })
        }
    }
}
