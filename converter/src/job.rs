use checkpoint::{Checkpoint, JobSettings};
use lingproc::{Chunk, boundaries, chunk_text, fingerprint};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConvertError, Result};

/// Where a job's audio files live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobLayout {
    dir: PathBuf,
    prefix: String,
}

impl JobLayout {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Audio file for chunk `index`, numbered from one.
    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{} {}.mp3", self.prefix, index + 1))
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join(format!("{}.mp3", self.prefix))
    }

    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Delete the audio files of the first `total` chunks.
    pub fn remove_chunks(&self, total: usize) -> io::Result<()> {
        for index in 0..total {
            match fs::remove_file(self.chunk_path(index)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Delete the job directory and everything in it.
    pub fn remove_all(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Turn a free-form job name into something safe to use as a directory.
pub fn sanitize_job_id(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '_' || c == '.');
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Read a UTF-8 text file.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        ConvertError::InvalidInput(format!("cannot read {}: {e}", path.display()))
    })?;
    String::from_utf8(bytes).map_err(|_| {
        ConvertError::InvalidInput(format!("{} is not valid UTF-8 text", path.display()))
    })
}

/// One source document prepared for conversion.
#[derive(Clone, Debug)]
pub struct ConversionJob {
    pub job_id: String,
    pub source: PathBuf,
    pub chunks: Vec<Chunk>,
    pub fingerprint: String,
    pub settings: JobSettings,
    pub layout: JobLayout,
}

impl ConversionJob {
    /// Chunk `text` and place the job under `output_root/job_id`.
    pub fn new(
        job_id: impl Into<String>,
        source: impl Into<PathBuf>,
        text: &str,
        settings: JobSettings,
        output_root: &Path,
    ) -> Result<Self> {
        let job_id = job_id.into();
        let chunks = chunk_text(text, settings.max_chars)?;
        let layout = JobLayout::new(output_root.join(&job_id), settings.prefix.clone());
        debug!(job_id, chunks = chunks.len(), "job prepared");
        Ok(Self {
            job_id,
            source: source.into(),
            fingerprint: fingerprint(text),
            chunks,
            settings,
            layout,
        })
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Fresh record with every chunk pending.
    pub fn new_checkpoint(&self) -> Checkpoint {
        Checkpoint::new(
            self.job_id.clone(),
            self.source.clone(),
            self.fingerprint.clone(),
            boundaries(&self.chunks),
            self.settings.clone(),
        )
    }

    /// Check that `cp` was recorded for exactly this text and chunking.
    pub fn verify(&self, cp: &Checkpoint) -> Result<()> {
        let mismatch = |detail: String| ConvertError::ResumeMismatch {
            job_id: self.job_id.clone(),
            last_done: cp.last_done(),
            detail,
        };
        if cp.fingerprint != self.fingerprint {
            return Err(mismatch("the source text changed since the job started".into()));
        }
        if cp.settings.max_chars != self.settings.max_chars {
            return Err(mismatch(format!(
                "chunk size was {} but is now {}",
                cp.settings.max_chars, self.settings.max_chars
            )));
        }
        if cp.boundaries != boundaries(&self.chunks) {
            return Err(mismatch(format!(
                "recorded {} chunks but the text now splits into {}",
                cp.total_chunks(),
                self.total_chunks()
            )));
        }
        Ok(())
    }
}
