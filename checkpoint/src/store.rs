use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{CheckpointError, Result};
use crate::record::{Checkpoint, JobState};

/// Name of the record file inside a job directory.
pub const RECORD_FILE: &str = "checkpoint.json";

/// Persistence for [`Checkpoint`]s keyed by job id.
///
/// Every write must be durable once the call returns. The provided
/// mutation helpers load the current record, apply the change and only
/// write back when something changed.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, job_id: &str) -> Result<Checkpoint>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Remove the job's record. Deleting a missing record is not an error.
    fn delete(&self, job_id: &str) -> Result<()>;

    fn mark_done(&self, job_id: &str, index: usize, output: &Path) -> Result<()> {
        let mut cp = self.load(job_id)?;
        if cp.apply_done(index, output)? {
            cp.touch();
            self.save(&cp)?;
        }
        Ok(())
    }

    fn mark_errored(&self, job_id: &str, index: usize, reason: &str) -> Result<()> {
        let mut cp = self.load(job_id)?;
        if cp.apply_errored(index, reason)? {
            cp.touch();
            self.save(&cp)?;
        }
        Ok(())
    }

    fn set_state(&self, job_id: &str, state: JobState) -> Result<()> {
        let mut cp = self.load(job_id)?;
        if cp.state != state {
            cp.state = state;
            cp.touch();
            self.save(&cp)?;
        }
        Ok(())
    }

    /// Add a session's processing time to the job total.
    fn record_elapsed(&self, job_id: &str, secs: f64) -> Result<()> {
        if secs <= 0.0 {
            return Ok(());
        }
        let mut cp = self.load(job_id)?;
        cp.elapsed_secs += secs;
        cp.touch();
        self.save(&cp)
    }
}

/// Stores each job as `<root>/<job_id>/checkpoint.json`.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub fn record_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(RECORD_FILE)
    }

    /// Ids of every job under the root that has a record, sorted.
    pub fn job_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CheckpointError::io(&self.root, e)),
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join(RECORD_FILE).is_file())
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Find a job whose record points at `source`.
    ///
    /// Unreadable records are skipped.
    pub fn find_by_source(&self, source: &Path) -> Result<Option<Checkpoint>> {
        for job_id in self.job_ids()? {
            match self.load(&job_id) {
                Ok(cp) if cp.source == source => return Ok(Some(cp)),
                Ok(_) => {}
                Err(e) => warn!(job_id, error = %e, "skipping unreadable checkpoint"),
            }
        }
        Ok(None)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, job_id: &str) -> Result<Checkpoint> {
        let path = self.record_path(job_id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound {
                    job_id: job_id.to_string(),
                });
            }
            Err(e) => return Err(CheckpointError::io(path, e)),
        };
        serde_json::from_slice(&data).map_err(|source| CheckpointError::Corrupt { path, source })
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = self.job_dir(&checkpoint.job_id);
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;

        let path = dir.join(RECORD_FILE);
        let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
        let data = serde_json::to_vec_pretty(checkpoint).map_err(|source| {
            CheckpointError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        // Write aside then rename so a crash leaves either the old or the new record.
        let mut file = fs::File::create(&tmp).map_err(|e| CheckpointError::io(&tmp, e))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| CheckpointError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| CheckpointError::io(&path, e))?;

        #[cfg(unix)]
        if let Ok(d) = fs::File::open(&dir) {
            let _ = d.sync_all();
        }

        debug!(
            job_id = %checkpoint.job_id,
            done = checkpoint.done_count(),
            total = checkpoint.total_chunks(),
            "checkpoint saved"
        );
        Ok(())
    }

    fn delete(&self, job_id: &str) -> Result<()> {
        let path = self.record_path(job_id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CheckpointError::io(path, e)),
        }
        let _ = fs::remove_file(self.job_dir(job_id).join(format!("{RECORD_FILE}.tmp")));
        // Only succeeds once the job directory is empty.
        let _ = fs::remove_dir(self.job_dir(job_id));
        debug!(job_id, "checkpoint deleted");
        Ok(())
    }
}
