//! The conversion loop.
//!
//! [`Controller::run`] walks the pending chunks of a [`ConversionJob`] in
//! order, synthesizing one chunk at a time and recording every result in the
//! checkpoint store before moving on. Operator commands arrive over a
//! channel: they are drained between chunks and raced against the in-flight
//! request, so a force stop drops the request instead of waiting for it.

use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, JobState};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use tts::Synthesizer;

use crate::audio::{AudioJoiner, write_durable};
use crate::command::{Command, HELP};
use crate::error::{ConvertError, Result};
use crate::job::ConversionJob;
use crate::progress::{Progress, format_duration};
use crate::retry::RetryPolicy;

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every chunk was synthesized and joined into `output`.
    Completed { output: PathBuf, total: usize },
    /// Halted with progress kept.
    Stopped {
        done: usize,
        total: usize,
        forced: bool,
    },
    /// Halted and all progress erased.
    Deleted,
    /// Every chunk was attempted but some could not be synthesized.
    Failed {
        errored: Vec<usize>,
        done: usize,
        total: usize,
    },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Failed { .. } => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed { output, total } => {
                write!(f, "Done: {total} chunks joined into {}", output.display())
            }
            Outcome::Stopped {
                done,
                total,
                forced,
            } => {
                let how = if *forced { "Force stopped" } else { "Stopped" };
                write!(
                    f,
                    "{how} with {done} of {total} chunks done. Run again to resume."
                )
            }
            Outcome::Deleted => write!(f, "Stopped. All progress and audio files were deleted."),
            Outcome::Failed {
                errored,
                done,
                total,
            } => {
                let numbers: Vec<String> = errored.iter().map(|i| (i + 1).to_string()).collect();
                write!(
                    f,
                    "{done} of {total} chunks done; chunks {} failed. Run again to retry them.",
                    numbers.join(", ")
                )
            }
        }
    }
}

/// Halt requests, weakest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Halt {
    Save,
    Force,
    Delete,
}

enum ChunkOutcome {
    Done { bytes: usize },
    Errored(String),
    Abandoned,
}

/// Runs jobs against a synthesizer and a checkpoint store.
pub struct Controller {
    synth: Arc<dyn Synthesizer>,
    store: Arc<dyn CheckpointStore>,
    joiner: Arc<dyn AudioJoiner>,
    retry: RetryPolicy,
    commands: mpsc::Receiver<Command>,
    listening: bool,
    input_closed: bool,
    paused: bool,
    halt: Option<Halt>,
    last_done: Option<usize>,
}

impl Controller {
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        store: Arc<dyn CheckpointStore>,
        joiner: Arc<dyn AudioJoiner>,
        retry: RetryPolicy,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            synth,
            store,
            joiner,
            retry,
            commands,
            listening: true,
            input_closed: false,
            paused: false,
            halt: None,
            last_done: None,
        }
    }

    /// Process every chunk of `job` that is not done yet.
    pub async fn run(&mut self, job: &ConversionJob) -> Result<Outcome> {
        let cp = self.start(job)?;
        let total = job.total_chunks();
        let mut progress = Progress::new(total, cp.done_count(), cp.elapsed());
        let pending = cp.pending_indices();
        if cp.done_count() > 0 {
            println!(
                "Resuming job {}: {} of {} chunks already done.",
                job.job_id,
                cp.done_count(),
                total
            );
        } else {
            println!("Processing {total} chunks for job {}.", job.job_id);
        }

        for index in pending {
            self.between_chunks(job).await?;
            if self.halt.is_some() {
                break;
            }
            debug!(chunk = index + 1, total, "synthesizing chunk");
            match self.process_chunk(job, index).await? {
                ChunkOutcome::Done { bytes } => {
                    progress.chunk_done();
                    println!(
                        "{} ({})",
                        progress.status_line(index),
                        lingproc::format_size(bytes as u64)
                    );
                }
                ChunkOutcome::Errored(reason) => {
                    println!("Chunk {}/{total} failed: {reason}", index + 1);
                }
                ChunkOutcome::Abandoned => break,
            }
        }

        match self.halt {
            Some(halt) => self.stop(job, halt, &progress),
            None => self.complete(job, &progress),
        }
    }

    /// Load or create the job's checkpoint and mark it running.
    fn start(&mut self, job: &ConversionJob) -> Result<Checkpoint> {
        let mut cp = match self.store.load(&job.job_id) {
            Ok(cp) => {
                job.verify(&cp)?;
                cp
            }
            Err(CheckpointError::NotFound { .. }) => job.new_checkpoint(),
            Err(e) => return Err(ConvertError::checkpoint(&job.job_id, None, e)),
        };
        self.last_done = cp.last_done();
        job.layout
            .ensure()
            .map_err(|e| ConvertError::io(job.layout.dir(), e))?;
        cp.state = JobState::Running;
        cp.touch();
        self.store
            .save(&cp)
            .map_err(|e| self.checkpoint_err(job, e))?;
        info!(
            job_id = %job.job_id,
            done = cp.done_count(),
            total = cp.total_chunks(),
            "job started"
        );
        Ok(cp)
    }

    /// Handle queued commands and sit out a pause.
    async fn between_chunks(&mut self, job: &ConversionJob) -> Result<()> {
        while self.listening {
            match self.commands.try_recv() {
                Ok(cmd) => self.on_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.listening = false,
            }
        }
        if !self.paused || self.halt.is_some() {
            return Ok(());
        }

        self.set_state(job, JobState::Paused)?;
        println!("Paused. Type r and Enter to resume.");
        while self.paused && self.halt.is_none() {
            match self.commands.recv().await {
                Some(cmd) => self.on_command(cmd),
                None => {
                    // Nothing left that could resume the job.
                    self.listening = false;
                    self.request(Halt::Save);
                }
            }
        }
        if self.halt.is_none() {
            self.set_state(job, JobState::Running)?;
            println!("Resumed.");
        }
        Ok(())
    }

    async fn process_chunk(&mut self, job: &ConversionJob, index: usize) -> Result<ChunkOutcome> {
        let text = job.chunks[index].speech_text();
        let mut backoff = self.retry.backoff();
        let reason = loop {
            let Some(result) = self.attempt(text).await else {
                info!(chunk = index + 1, "chunk abandoned");
                return Ok(ChunkOutcome::Abandoned);
            };
            match result {
                Ok(audio) => {
                    let path = job.layout.chunk_path(index);
                    write_durable(&path, &audio).map_err(|e| ConvertError::io(&path, e))?;
                    self.store
                        .mark_done(&job.job_id, index, &path)
                        .map_err(|e| self.checkpoint_err(job, e))?;
                    self.last_done = self.last_done.max(Some(index));
                    return Ok(ChunkOutcome::Done { bytes: audio.len() });
                }
                Err(e) if !e.is_retryable() => break e.to_string(),
                Err(e) => match backoff.next_delay(e.retry_after()) {
                    Some(delay) => {
                        warn!(
                            chunk = index + 1,
                            attempt = backoff.attempt(),
                            error = %e,
                            "retrying chunk in {}",
                            format_duration(delay)
                        );
                        if !self.wait(delay).await {
                            return Ok(ChunkOutcome::Abandoned);
                        }
                    }
                    None => {
                        break format!("{e} (gave up after {} attempts)", backoff.attempt());
                    }
                },
            }
        };
        warn!(chunk = index + 1, %reason, "chunk failed");
        self.store
            .mark_errored(&job.job_id, index, &reason)
            .map_err(|e| self.checkpoint_err(job, e))?;
        Ok(ChunkOutcome::Errored(reason))
    }

    /// One synthesis request raced against operator commands. `None` when
    /// the request was dropped by a force stop or delete.
    async fn attempt(&mut self, text: &str) -> Option<tts::Result<Vec<u8>>> {
        let synth = Arc::clone(&self.synth);
        let call = synth.synthesize(text);
        tokio::pin!(call);
        loop {
            tokio::select! {
                result = &mut call => return Some(result),
                cmd = self.commands.recv(), if self.listening => match cmd {
                    Some(cmd) => {
                        self.on_command(cmd);
                        if self.must_abandon() {
                            return None;
                        }
                    }
                    None => self.listening = false,
                },
            }
        }
    }

    /// Sleep for `delay` unless a force stop or delete arrives first.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.commands.recv(), if self.listening => match cmd {
                    Some(cmd) => {
                        self.on_command(cmd);
                        if self.must_abandon() {
                            return false;
                        }
                    }
                    None => self.listening = false,
                },
            }
        }
    }

    fn on_command(&mut self, cmd: Command) {
        debug!(%cmd, "handling command");
        match cmd {
            Command::Pause if !self.paused => {
                self.paused = true;
                println!("Pause requested. Pausing after the current chunk.");
            }
            Command::Pause => {}
            Command::Resume if self.paused => self.paused = false,
            Command::Resume => println!("Not paused."),
            Command::StopSave => {
                println!("Stop requested. Finishing the current chunk.");
                self.request(Halt::Save);
            }
            Command::ForceStop => {
                println!("Force stop requested. Stopping now.");
                self.request(Halt::Force);
            }
            Command::StopDelete => {
                println!("Stop and delete requested.");
                self.request(Halt::Delete);
            }
            Command::Help => println!("{HELP}"),
            Command::InputClosed => self.input_closed = true,
        }
        // A pause nobody can resume becomes a stop.
        if self.paused && self.input_closed && self.halt.is_none() {
            println!("Command input closed while paused. Stopping.");
            self.request(Halt::Save);
        }
    }

    fn request(&mut self, halt: Halt) {
        self.halt = self.halt.max(Some(halt));
    }

    fn must_abandon(&self) -> bool {
        matches!(self.halt, Some(Halt::Force | Halt::Delete))
    }

    fn stop(&mut self, job: &ConversionJob, halt: Halt, progress: &Progress) -> Result<Outcome> {
        if halt == Halt::Delete {
            self.store
                .delete(&job.job_id)
                .map_err(|e| self.checkpoint_err(job, e))?;
            job.layout
                .remove_all()
                .map_err(|e| ConvertError::io(job.layout.dir(), e))?;
            info!(job_id = %job.job_id, "job deleted");
            return Ok(Outcome::Deleted);
        }

        self.record_session(job, progress)?;
        self.set_state(job, JobState::Stopped)?;
        let cp = self.load(job)?;
        let contiguous = (0..cp.total_chunks()).take_while(|&i| cp.is_done(i)).count();
        if contiguous > 0 {
            println!("Chunks 1 to {contiguous} are saved.");
        }
        info!(job_id = %job.job_id, done = cp.done_count(), "job stopped");
        Ok(Outcome::Stopped {
            done: cp.done_count(),
            total: cp.total_chunks(),
            forced: halt == Halt::Force,
        })
    }

    fn complete(&mut self, job: &ConversionJob, progress: &Progress) -> Result<Outcome> {
        let cp = self.load(job)?;
        let remaining = cp.pending_indices();
        if !remaining.is_empty() {
            self.record_session(job, progress)?;
            self.set_state(job, JobState::Failed)?;
            warn!(job_id = %job.job_id, failed = remaining.len(), "job finished with failed chunks");
            return Ok(Outcome::Failed {
                errored: remaining,
                done: cp.done_count(),
                total: cp.total_chunks(),
            });
        }

        let output = job.layout.final_path();
        self.joiner
            .join(&cp.outputs(), &output)
            .map_err(|source| ConvertError::Join {
                path: output.clone(),
                source,
            })?;
        self.store
            .delete(&job.job_id)
            .map_err(|e| self.checkpoint_err(job, e))?;
        job.layout
            .remove_chunks(cp.total_chunks())
            .map_err(|e| ConvertError::io(job.layout.dir(), e))?;
        println!(
            "All chunks done in {} (total {}).",
            format_duration(progress.session()),
            format_duration(progress.total_time())
        );
        info!(job_id = %job.job_id, output = %output.display(), "job completed");
        Ok(Outcome::Completed {
            output,
            total: cp.total_chunks(),
        })
    }

    fn load(&self, job: &ConversionJob) -> Result<Checkpoint> {
        self.store
            .load(&job.job_id)
            .map_err(|e| self.checkpoint_err(job, e))
    }

    fn set_state(&self, job: &ConversionJob, state: JobState) -> Result<()> {
        self.store
            .set_state(&job.job_id, state)
            .map_err(|e| self.checkpoint_err(job, e))
    }

    fn record_session(&self, job: &ConversionJob, progress: &Progress) -> Result<()> {
        self.store
            .record_elapsed(&job.job_id, progress.session().as_secs_f64())
            .map_err(|e| self.checkpoint_err(job, e))
    }

    fn checkpoint_err(&self, job: &ConversionJob, source: CheckpointError) -> ConvertError {
        ConvertError::checkpoint(&job.job_id, self.last_done, source)
    }
}
