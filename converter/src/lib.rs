//! Chunked, resumable text-to-speech conversion.
//!
//! A [`ConversionJob`] holds a chunked source document. The [`Controller`]
//! feeds its chunks to a [`tts::Synthesizer`] one at a time, writes each
//! chunk's audio next to the job's checkpoint and records progress through a
//! [`checkpoint::CheckpointStore`]. A killed or stopped run picks up where
//! the checkpoint says it left off.

pub mod audio;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod job;
pub mod logging;
pub mod progress;
pub mod prompt;
pub mod retry;

pub use audio::{AudioJoiner, ConcatJoiner, write_durable};
pub use command::{Command, HELP, forward_interrupts, spawn_listener};
pub use config::Cli;
pub use controller::{Controller, Outcome};
pub use error::{ConvertError, Result};
pub use job::{ConversionJob, JobLayout, read_source, sanitize_job_id};
pub use logging::init_logging;
pub use progress::{Progress, format_duration};
pub use prompt::{Prompter, expand_home};
pub use retry::{Backoff, RetryPolicy};
