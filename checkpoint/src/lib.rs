//! Durable progress records for long-running conversion jobs.
//!
//! A [`Checkpoint`] remembers which chunks of a job have been synthesized,
//! where their audio lives and which ones failed. It is the only state that
//! survives a restart, so every mutation goes through a [`CheckpointStore`]
//! and is on disk before the call returns.

pub mod error;
pub mod record;
pub mod store;

pub use error::{CheckpointError, Result};
pub use record::{Checkpoint, ChunkRecord, ChunkStatus, JobSettings, JobState};
pub use store::{CheckpointStore, FileCheckpointStore, RECORD_FILE};
