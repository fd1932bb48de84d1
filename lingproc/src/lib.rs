//! Text processing for speech synthesis jobs.
//!
//! This crate cuts source documents into [`Chunk`]s small enough to submit to
//! a text-to-speech API, fingerprints documents so a saved job can tell
//! whether its source changed, and gathers the [`TextStats`] shown before a
//! conversion starts.

pub mod chunk;
pub mod stats;

pub use crate::chunk::*;
pub use crate::stats::*;
