//! Turn chunks of text into audio using a remote text-to-speech service.
//!
//! The [`Synthesizer`] trait is the seam between the conversion loop and the
//! network. [`HttpSynthesizer`] is the production implementation; tests swap
//! in scripted fakes. Implementations never retry on their own, they report
//! what went wrong through [`SynthesisError`] and leave the policy to the
//! caller.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod http;

pub use http::HttpSynthesizer;

/// Ways a synthesis request can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    /// Network trouble or a server-side hiccup. Worth retrying.
    #[error("transient synthesis failure: {0}")]
    Transient(String),
    /// The service asked us to slow down.
    #[error("rate limited by synthesis service")]
    RateLimited { retry_after: Option<Duration> },
    /// The service refused this text. Retrying will not help.
    #[error("synthesis rejected: {0}")]
    Permanent(String),
}

impl SynthesisError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SynthesisError::Permanent(_))
    }

    /// Delay requested by the service, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SynthesisError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Convenience result type used throughout this crate.
pub type Result<T> = std::result::Result<T, SynthesisError>;

/// Text-to-speech engine interface.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Return the encoded audio for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}
