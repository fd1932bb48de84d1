//! HTTP client for a remote text-to-speech service.
//!
//! Requests are `POST`ed as JSON to a single endpoint and the response body is
//! taken verbatim as the audio. Status codes are mapped onto
//! [`SynthesisError`] so the caller can decide whether to retry.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Result, SynthesisError, Synthesizer};

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    language: &'a str,
    slow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

/// Client for a JSON text-to-speech endpoint such as
/// `http://localhost:5002/api/tts`.
#[derive(Clone, Debug)]
pub struct HttpSynthesizer {
    url: String,
    client: Client,
    language: String,
    slow: bool,
    voice: Option<String>,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    /// Create a client targeting `url`. Each request is abandoned after
    /// `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SynthesisError::Permanent(format!("http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            language: "en".into(),
            slow: false,
            voice: None,
            api_key: None,
        })
    }

    /// Language code sent with every request.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Ask the service for slower speech.
    pub fn with_slow(mut self, slow: bool) -> Self {
        self.slow = slow;
        self
    }

    /// Select a voice by name.
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    /// Send `key` as a bearer token.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let payload = SpeechRequest {
            text,
            language: &self.language,
            slow: self.slow,
            voice: self.voice.as_deref(),
        };
        let mut req = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        debug!(url = %self.url, chars = text.chars().count(), "requesting TTS");
        let resp = req.send().await.map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "tts request failed");
            return Err(classify_status(status, retry_after, &body));
        }

        let bytes = resp.bytes().await.map_err(classify_transport)?;
        if bytes.is_empty() {
            return Err(SynthesisError::Permanent("no audio returned".into()));
        }
        Ok(bytes.to_vec())
    }
}

/// Map a non-success status onto the error taxonomy.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> SynthesisError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    match status {
        StatusCode::TOO_MANY_REQUESTS => SynthesisError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => SynthesisError::Transient(detail),
        s if s.is_server_error() => SynthesisError::Transient(detail),
        _ => SynthesisError::Permanent(detail),
    }
}

fn classify_transport(err: reqwest::Error) -> SynthesisError {
    if err.is_builder() {
        SynthesisError::Permanent(err.to_string())
    } else {
        SynthesisError::Transient(err.to_string())
    }
}
