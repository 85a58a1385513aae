//! Provider abstraction for the three AI capabilities of the relay.
//!
//! Each external service sits behind one trait ([`Transcriber`],
//! [`Generator`], [`Synthesizer`]) so the pipeline can be driven by fakes in
//! tests and by the Google implementations in production.

use std::time::Duration;

use async_trait::async_trait;

use voice_relay_core::types::LanguageTag;

pub mod auth;
pub mod fallback;
pub mod gemini;
pub mod google_speech;
pub mod google_tts;
pub mod prompt;

pub use auth::GoogleAuth;
pub use fallback::{FallbackGenerator, Reply, ReplySource};

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Provider identifier used in logs.
    fn id(&self) -> &str;

    /// Transcribe LINEAR16 audio. Returns an empty string when nothing was recognized.
    async fn transcribe(&self, audio: &[u8], language: &LanguageTag) -> anyhow::Result<String>;
}

/// Reply generation from a transcript.
#[async_trait]
pub trait Generator: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, transcript: &str) -> anyhow::Result<String>;
}

/// Text-to-speech.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn id(&self) -> &str;

    /// Synthesize `text` and return LINEAR16 audio bytes.
    async fn synthesize(&self, text: &str, language: &LanguageTag) -> anyhow::Result<Vec<u8>>;
}

/// Build the shared HTTP client used by all providers.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("voice-relay/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Turn a non-2xx response into an error carrying the body.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    what: &str,
) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{what} API error {status}: {body}");
}
