//! Google Cloud Speech-to-Text (v1 `speech:recognize`).

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use voice_relay_core::types::LanguageTag;

use crate::{GoogleAuth, Transcriber, ensure_success};

const DEFAULT_BASE_URL: &str = "https://speech.googleapis.com";

pub struct GoogleSpeechTranscriber {
    pub base_url: String,
    sample_rate_hertz: u32,
    auth: Arc<GoogleAuth>,
    client: reqwest::Client,
}

impl GoogleSpeechTranscriber {
    pub fn new(
        base_url: Option<&str>,
        sample_rate_hertz: u32,
        auth: Arc<GoogleAuth>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            sample_rate_hertz,
            auth,
            client,
        }
    }
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

fn build_request<'a>(
    audio: &[u8],
    language: &'a LanguageTag,
    sample_rate_hertz: u32,
) -> RecognizeRequest<'a> {
    RecognizeRequest {
        config: RecognitionConfig {
            encoding: "LINEAR16",
            sample_rate_hertz,
            language_code: language.as_str(),
        },
        audio: RecognitionAudio {
            content: STANDARD.encode(audio),
        },
    }
}

/// First alternative of the first result, or `""` when nothing was recognized.
fn first_transcript(response: RecognizeResponse) -> String {
    response
        .results
        .into_iter()
        .next()
        .and_then(|r| r.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default()
}

#[async_trait]
impl Transcriber for GoogleSpeechTranscriber {
    fn id(&self) -> &str {
        "google-speech"
    }

    async fn transcribe(&self, audio: &[u8], language: &LanguageTag) -> anyhow::Result<String> {
        let url = format!("{}/v1/speech:recognize", self.base_url);

        debug!(url, language = %language, audio_bytes = audio.len(), "Sending audio for recognition");

        let request = self
            .client
            .post(&url)
            .json(&build_request(audio, language, self.sample_rate_hertz));
        let resp = self.auth.authorize(request).await?.send().await?;
        let resp = ensure_success(resp, "Speech-to-Text").await?;

        let body: RecognizeResponse = resp.json().await?;
        Ok(first_transcript(body))
    }
}
