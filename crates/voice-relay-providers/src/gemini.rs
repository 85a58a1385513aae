//! Google Generative AI (Gemini) reply generator.
//!
//! Uses the non-streaming `generateContent` endpoint with the API key in the
//! `x-goog-api-key` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Generator, ensure_success, prompt};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiGenerator {
    pub base_url: String,
    model: String,
    persona: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(
        base_url: Option<&str>,
        model: impl Into<String>,
        persona: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            persona: persona.into(),
            api_key: api_key.into(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn build_request(prompt: String) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![TextPart { text: prompt }],
        }],
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
///
/// The text is returned untouched; blank replies are left to
/// [`FallbackGenerator`](crate::FallbackGenerator).
fn extract_reply(body: &str) -> anyhow::Result<String> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| anyhow::anyhow!("Gemini response has no candidate text"))
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, transcript: &str) -> anyhow::Result<String> {
        let prompt = prompt::render(&self.persona, transcript);
        let url = self.endpoint();

        debug!(url, model = %self.model, prompt_len = prompt.len(), "Requesting Gemini reply");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt))
            .send()
            .await?;

        let resp = ensure_success(resp, "Gemini").await?;
        let body = resp.text().await?;
        extract_reply(&body)
    }
}
