//! Google Cloud Text-to-Speech (v1 `text:synthesize`), LINEAR16 output.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use voice_relay_core::types::{LanguageTag, VoiceGender};

use crate::{GoogleAuth, Synthesizer, ensure_success};

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";

pub struct GoogleTtsSynthesizer {
    pub base_url: String,
    voice_gender: VoiceGender,
    voice_name: Option<String>,
    auth: Arc<GoogleAuth>,
    client: reqwest::Client,
}

impl GoogleTtsSynthesizer {
    pub fn new(
        base_url: Option<&str>,
        voice_gender: VoiceGender,
        voice_name: Option<String>,
        auth: Arc<GoogleAuth>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            voice_gender,
            voice_name,
            auth,
            client,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    ssml_gender: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleTtsSynthesizer {
    fn build_request<'a>(&'a self, text: &'a str, language: &'a LanguageTag) -> SynthesizeRequest<'a> {
        SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: language.as_str(),
                ssml_gender: self.voice_gender.as_api_str(),
                name: self.voice_name.as_deref(),
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
            },
        }
    }
}

fn decode_audio(response: SynthesizeResponse) -> anyhow::Result<Vec<u8>> {
    let bytes = STANDARD.decode(response.audio_content.as_bytes())?;
    if bytes.is_empty() {
        anyhow::bail!("Text-to-Speech returned no audio");
    }
    Ok(bytes)
}

#[async_trait]
impl Synthesizer for GoogleTtsSynthesizer {
    fn id(&self) -> &str {
        "google-tts"
    }

    async fn synthesize(&self, text: &str, language: &LanguageTag) -> anyhow::Result<Vec<u8>> {
        let url = format!("{}/v1/text:synthesize", self.base_url);

        debug!(url, language = %language, text_len = text.len(), "Requesting speech synthesis");

        let request = self.client.post(&url).json(&self.build_request(text, language));
        let resp = self.auth.authorize(request).await?.send().await?;
        let resp = ensure_success(resp, "Text-to-Speech").await?;

        let body: SynthesizeResponse = resp.json().await?;
        decode_audio(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_core::types::CloudCredential;

    fn synthesizer(voice_name: Option<String>) -> GoogleTtsSynthesizer {
        GoogleTtsSynthesizer::new(
            None,
            VoiceGender::Female,
            voice_name,
            Arc::new(GoogleAuth::new(
                CloudCredential::ApiKey("k".into()),
                reqwest::Client::new(),
            )),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_request_shape() {
        let tts = synthesizer(None);
        let lang = LanguageTag::parse("es-ES").unwrap();
        let body = serde_json::to_value(tts.build_request("Hola", &lang)).unwrap();
        assert_eq!(body["input"]["text"], "Hola");
        assert_eq!(body["voice"]["languageCode"], "es-ES");
        assert_eq!(body["voice"]["ssmlGender"], "FEMALE");
        assert!(body["voice"].get("name").is_none());
        assert_eq!(body["audioConfig"]["audioEncoding"], "LINEAR16");
    }

    #[test]
    fn test_request_with_voice_name() {
        let tts = synthesizer(Some("es-ES-Standard-A".into()));
        let lang = LanguageTag::default();
        let body = serde_json::to_value(tts.build_request("Hola", &lang)).unwrap();
        assert_eq!(body["voice"]["name"], "es-ES-Standard-A");
    }

    #[test]
    fn test_decode_audio() {
        let resp = SynthesizeResponse {
            audio_content: "UklGRg==".into(),
        };
        assert_eq!(decode_audio(resp).unwrap(), b"RIFF");

        let empty = SynthesizeResponse {
            audio_content: String::new(),
        };
        assert!(decode_audio(empty).is_err());

        let garbage = SynthesizeResponse {
            audio_content: "***".into(),
        };
        assert!(decode_audio(garbage).is_err());
    }
}
