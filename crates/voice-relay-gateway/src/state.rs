//! Gateway shared state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use voice_relay_core::config::Config;
use voice_relay_core::types::LanguageTag;
use voice_relay_media::{AudioStore, RetentionPolicy};
use voice_relay_providers::gemini::GeminiGenerator;
use voice_relay_providers::google_speech::GoogleSpeechTranscriber;
use voice_relay_providers::google_tts::GoogleTtsSynthesizer;
use voice_relay_providers::{FallbackGenerator, GoogleAuth, http_client};

use crate::pipeline::Pipeline;

/// Shared state accessible from all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline,
    pub default_language: LanguageTag,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pipeline: Pipeline) -> Self {
        let default_language = config.default_language();
        Self {
            config,
            pipeline,
            default_language,
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Build the Google-backed pipeline described by `config`.
    ///
    /// Fails when no cloud credential is available; a missing Gemini key
    /// only degrades replies to the fallback text.
    pub async fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let creds = config.credentials();
        let cloud = creds.resolve_cloud_credential().context(
            "no Google Cloud credential: set GOOGLE_CLOUD_API_KEY or provide the credentials file",
        )?;

        let client = http_client(config.request_timeout())?;
        let auth = Arc::new(GoogleAuth::new(cloud, client.clone()));

        let speech = config.speech.clone().unwrap_or_default();
        let transcriber = GoogleSpeechTranscriber::new(
            speech.base_url.as_deref(),
            config.sample_rate_hertz(),
            auth.clone(),
            client.clone(),
        );

        let synthesis = config.synthesis.clone().unwrap_or_default();
        let synthesizer = GoogleTtsSynthesizer::new(
            synthesis.base_url.as_deref(),
            config.voice_gender(),
            synthesis.voice_name.clone(),
            auth,
            client.clone(),
        );

        let generator = match creds.resolve_gemini_key() {
            Some(key) => {
                let base_url = config.generation.as_ref().and_then(|g| g.base_url.clone());
                let gemini = GeminiGenerator::new(
                    base_url.as_deref(),
                    config.gemini_model(),
                    config.persona(),
                    key,
                    client,
                );
                FallbackGenerator::new(Arc::new(gemini), config.fallback_reply())
            }
            None => {
                warn!("No Gemini API key configured; every reply will be the fallback text");
                FallbackGenerator::fallback_only(config.fallback_reply())
            }
        };

        let store = open_store(&config).await?;
        info!(
            dir = %store.dir().display(),
            generator = generator.provider_id(),
            "Pipeline ready"
        );

        let pipeline = Pipeline::new(
            Arc::new(transcriber),
            generator,
            Arc::new(synthesizer),
            Arc::new(store),
            config.sample_rate_hertz(),
        );
        Ok(Self::new(config, pipeline))
    }

    pub fn store(&self) -> &Arc<AudioStore> {
        self.pipeline.store()
    }
}

/// Open the audio directory with the configured retention limits.
pub async fn open_store(config: &Config) -> anyhow::Result<AudioStore> {
    let retention = RetentionPolicy::from_limits(config.max_age_secs(), config.max_files());
    let store = AudioStore::open(config.storage_dir(), &config.public_prefix(), retention).await?;
    Ok(store)
}
