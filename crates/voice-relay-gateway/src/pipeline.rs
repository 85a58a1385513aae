//! The transcribe → reply → synthesize pipeline behind `POST /process_audio`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use voice_relay_core::error::VoiceRelayError;
use voice_relay_core::types::LanguageTag;
use voice_relay_media::wav;
use voice_relay_media::{AudioKind, AudioRef, AudioStore};
use voice_relay_providers::{FallbackGenerator, ReplySource, Synthesizer, Transcriber};

/// Pipeline step, used to label errors and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Transcribe,
    Generate,
    Synthesize,
    Store,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Transcribe => "transcribe",
            Self::Generate => "generate",
            Self::Synthesize => "synthesize",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request: the step that failed and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: VoiceRelayError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: VoiceRelayError) -> Self {
        Self { stage, source }
    }

    fn provider(stage: Stage, err: anyhow::Error) -> Self {
        Self::new(stage, VoiceRelayError::Provider(format!("{err:#}")))
    }
}

/// Result of one successful pass through the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub transcript: String,
    pub reply: String,
    pub reply_source: ReplySource,
    /// Copy of the upload.
    pub input: AudioRef,
    /// Synthesized reply.
    pub audio: AudioRef,
}

pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    generator: FallbackGenerator,
    synthesizer: Arc<dyn Synthesizer>,
    store: Arc<AudioStore>,
    sample_rate_hertz: u32,
}

impl Pipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: FallbackGenerator,
        synthesizer: Arc<dyn Synthesizer>,
        store: Arc<AudioStore>,
        sample_rate_hertz: u32,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            store,
            sample_rate_hertz,
        }
    }

    pub fn store(&self) -> &Arc<AudioStore> {
        &self.store
    }

    /// Run one upload through the whole pipeline.
    ///
    /// Writes exactly two files on success: the input copy and the reply audio.
    pub async fn process(
        &self,
        audio: &[u8],
        language: &LanguageTag,
    ) -> Result<PipelineOutcome, PipelineError> {
        if audio.is_empty() {
            return Err(PipelineError::new(
                Stage::Upload,
                VoiceRelayError::InvalidInput("audio upload is empty".into()),
            ));
        }
        self.check_format(audio);

        let input = timed(Stage::Store, self.store.write(AudioKind::Input, audio))
            .await
            .map_err(|e| PipelineError::new(Stage::Store, e))?;
        info!(path = %input.path.display(), bytes = audio.len(), "Upload saved");

        let transcript = timed(Stage::Transcribe, self.transcriber.transcribe(audio, language))
            .await
            .map_err(|e| PipelineError::provider(Stage::Transcribe, e))?;
        info!(provider = self.transcriber.id(), %transcript, "Transcribed");

        // Generation never fails the request; errors become the fallback reply.
        let start = Instant::now();
        let reply = self.generator.reply(&transcript).await;
        record_stage(Stage::Generate, start, reply.source == ReplySource::Provider);
        #[cfg(feature = "metrics")]
        if reply.source == ReplySource::Fallback {
            crate::metrics::record_fallback();
        }
        info!(provider = self.generator.provider_id(), source = ?reply.source, text = %reply.text, "Reply generated");

        let speech = timed(Stage::Synthesize, self.synthesizer.synthesize(&reply.text, language))
            .await
            .map_err(|e| PipelineError::provider(Stage::Synthesize, e))?;

        let output = timed(Stage::Store, self.store.write(AudioKind::Response, &speech))
            .await
            .map_err(|e| PipelineError::new(Stage::Store, e))?;
        info!(path = %output.path.display(), bytes = speech.len(), "Reply audio saved");

        Ok(PipelineOutcome {
            transcript,
            reply: reply.text,
            reply_source: reply.source,
            input,
            audio: output,
        })
    }

    /// Warn when a WAV header disagrees with what the recognizer is told.
    fn check_format(&self, audio: &[u8]) {
        let Some(info) = wav::parse_header(audio) else {
            return;
        };
        if !info.is_linear_pcm() {
            warn!(format = ?info.sample_format, bits = info.bits_per_sample, "Upload is not 16-bit linear PCM");
        }
        if info.sample_rate != self.sample_rate_hertz {
            warn!(
                upload_rate = info.sample_rate,
                expected_rate = self.sample_rate_hertz,
                "Upload sample rate differs from configured recognition rate"
            );
        }
    }
}

/// Await a step, recording its duration.
async fn timed<T, E, F>(stage: Stage, step: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = step.await;
    record_stage(stage, start, result.is_ok());
    result
}

fn record_stage(stage: Stage, start: Instant, ok: bool) {
    let elapsed = start.elapsed();
    tracing::debug!(stage = stage.as_str(), elapsed_ms = elapsed.as_millis() as u64, ok, "Stage finished");

    #[cfg(feature = "metrics")]
    crate::metrics::record_stage(stage.as_str(), elapsed.as_secs_f64(), ok);
}
