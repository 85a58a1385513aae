//! Fallback generator: turns any generation failure into a fixed reply.
//!
//! This is the only error-recovery policy in the pipeline. Transcription and
//! synthesis errors are never recovered.

use std::sync::Arc;

use tracing::warn;

use crate::Generator;

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Provider,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

/// Wraps a [`Generator`] so that failures yield `fallback_reply` instead of an error.
pub struct FallbackGenerator {
    inner: Option<Arc<dyn Generator>>,
    fallback_reply: String,
}

impl FallbackGenerator {
    pub fn new(inner: Arc<dyn Generator>, fallback_reply: impl Into<String>) -> Self {
        Self {
            inner: Some(inner),
            fallback_reply: fallback_reply.into(),
        }
    }

    /// A generator with no provider behind it; every reply is the fallback.
    pub fn fallback_only(fallback_reply: impl Into<String>) -> Self {
        Self {
            inner: None,
            fallback_reply: fallback_reply.into(),
        }
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    pub fn provider_id(&self) -> &str {
        self.inner.as_ref().map(|g| g.id()).unwrap_or("none")
    }

    /// Generate a reply, never failing.
    pub async fn reply(&self, transcript: &str) -> Reply {
        let Some(inner) = &self.inner else {
            warn!("No generator configured, using fallback reply");
            return self.fallback();
        };

        match inner.generate(transcript).await {
            Ok(text) if !text.trim().is_empty() => Reply {
                text,
                source: ReplySource::Provider,
            },
            Ok(_) => {
                warn!(provider = inner.id(), "Generator returned an empty reply, using fallback");
                self.fallback()
            }
            Err(e) => {
                warn!(provider = inner.id(), error = %e, "Generator failed, using fallback reply");
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> Reply {
        Reply {
            text: self.fallback_reply.clone(),
            source: ReplySource::Fallback,
        }
    }
}
