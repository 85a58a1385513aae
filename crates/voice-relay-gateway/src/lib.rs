//! HTTP gateway for the voice relay.
//!
//! Accepts an uploaded recording on `POST /process_audio`, runs it through
//! transcription, reply generation and speech synthesis, and serves the
//! resulting audio from the storage directory.

pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod state;

pub use pipeline::{Pipeline, PipelineError, PipelineOutcome, Stage};
pub use server::{ProcessResponse, router, serve, start_server};
pub use state::AppState;
