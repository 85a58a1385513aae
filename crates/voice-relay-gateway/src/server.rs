//! Axum-based HTTP server.

use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use voice_relay_core::error::VoiceRelayError;
use voice_relay_core::types::LanguageTag;

use crate::pipeline::{PipelineError, Stage};
use crate::state::AppState;

/// Multipart field carrying the recorded audio.
pub const AUDIO_FIELD: &str = "audio";
/// Optional multipart field carrying the language tag.
pub const LANGUAGE_FIELD: &str = "language";

/// Body of a successful `/process_audio` response.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    /// The reply, generated or fallback.
    pub text: String,
    pub transcript: String,
    /// Relative URL of the synthesized reply.
    pub audio: String,
}

/// Build the router: the pipeline endpoint, static audio, health and metrics.
pub fn router(state: Arc<AppState>) -> Router {
    let prefix = format!("/{}", state.config.public_prefix());
    let audio_dir = ServeDir::new(state.store().dir());
    let body_limit = state.config.max_upload_bytes();

    let app = Router::new()
        .route(
            "/process_audio",
            post(process_audio).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.nest_service(&prefix, audio_dir)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Start the HTTP server and the retention sweeper; runs until Ctrl+C.
pub async fn start_server(state: Arc<AppState>, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Voice relay listening on {addr}");

    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let sweeper = state
        .store()
        .clone()
        .spawn_sweeper(state.config.sweep_interval(), cancel.clone());

    let app = router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Audio sweeper task ended abnormally");
    }
    result?;
    Ok(())
}

async fn process_audio(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, PipelineError> {
    #[cfg(feature = "metrics")]
    let start = Instant::now();

    let result = handle_upload(&state, multipart).await;

    #[cfg(feature = "metrics")]
    {
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.status().as_u16(),
        };
        crate::metrics::record_request(status, start.elapsed().as_secs_f64());
    }

    result.map(Json)
}

async fn handle_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<ProcessResponse, PipelineError> {
    let (audio, language) = read_upload(multipart)
        .await
        .map_err(|e| PipelineError::new(Stage::Upload, e))?;
    let language = language.unwrap_or_else(|| state.default_language.clone());

    info!(bytes = audio.len(), language = %language, "Processing audio");
    let outcome = state.pipeline.process(&audio, &language).await?;

    Ok(ProcessResponse {
        text: outcome.reply,
        transcript: outcome.transcript,
        audio: outcome.audio.url,
    })
}

/// Pull the audio bytes and optional language tag out of the form.
async fn read_upload(
    mut multipart: Multipart,
) -> voice_relay_core::error::Result<(Vec<u8>, Option<LanguageTag>)> {
    let mut audio = None;
    let mut language = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(AUDIO_FIELD) => {
                audio = Some(field.bytes().await.map_err(invalid_form)?.to_vec());
            }
            Some(LANGUAGE_FIELD) => {
                let text = field.text().await.map_err(invalid_form)?;
                let text = text.trim();
                if !text.is_empty() {
                    language = Some(LanguageTag::parse(text)?);
                }
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| {
        VoiceRelayError::InvalidInput(format!("missing `{AUDIO_FIELD}` field"))
    })?;
    Ok((audio, language))
}

fn invalid_form(e: axum::extract::multipart::MultipartError) -> VoiceRelayError {
    VoiceRelayError::InvalidInput(format!("malformed upload: {}", e.body_text()))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let audio_files = match state.store().count().await {
        Ok(n) => json!(n),
        Err(e) => {
            warn!(error = %e, "Failed to count audio files");
            serde_json::Value::Null
        }
    };

    Json(json!({
        "status": "ok",
        "version": version,
        "audio_files": audio_files,
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    use axum::http::StatusCode;

    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
