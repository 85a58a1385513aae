//! Configuration loading, secret resolution and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VoiceRelayError};
use crate::types::{CloudCredential, LanguageTag, VoiceGender};

/// Reply used when the generative-text provider fails.
pub const DEFAULT_FALLBACK_REPLY: &str = "Lo siento, hubo un error procesando tu solicitud.";

/// Shop-assistant persona. `{transcript}` is replaced with what the client said.
pub const DEFAULT_PERSONA: &str = "\
Eres un asistente de tienda amigable ayudando a personas que están aprendiendo español.
Tu trabajo es responder solo en español, de forma muy breve, clara y sencilla, como si hablaras con un principiante.
Usa frases cortas de máximo 1-2 líneas.
El cliente dijo: \"{transcript}\". ¿Qué responderías tú?
";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_CONFIG_FILE: &str = "voice-relay.json";

/// Top-level Voice Relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// URL prefix the audio directory is served under (default: "temp").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_prefix: Option<String>,

    /// Language used when the upload carries no `language` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<LanguageTag>,

    /// Per-call timeout for provider requests in seconds (default: 60).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Largest accepted upload in bytes (default: 10 MiB).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            public_prefix: None,
            default_language: None,
            request_timeout_secs: None,
            max_upload_bytes: None,
        }
    }
}

/// Where audio files live and how long they are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Files older than this are evicted (0 = keep forever).
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Maximum number of files kept (0 = unlimited).
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Seconds between background sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_age_secs() -> u64 {
    3600
}

fn default_max_files() -> usize {
    500
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_secs: default_max_age_secs(),
            max_files: default_max_files(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Provider credentials, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Google Cloud API key for Speech-to-Text and Text-to-Speech.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_api_key: Option<String>,

    /// Env var holding the cloud API key (default: `GOOGLE_CLOUD_API_KEY`).
    #[serde(
        default = "default_cloud_api_key_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub cloud_api_key_env: Option<String>,

    /// File holding an API key, an OAuth access token, or a service-account key.
    #[serde(default = "default_cloud_credentials_file")]
    pub cloud_credentials_file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    /// Env var holding the Gemini key (default: `GEMINI_API_KEY`).
    #[serde(
        default = "default_gemini_api_key_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub gemini_api_key_env: Option<String>,

    /// File holding the Gemini API key.
    #[serde(default = "default_gemini_key_file")]
    pub gemini_key_file: String,
}

fn default_cloud_credentials_file() -> String {
    "gcloud-key.json".into()
}

fn default_gemini_key_file() -> String {
    "gemini-key.txt".into()
}

fn default_cloud_api_key_env() -> Option<String> {
    Some("GOOGLE_CLOUD_API_KEY".into())
}

fn default_gemini_api_key_env() -> Option<String> {
    Some("GEMINI_API_KEY".into())
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cloud_api_key: None,
            cloud_api_key_env: default_cloud_api_key_env(),
            cloud_credentials_file: default_cloud_credentials_file(),
            gemini_api_key: None,
            gemini_api_key_env: default_gemini_api_key_env(),
            gemini_key_file: default_gemini_key_file(),
        }
    }
}

impl CredentialsConfig {
    /// Resolve the cloud credential: direct key, then env var, then credentials file.
    pub fn resolve_cloud_credential(&self) -> Option<CloudCredential> {
        if let Some(key) = resolve_secret_field(&self.cloud_api_key, &self.cloud_api_key_env) {
            return Some(CloudCredential::ApiKey(key));
        }
        read_secret_file(Path::new(&self.cloud_credentials_file))
            .and_then(|contents| CloudCredential::from_file_contents(&contents))
    }

    /// Resolve the Gemini key: direct key, then env var, then key file.
    pub fn resolve_gemini_key(&self) -> Option<String> {
        resolve_secret_field(&self.gemini_api_key, &self.gemini_api_key_env)
            .or_else(|| read_secret_file(Path::new(&self.gemini_key_file)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sample rate of uploaded LINEAR16 audio (default: 16000).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Prompt template; must contain `{transcript}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reply: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub voice_gender: VoiceGender,

    /// Exact voice name (e.g. "es-ES-Standard-A"); provider picks one if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "voice_relay_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Read a secret from a file, trimming surrounding whitespace.
pub fn read_secret_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Secret file not readable");
            None
        }
    }
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(VoiceRelayError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config =
            json5::from_str(&substituted).map_err(|e| VoiceRelayError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path (in the working directory).
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_port)
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// URL prefix for served audio, without surrounding slashes.
    pub fn public_prefix(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.public_prefix.as_deref())
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "temp".to_string())
    }

    pub fn default_language(&self) -> LanguageTag {
        self.server
            .as_ref()
            .and_then(|s| s.default_language.clone())
            .unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .server
            .as_ref()
            .and_then(|s| s.request_timeout_secs)
            .unwrap_or(60);
        Duration::from_secs(secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server
            .as_ref()
            .and_then(|s| s.max_upload_bytes)
            .unwrap_or(10 * 1024 * 1024)
    }

    /// Directory audio files are written to and served from.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.dir.as_ref())
            .map(|d| {
                let expanded = shellexpand::tilde(d);
                PathBuf::from(expanded.as_ref())
            })
            .unwrap_or_else(|| PathBuf::from("temp"))
    }

    pub fn max_age_secs(&self) -> u64 {
        self.storage
            .as_ref()
            .map(|s| s.max_age_secs)
            .unwrap_or_else(default_max_age_secs)
    }

    pub fn max_files(&self) -> usize {
        self.storage
            .as_ref()
            .map(|s| s.max_files)
            .unwrap_or_else(default_max_files)
    }

    pub fn sweep_interval(&self) -> Duration {
        let secs = self
            .storage
            .as_ref()
            .map(|s| s.sweep_interval_secs)
            .unwrap_or_else(default_sweep_interval_secs);
        Duration::from_secs(secs.max(1))
    }

    /// Credentials section, or the defaults (env vars and key files).
    pub fn credentials(&self) -> CredentialsConfig {
        self.credentials.clone().unwrap_or_default()
    }

    pub fn sample_rate_hertz(&self) -> u32 {
        self.speech
            .as_ref()
            .and_then(|s| s.sample_rate_hertz)
            .unwrap_or(16_000)
    }

    pub fn gemini_model(&self) -> String {
        self.generation
            .as_ref()
            .and_then(|g| g.model.clone())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string())
    }

    pub fn persona(&self) -> String {
        self.generation
            .as_ref()
            .and_then(|g| g.persona.clone())
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string())
    }

    pub fn fallback_reply(&self) -> String {
        self.generation
            .as_ref()
            .and_then(|g| g.fallback_reply.clone())
            .unwrap_or_else(|| DEFAULT_FALLBACK_REPLY.to_string())
    }

    pub fn voice_gender(&self) -> VoiceGender {
        self.synthesis
            .as_ref()
            .map(|s| s.voice_gender)
            .unwrap_or_default()
    }

    /// Get a config value by dotted path (e.g. "server.port").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let credentials = self.credentials();
        if credentials.resolve_cloud_credential().is_none() {
            errors.push(format!(
                "No Google Cloud credential: set credentials.cloud_api_key, ${} or create {}",
                credentials.cloud_api_key_env.as_deref().unwrap_or("GOOGLE_CLOUD_API_KEY"),
                credentials.cloud_credentials_file,
            ));
        }
        if credentials.resolve_gemini_key().is_none() {
            warnings.push(format!(
                "No Gemini API key ({} missing); every reply will be the fallback",
                credentials.gemini_key_file,
            ));
        }

        if !self.persona().contains("{transcript}") {
            warnings.push("generation.persona has no {transcript} placeholder".to_string());
        }

        if self.port() == 0 {
            errors.push("Server port cannot be 0".to_string());
        }

        if self.sample_rate_hertz() == 0 {
            errors.push("speech.sample_rate_hertz cannot be 0".to_string());
        }

        if self.max_age_secs() == 0 && self.max_files() == 0 {
            warnings.push("Audio retention disabled; files accumulate without limit".to_string());
        }

        (warnings, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_credentials() -> CredentialsConfig {
        CredentialsConfig {
            cloud_api_key: None,
            cloud_api_key_env: None,
            cloud_credentials_file: "/nonexistent/gcloud-key.json".into(),
            gemini_api_key: None,
            gemini_api_key_env: None,
            gemini_key_file: "/nonexistent/gemini-key.txt".into(),
        }
    }

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_VR_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_VR_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_VR_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_VR_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 8000);
        assert_eq!(config.bind_addr(), "0.0.0.0");
        assert_eq!(config.public_prefix(), "temp");
        assert_eq!(config.storage_dir(), PathBuf::from("temp"));
        assert_eq!(config.default_language().as_str(), "es-ES");
        assert_eq!(config.sample_rate_hertz(), 16_000);
        assert_eq!(config.gemini_model(), "gemini-2.0-flash");
        assert_eq!(config.fallback_reply(), DEFAULT_FALLBACK_REPLY);
        assert_eq!(config.voice_gender(), VoiceGender::Female);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert!(config.persona().contains("{transcript}"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/voice-relay.json")).unwrap();
        assert_eq!(config.port(), 8000);
    }

    #[test]
    fn test_load_json5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice-relay.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                server: { port: 9100, public_prefix: "/audio/", default_language: "en-US" },
                storage: { dir: "/tmp/vr", max_files: 10 },
                synthesis: { voice_gender: "MALE" },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port(), 9100);
        assert_eq!(config.public_prefix(), "audio");
        assert_eq!(config.default_language().as_str(), "en-US");
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/vr"));
        assert_eq!(config.max_files(), 10);
        assert_eq!(config.max_age_secs(), 3600);
        assert_eq!(config.voice_gender(), VoiceGender::Male);
    }

    #[test]
    fn test_load_rejects_bad_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice-relay.json");
        std::fs::write(&path, r#"{ server: { default_language: "not a tag" } }"#).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, VoiceRelayError::Config(_)));
    }

    #[test]
    fn test_cloud_credential_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gcloud-key.json");
        std::fs::write(&file, r#"{"access_token": "ya29.from-file"}"#).unwrap();

        let mut creds = no_credentials();
        creds.cloud_credentials_file = file.to_string_lossy().into_owned();
        assert_eq!(
            creds.resolve_cloud_credential(),
            Some(CloudCredential::BearerToken("ya29.from-file".into()))
        );

        creds.cloud_api_key = Some("direct-key".into());
        assert_eq!(
            creds.resolve_cloud_credential(),
            Some(CloudCredential::ApiKey("direct-key".into()))
        );
    }

    #[test]
    fn test_gemini_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gemini-key.txt");
        std::fs::write(&file, "  gem-key\n").unwrap();

        let mut creds = no_credentials();
        assert_eq!(creds.resolve_gemini_key(), None);
        creds.gemini_key_file = file.to_string_lossy().into_owned();
        assert_eq!(creds.resolve_gemini_key(), Some("gem-key".into()));
    }

    #[test]
    fn test_gemini_key_from_env() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_VR_GEMINI", "from-env") };
        let mut creds = no_credentials();
        creds.gemini_api_key_env = Some("TEST_VR_GEMINI".into());
        assert_eq!(creds.resolve_gemini_key(), Some("from-env".into()));
        unsafe { std::env::remove_var("TEST_VR_GEMINI") };
    }

    #[test]
    fn test_get_path() {
        let config = Config {
            server: Some(ServerConfig {
                port: 8123,
                bind: None,
                public_prefix: None,
                default_language: None,
                request_timeout_secs: None,
                max_upload_bytes: None,
            }),
            ..Config::default()
        };
        assert_eq!(config.get_path("server.port"), Some(serde_json::json!(8123)));
        assert_eq!(config.get_path("storage.dir"), None);
    }

    #[test]
    fn test_logging_config_defaults() {
        let json_str = r#"{ "logging": {} }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());

        // An absent section and an empty one mean the same thing.
        let absent = LoggingConfig::default();
        assert_eq!(absent.format, logging.format);
        assert_eq!(absent.output, logging.output);
    }

    #[test]
    fn test_partial_credentials_keep_env_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice-relay.json");
        std::fs::write(&path, r#"{ credentials: { gemini_key_file: "keys/gemini.txt" } }"#).unwrap();

        let creds = Config::load(&path).unwrap().credentials();
        assert_eq!(creds.gemini_key_file, "keys/gemini.txt");
        assert_eq!(creds.cloud_api_key_env.as_deref(), Some("GOOGLE_CLOUD_API_KEY"));
        assert_eq!(creds.gemini_api_key_env.as_deref(), Some("GEMINI_API_KEY"));
        assert_eq!(creds.cloud_credentials_file, "gcloud-key.json");
    }

    #[test]
    fn test_validate_missing_credentials() {
        let config = Config {
            credentials: Some(no_credentials()),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("Google Cloud")),
            "Expected an error about the cloud credential, got: {errors:?}"
        );
        assert!(
            warnings.iter().any(|w| w.contains("Gemini")),
            "Expected a warning about the Gemini key, got: {warnings:?}"
        );
    }

    #[test]
    fn test_validate_persona_placeholder() {
        let config = Config {
            credentials: Some(CredentialsConfig {
                cloud_api_key: Some("k".into()),
                gemini_api_key: Some("g".into()),
                ..no_credentials()
            }),
            generation: Some(GenerationConfig {
                persona: Some("No placeholder here".into()),
                ..GenerationConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert!(warnings.iter().any(|w| w.contains("{transcript}")));
    }
}
