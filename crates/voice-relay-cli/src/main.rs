mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use voice_relay_core::config::Config;
use voice_relay_gateway::AppState;
use voice_relay_gateway::state::open_store;

#[derive(Parser)]
#[command(
    name = "voice-relay",
    about = "Voice relay: speech in, generated reply out as speech",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ./voice-relay.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show resolved settings and stored audio
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Apply the audio retention policy once
    Sweep,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value (dotted path, e.g. server.port)
    Get { key: String },
    /// Check credentials and settings
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose);
    tracing::debug!(path = %config_path.display(), "Config loaded");

    match cli.command {
        Commands::Serve { port, bind } => {
            let port = port.unwrap_or_else(|| config.port());
            let bind = bind.unwrap_or_else(|| config.bind_addr());

            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if let Some(first) = errors.first() {
                anyhow::bail!("invalid configuration: {first}");
            }

            let state = AppState::from_config(Arc::new(config)).await?;
            #[cfg(feature = "metrics")]
            let state = AppState {
                prometheus: Some(voice_relay_gateway::metrics::install_prometheus_recorder()?),
                ..state
            };

            tracing::info!("Starting voice relay on {bind}:{port}");
            voice_relay_gateway::start_server(Arc::new(state), &bind, port).await?;
        }
        Commands::Status => {
            println!("Voice Relay v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Listen: {}:{}", config.bind_addr(), config.port());
            println!(
                "Audio dir: {} (served at /{})",
                config.storage_dir().display(),
                config.public_prefix()
            );
            match open_store(&config).await {
                Ok(store) => println!("Audio files: {}", store.count().await?),
                Err(e) => println!("Audio files: unavailable ({e})"),
            }
            println!("Default language: {}", config.default_language());
            println!("Gemini model: {}", config.gemini_model());

            let creds = config.credentials();
            println!(
                "Cloud credential: {}",
                present(creds.resolve_cloud_credential().is_some())
            );
            println!(
                "Gemini key: {}",
                present(creds.resolve_gemini_key().is_some())
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("{key} is not set"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
        Commands::Sweep => {
            let store = open_store(&config).await?;
            let report = store.sweep().await?;
            println!(
                "Scanned {} file(s): removed {} expired, {} over the limit",
                report.scanned, report.expired, report.overflow
            );
        }
    }

    Ok(())
}

fn present(found: bool) -> &'static str {
    if found { "configured" } else { "missing" }
}
