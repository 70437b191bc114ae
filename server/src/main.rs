//! Kanji Classifier Server
//!
//! HTTP API for classifying uploaded images and for triggering training and
//! evaluation runs against the configured assets directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use kanji_classifier::backend::{backend_name, TrainingBackend};
use kanji_classifier::utils::logging::{init_logging, LogConfig};
use kanji_classifier::{AppConfig, BurnEngine, ClassifierEngine};
use kanji_server::{build_router, AppState};

/// Kanji Classifier Server
#[derive(Parser, Debug)]
#[command(name = "kanji-server")]
#[command(version)]
#[command(about = "HTTP API for the Kanji image classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "KANJI_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "KANJI_HOST")]
    host: Option<String>,

    /// Optional TOML configuration file
    #[arg(short, long, env = "KANJI_CONFIG")]
    config: Option<PathBuf>,

    /// Project root holding `assets/` and the artifact
    #[arg(long, env = "KANJI_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Artifact location, relative to the project root unless absolute
    #[arg(long, env = "KANJI_ARTIFACT")]
    artifact: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_sources(cli.config.as_deref(), cli.project_dir, cli.artifact)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if cli.verbose {
        config.logging = LogConfig::verbose();
    }
    init_logging(&config.logging)?;

    info!("Kanji Classifier Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Project dir: {:?}", config.project_dir);
    info!("  Assets dir:  {:?}", config.assets_dir());
    info!("  Artifact:    {:?}", config.artifact_path());
    info!("  Backend:     {}", backend_name());

    let engine: Arc<dyn ClassifierEngine> = Arc::new(BurnEngine::<TrainingBackend>::default());
    let addr: SocketAddr = config.server.bind_address().parse()?;
    let load_on_startup = config.server.load_model_on_startup;

    let state = Arc::new(AppState::new(config, engine));

    if load_on_startup {
        let loader = state.clone();
        match tokio::task::spawn_blocking(move || loader.load_service()).await? {
            Ok(service) => {
                state.install(service).await;
            }
            Err(e) => warn!(
                "No model loaded ({}). Train via /api/Training/train, then POST /api/Classification/reload",
                e
            ),
        }
    }

    let app = build_router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
