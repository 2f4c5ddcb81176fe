//! Buildtrace server — CI build-log ingestion service.
//!
//! Accepts crawl triggers over HTTP, polls the CI system until the build
//! finishes, and archives the normalized log record independent of the CI
//! system's own retention window.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use buildtrace_crawler::{TracingSink, build_crawler};
use buildtrace_server::routes::{self, AppState};
use buildtrace_shared::{AppConfig, load_config, load_config_from};
use buildtrace_storage::open_storage;

/// Ingest and archive CI build logs.
#[derive(Parser)]
#[command(
    name = "buildtrace",
    version,
    about = "Ingest and archive CI build logs independent of the CI system's retention.",
    long_about = None,
)]
struct Cli {
    /// Path to a buildtrace.toml config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port from the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Log format override: text or json.
    #[arg(long)]
    log_format: Option<String>,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    init_tracing(&cli, &config);

    let storage = open_storage(&config).await?;
    let sink = Arc::new(TracingSink);
    let crawler = build_crawler(&config, storage.clone(), sink)?;

    let addr = format!(
        "{}:{}",
        config.server.address,
        cli.port.unwrap_or(config.server.port)
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        flavor = crawler.name(),
        backend = %config.storage.backend,
        %addr,
        "launching buildtrace"
    );

    let state = AppState {
        config: Arc::new(config),
        storage,
        crawler,
    };
    let router = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Initialize tracing from CLI flags and config.
fn init_tracing(cli: &Cli, config: &AppConfig) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".into(),
        _ => "trace".into(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());

    if format == "json" {
        fmt().json().with_env_filter(env_filter).init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}
