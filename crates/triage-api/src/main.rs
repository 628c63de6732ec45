use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use triage_core::{Config, Database, TriageCoordinator};

mod error;
mod routes;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .common
        .config
        .unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;

    let db = Database::open_with(&config.database, &config.engine).await?;
    let coordinator = TriageCoordinator::new(Arc::new(db), config.engine.clone());

    if cli.common.seed {
        let report = triage_core::seed::seed(&coordinator, &config.seed).await?;
        info!(?report, "seed finished");
    }

    let app = routes::build_router(routes::AppState { coordinator });

    let host: std::net::IpAddr = cli
        .common
        .host
        .as_deref()
        .unwrap_or(&config.api.host)
        .parse()?;
    let addr = SocketAddr::new(host, cli.common.port.unwrap_or(config.api.port));
    info!("Starting API server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Parser)]
#[command(author, version, about = "HTTP API server for triage")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to bind (defaults to api.host from config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (defaults to api.port from config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Load demo agents, templates, and conversations into an empty database
    #[arg(long)]
    seed: bool,
}
