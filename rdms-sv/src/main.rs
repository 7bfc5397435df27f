//! rdms-sv - Research data governance supervisor service

use anyhow::Result;
use clap::Parser;
use rdms_common::config::{ensure_data_dir, resolve_data_dir, resolve_port, ServiceConfig};
use rdms_common::db::init_database;
use rdms_sv::{build_router, AppState};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rdms-sv", about = "Research data governance supervisor")]
struct Cli {
    /// Data directory holding the supervisor database
    #[arg(long)]
    data_dir: Option<String>,

    /// Port for the HTTP API
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting rdms-sv v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = ServiceConfig {
        data_dir: resolve_data_dir(cli.data_dir.as_deref()),
        port: resolve_port(cli.port),
    };
    ensure_data_dir(&config.data_dir)?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await?;

    let state = AppState::new(pool);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("rdms-sv listening on http://0.0.0.0:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/health", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
