//! Advert read API server.
//!
//! Serves adverts and categories from a search cluster over HTTP.

use clap::Parser;
use docstore_api::{initialize, logging, router, AppConfig};
use std::path::PathBuf;
use tracing::{info, warn};

/// Advert read API.
#[derive(Parser)]
#[command(name = "advert-read-api")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "configs/app.toml")]
    config: PathBuf,

    /// Cluster to read from, overriding `store.cluster`
    #[arg(long)]
    cluster: Option<String>,

    /// Port to listen on, overriding `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(cluster) = cli.cluster {
        config.store.cluster = cluster;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    logging::init(&config.log.level);

    let handlers = initialize(&config).await?;
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(handlers))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
