use anyhow::Result;
use procwatch_daemon::{
    collector::{LinuxProcessCollector, ProcessCollector},
    config::Config,
    service::{run_refresh_loop, ProcessService},
    socket::{handle_client, SocketServer},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn load_config() -> Config {
    let config_path = Config::config_path();
    if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("No config file found, using defaults");
        Config::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("procwatch daemon starting...");

    let config = load_config();

    let socket_path = SocketServer::socket_path(&config);
    let server = SocketServer::bind(&socket_path).await?;

    let collector: Arc<dyn ProcessCollector> = Arc::new(LinuxProcessCollector::new());
    let service = Arc::new(ProcessService::new(
        collector,
        &config,
        server.broadcast_sender(),
    ));

    match service.refresh().await {
        Ok(report) => info!("Initial process list: {} processes", report.added.len()),
        Err(e) => warn!("Initial refresh failed: {}", e),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(run_refresh_loop(Arc::clone(&service), shutdown.clone()));

    info!("Daemon ready, listening for connections...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let service = Arc::clone(&service);
                    let broadcast_rx = server.broadcast_sender().subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, broadcast_rx, service).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    shutdown.cancel();
    let stopped = service.shutdown();
    info!("Stopped {} tracking sessions", stopped);
    Ok(())
}
