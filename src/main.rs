// genguard - Request governance for AI content generation
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use genguard::cli::Args;
use genguard::config::AppConfig;
use genguard::governance::{spawn_sweeper, sweep_once, GovernedGenerationService};
use genguard::server::create_router;
use genguard::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = AppConfig::load(args.config.as_deref())?;

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting genguard v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(run(args, config))
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    // Phase 3: Open stores and build the governed service
    let service = Arc::new(GovernedGenerationService::from_config(&config).await?);

    // Phase 3.5: Handle --sweep-once flag
    if args.sweep_once {
        let report = sweep_once(&service).await?;
        info!(
            "Sweep removed {} cache entries and {} rate-limit windows",
            report.cache_entries_removed, report.rate_limit_entries_removed
        );
        return Ok(());
    }

    if config.upstream.api_key.is_none() {
        warn!("No upstream API key configured; generation calls will be rejected upstream");
    }

    // Phase 4: Background maintenance
    let sweeper = spawn_sweeper(
        service.clone(),
        Duration::from_secs(config.store.sweep_interval_secs.max(1)),
    );

    // Phase 5: Build and start HTTP server
    let app = create_router(config.clone(), service)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
