use anyhow::Context;
use std::net::SocketAddr;
use tracing::{error, info};

use polyphon::{config::AppConfig, logging, state::AppState, web};

#[tokio::main]
async fn main() {
    // Configuration errors are reported before logging exists
    let config = match AppConfig::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = match logging::init_logging_with_options(
        None,
        config.paths.logfile.as_deref(),
        config.server.debug,
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    logging::log_startup_info(&config);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = AppState::from_config(config)?;
    let supervisor = state.supervisor.clone();
    let app = web::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down player...");
    supervisor.shutdown().await;
    info!("Goodbye.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
