use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;

use harvest_server::{app, logging, AppState, StartupError};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("harvest-server: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let env_file = dotenvy::dotenv().ok();
    let config = harvest::load_from_env()?;
    logging::init(&config.logging)?;

    info!("Starting harvest-server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = env_file {
        info!("Loaded environment from {}", path.display());
    }

    let state = Arc::new(AppState::from_config(&config)?);

    let report = state.runner.recover().await?;
    if !report.failed.is_empty() {
        warn!(
            "{} job(s) were interrupted by the previous shutdown",
            report.failed.len()
        );
    }

    let signal_state = Arc::clone(&state);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        signal_state.begin_shutdown();
    })?;

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let mut shutdown = state.shutdown_signal();
    axum::serve(listener, app(Arc::clone(&state), &config.server.allowed_origins))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("HTTP server stopped, draining queued jobs...");
    state.runner.shutdown();
    state.runner.wait().await;
    info!("Shutdown complete");
    Ok(())
}
