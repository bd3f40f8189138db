//! Ong agent binary: the room worker for the conversational avatar.
//!
//! Validates the environment, serves the LiveKit webhook endpoint and shuts
//! down gracefully on SIGTERM/SIGINT, giving running sessions time to clean up.

use ong_agent::config::{self, Secrets};
use ong_agent::{logging, worker, WorkerState};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("ONG_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = match config::load_config(selected_config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let secrets = Secrets::from_env();
    logging::init_tracing(&config.logging, secrets.redactions(&config));

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if let Err(e) = config::validate(&config, &secrets) {
        tracing::error!("{}", e);
        tracing::error!("the agent cannot start without LiveKit, Simli and Gemini credentials");
        return ExitCode::FAILURE;
    }
    tracing::info!("environment validated");

    let state = Arc::new(WorkerState::from_config(&config, secrets));
    let addr = SocketAddr::new(config.server.host, config.server.port);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind webhook listener: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "ong agent listening for room webhooks");

    let served = axum::serve(listener, worker::app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = served {
        tracing::error!("server error: {}", e);
    }

    if !worker::drain(&state, config.worker.shutdown_timeout()).await {
        tracing::warn!("exiting with room jobs still cleaning up");
    }
    tracing::info!("ong agent shut down");
    ExitCode::SUCCESS
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
