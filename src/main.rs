use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

mod api;
mod autoreply;
mod bank;
mod classifier;
mod config;
mod domain;
mod error;
mod ingest;
mod notify;
mod routing;
mod sla;
mod stats;
mod store;

pub use config::Config;
pub use error::AppError;

use autoreply::AutoReplyEngine;
use bank::{embedding::HashEmbedder, ResponseBank};
use classifier::ClassifierGateway;
use ingest::AppState;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When invoked as a Docker HEALTHCHECK, hit /healthz and exit immediately.
    // This avoids needing any external tool (curl/wget) in the container image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpdesk_core=info,tower_http=warn".into()),
        )
        .init();

    // Load config
    let config = load_config()?;

    info!(
        port = config.server.port,
        database = %config.database.url,
        classifier = %config.classifier.url,
        "helpdesk-core starting"
    );

    let store = Store::connect(&config.database.url)
        .await
        .context("connecting to the ticket store")?;

    let classifier = ClassifierGateway::new(&config.classifier);

    // A broken response bank disables auto-reply for the process lifetime;
    // ingestion keeps working and routes would-be Automated tickets to
    // GeneralSupport.
    let autoreply = match ResponseBank::load(
        config.autoreply.responses_path.as_ref(),
        config.autoreply.cache_dir.as_ref(),
        Box::new(HashEmbedder::default()),
    ) {
        Ok(bank) => Some(AutoReplyEngine::new(Arc::new(bank), config.autoreply.clone())),
        Err(e) => {
            warn!(error = %e, "response bank unavailable — auto-reply disabled");
            None
        }
    };

    let config = Arc::new(config);
    let state = Arc::new(AppState {
        store: store.clone(),
        classifier,
        autoreply,
        config: Arc::clone(&config),
    });

    // SLA escalation loop runs until we signal shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(sla::run_escalation_loop(
        store,
        config.sla.sweep_interval_secs,
        config.sla.escalation_window_hours,
        shutdown_rx,
    ));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");

    let app = api::router(state);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("API server error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Let the SLA loop finish its current ticket and exit.
    let _ = shutdown_tx.send(true);

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::var("HDC_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        Err(_) => {
            let default_path = PathBuf::from("/etc/helpdesk-core/config.toml");
            if default_path.exists() {
                Config::load(&default_path)
                    .with_context(|| format!("failed to load config from {}", default_path.display()))
            } else {
                info!("no config file found — using built-in defaults");
                Config::from_defaults()
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lightweight healthcheck: GET /healthz and exit 0 on 200, 1 otherwise.
/// Invoked via `helpdesk-core --healthcheck` from Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("HDC_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{port}/healthz");
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
