mod cli;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use burrow_gateway::generator::RandomGenerator;
use burrow_gateway::identity::CookieSigner;
use burrow_gateway::{App, AppState};
use burrow_storage::Store;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse();
    init_tracing(config.log_json);

    info!(
        listen_addr = %config.listen_addr,
        base_url = %config.base_url,
        file_storage_path = %config.file_storage_path.display(),
        database = config.database_dsn.is_some(),
        "starting burrow http server"
    );

    let signer = match config.secret_key.as_deref() {
        Some(secret) => CookieSigner::new(secret),
        None => {
            warn!("no cookie secret configured, user cookies will not survive a restart");
            CookieSigner::ephemeral()
        }
    }
    .map_err(|err| anyhow!("invalid cookie secret: {err}"))?;

    let store = Arc::new(Store::open(&config.storage_config()).await);
    if store.is_degraded() {
        warn!(backend = %store.backend(), "running on fallback store, liveness will fail");
    }
    let state = AppState::new(
        Arc::clone(&store),
        RandomGenerator,
        signer,
        config.base_url.clone(),
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(listen_addr = %listener.local_addr()?, backend = %store.backend(), "listening");

    let served = axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // flush or disconnect even when serving failed
    store.shutdown().await;
    served.context("http server failed")?;

    info!("bye");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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
