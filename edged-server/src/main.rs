//! `edged` — the peer-assisted CDN edge content node binary.
//!
//! Wires together the content store, disk loader, filesystem watcher, sync loop, p2p
//! client, and TLS content server, then waits for a shutdown signal to tear everything
//! down in order.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use edged_core::{Args, ContentStore, DiskLoader, P2pClient, SyncLoop};
use edged_server::{routes, tls};
use tracing::info;
use tracing_subscriber::prelude::*;

use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("no rustls crypto provider installed yet");

    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = Arc::new(edged_core::load_config(&args)?);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("edged_core={0},edged_server={0}", config.log_level).into()
    });

    if config.log_pretty {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(
        content_directory = %config.content_directory.display(),
        content_port = config.content_port,
        "edged starting up"
    );

    let content_store = ContentStore::new();
    let running = Arc::new(AtomicBool::new(true));

    let p2p = Arc::new(P2pClient::new(config.clone()));
    tokio::spawn(p2p.clone().connect());

    let loader = Arc::new(DiskLoader::new(
        config.content_directory.clone(),
        content_store.clone(),
        p2p.clone(),
    ));

    edged_core::watcher::spawn(config.content_directory.clone(), loader.clone());

    Arc::new(SyncLoop::new(config.clone(), content_store.clone(), p2p.clone())).spawn();

    loader.reload().await?;

    let rustls_config = tls::load_rustls_config(&config).await?;

    let app = routes::router(AppState {
        content: content_store,
        running: running.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.content_port));
    let handle = axum_server::Handle::new();
    info!(%addr, "content server listening");

    let serve_handle = handle.clone();
    let server = tokio::spawn(async move {
        axum_server::bind_rustls(addr, rustls_config)
            .handle(serve_handle)
            .serve(app.into_make_service())
            .await
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, leaving overlay and draining connections");

    running.store(false, std::sync::atomic::Ordering::Release);
    p2p.leave_if_joined().await;
    handle.graceful_shutdown(Some(Duration::from_secs(5)));

    server.await??;
    info!("edged exited cleanly");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
