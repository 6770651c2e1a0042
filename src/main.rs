use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::fs::{FsConfig, FsStorage};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting blobsign object server, base path {}",
        cfg.base_path.display()
    );

    // --- Ensure storage directory exists ---
    if !cfg.base_path.exists() {
        fs::create_dir_all(&cfg.base_path)?;
        tracing::info!("Created storage directory at {}", cfg.base_path.display());
    }

    // --- Initialize the filesystem backend ---
    let storage = Arc::new(FsStorage::new(FsConfig {
        base_path: cfg.base_path.clone(),
        url_encryption_key: cfg.url_encryption_key.clone(),
        retry_count: 0,
    })?);

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(storage);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
