//! Routes for the filesystem object server.
//!
//! ## Structure
//! - `POST /api/v1/bos/upload?dest=<token>` — receive file bytes for a signed token
//! - `GET  /api/v1/bos/download?src=<token>` — serve object bytes for a signed token
//! - `GET  /healthz`, `GET /readyz` — probes
//!
//! The router carries the shared `FsStorage` so handlers can decode tokens
//! and touch disk through one backend instance.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{download_object, upload_object},
    },
    services::fs::FsStorage,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Build and return the router for the object-server endpoints.
pub fn routes() -> Router<Arc<FsStorage>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/v1/bos/upload", post(upload_object))
        .route("/api/v1/bos/download", get(download_object))
}
