//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks disk I/O under the storage root

use crate::services::fs::FsStorage;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Cheap liveness probe — always 200, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Best-effort write/read/delete of a temp file under the storage root.
/// 200 when the probe passes, 503 otherwise.
pub async fn readyz(State(storage): State<Arc<FsStorage>>) -> impl IntoResponse {
    let tmp_path = storage
        .base_path()
        .join(format!(".readyz-{}", Uuid::new_v4()));

    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => {
                let _ = fs::remove_file(&tmp_path).await;
                (true, None)
            }
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some("file content mismatch".to_string()))
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some(format!("could not read tmp file: {e}")))
            }
        },
        Err(e) => (false, Some(format!("could not write tmp file: {e}"))),
    };

    let (ok, error) = disk_check;
    let body = ReadyResponse {
        status: if ok { "ok".into() } else { "error".into() },
        disk: CheckStatus { ok, error },
    };
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    disk: CheckStatus,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
