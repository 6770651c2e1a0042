//! Error types shared by the backend layer and the HTTP surface.
//!
//! Every variant carries enough context (bucket, key, part number, upload id)
//! to diagnose a failure at the call site; nothing is logged and swallowed
//! inside the storage layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    /// Missing or invalid required configuration at construction time.
    /// Fatal: the backend cannot be used at all.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// Single-shot upload requested on an object configured for multipart.
    #[error("wrong invocation: object is configured with {parts} parts, use multipart_upload_urls")]
    WrongInvocation { parts: i32 },

    /// Caller-supplied input is structurally wrong (empty token, bad part
    /// numbers, delimiter in bucket/key, missing form field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend failed to produce a presigned URL.
    #[error(
        "presign failed for {bucket}/{key}{}: {reason}",
        .part.map(|p| format!(" part {p}")).unwrap_or_default()
    )]
    Signing {
        bucket: String,
        key: String,
        part: Option<i32>,
        reason: String,
    },

    /// Multipart completion rejected by the backend.
    #[error("multipart completion failed for {bucket}/{key} upload {upload_id}: {reason}")]
    Finalize {
        bucket: String,
        key: String,
        upload_id: String,
        reason: String,
    },

    /// A signed token failed to decode, decrypt, or parse.
    #[error("invalid signed url: {reason}")]
    InvalidSignedUrl { reason: String },

    /// The token decoded fine but its embedded expiry has passed.
    #[error("signed url expired for {bucket}/{key}")]
    Expired { bucket: String, key: String },

    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BlobError {
    /// HTTP status for the filesystem HTTP surface: validation and token
    /// problems are client errors, everything else is on us.
    pub fn status(&self) -> StatusCode {
        match self {
            BlobError::Validation(_)
            | BlobError::InvalidSignedUrl { .. }
            | BlobError::WrongInvocation { .. } => StatusCode::BAD_REQUEST,
            BlobError::Expired { .. } => StatusCode::FORBIDDEN,
            BlobError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BlobError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type BlobResult<T> = Result<T, BlobError>;
