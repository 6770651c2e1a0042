//! HTTP handlers for the filesystem backend's object server.
//!
//! Both endpoints consume a signed token issued by the fs backend: uploads
//! carry it as `dest`, downloads as `src`. The token is decoded back into an
//! object descriptor and checked for expiry before any disk I/O happens.

use crate::{
    errors::{BlobError, BlobResult},
    services::fs::FsStorage,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub dest: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub src: Option<String>,
}

/// Returned on a successful upload. The etag is the MD5 of the received
/// bytes, which multipart callers echo back as `CompletedPart.etag`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub etag: String,
    pub size_bytes: usize,
}

/// `POST /api/v1/bos/upload?dest=<token>` with multipart form field `file`.
pub async fn upload_object(
    State(storage): State<Arc<FsStorage>>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, BlobError> {
    let dest = query.dest.unwrap_or_default();
    if dest.is_empty() {
        return Err(BlobError::Validation("dest is empty".into()));
    }

    let object = storage.decode_signed_url(&dest)?;
    if !object.still_valid() {
        return Err(BlobError::Expired {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
        });
    }

    let data = extract_file(&mut multipart).await?;
    storage.write_object(&object, &data).await?;

    let etag = format!("{:x}", md5::compute(&data));
    info!(
        bucket = object.bucket(),
        key = object.key(),
        size_bytes = data.len(),
        "object uploaded"
    );
    Ok(Json(UploadResponse {
        etag,
        size_bytes: data.len(),
    }))
}

/// `GET /api/v1/bos/download?src=<token>` — raw object bytes, streamed.
pub async fn download_object(
    State(storage): State<Arc<FsStorage>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, BlobError> {
    let src = query.src.unwrap_or_default();
    if src.is_empty() {
        return Err(BlobError::Validation("src is empty".into()));
    }

    let object = storage.decode_signed_url(&src)?;
    if !object.still_valid() {
        return Err(BlobError::Expired {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
        });
    }

    let file = storage.read_object(&object).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}

/// Pull the bytes of the `file` field out of the multipart form.
async fn extract_file(multipart: &mut Multipart) -> BlobResult<Bytes> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| BlobError::Validation(format!("malformed multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            return field
                .bytes()
                .await
                .map_err(|err| BlobError::Validation(format!("reading form file failed: {err}")));
        }
    }
    Err(BlobError::Validation("file not submitted".into()))
}
