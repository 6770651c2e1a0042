//! Storage backends and the capability contract they all implement.
//!
//! One implementation per storage technology: AWS S3 (`s3`), Azure Blob
//! Storage (`azure`) and the local filesystem (`fs`). Callers pick a backend
//! at `Object` construction time; nothing backend-specific leaks above the
//! `BlockStorage` trait.

use crate::{errors::BlobResult, models::object::Object, models::part::CompletedPart};
use async_trait::async_trait;
use std::time::Duration;

pub mod azure;
pub mod fs;
pub mod s3;

/// Result of initiating a multipart upload: one presigned URL per part
/// number `1..=parts`, in order, plus the session id the backend issued.
#[derive(Debug, Clone)]
pub struct MultipartInit {
    pub part_urls: Vec<String>,
    pub upload_id: String,
}

/// Capability contract implemented once per storage technology.
///
/// Implementations validate their configuration and build any long-lived
/// client state in their constructor, so a value of a backend type is always
/// ready for use and safe to share behind an `Arc` across concurrent callers.
/// No retry logic lives here; retries, if any, belong to the backend SDK.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Stable identifier of the backend variant, for diagnostics only.
    fn name(&self) -> &'static str;

    /// Produce a URL (or opaque token standing in for one) authorizing a
    /// single PUT of the object's bucket/key, valid for `timeout` from now.
    async fn presign_put(&self, object: &Object, timeout: Duration) -> BlobResult<String>;

    /// Same as `presign_put` but authorizes a read.
    async fn presign_get(&self, object: &Object, timeout: Duration) -> BlobResult<String>;

    /// Open a multipart upload session and presign one PUT URL per part.
    /// Called only when `object.parts() > 1`.
    async fn initiate_multipart(
        &self,
        object: &Object,
        timeout: Duration,
    ) -> BlobResult<MultipartInit>;

    /// Assemble the named parts, in ascending part-number order, into the
    /// final object. Fails if parts are missing, out of range, or the
    /// session is unknown; the backend-reported reason is surfaced.
    async fn complete_multipart(
        &self,
        object: &Object,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()>;
}
