//! The object descriptor: a bucket/key pair bound to one storage backend.
//!
//! An `Object` is a descriptor, not a handle to server-side state. The only
//! server-side resource it ever refers to is the upload id returned by
//! multipart initiation, which the caller must retain and pass back.

use crate::{
    errors::{BlobError, BlobResult},
    models::part::CompletedPart,
    services::{BlockStorage, MultipartInit},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Names a blob inside a bucket on a specific backend.
///
/// Bucket and key are fixed at construction; metadata, expiry and part count
/// may be adjusted before the first presign call.
#[derive(Clone)]
pub struct Object {
    store: Arc<dyn BlockStorage>,
    bucket: String,
    key: String,
    /// Unix seconds after which a token naming this object is stale.
    /// `None` means no expiry is enforced.
    valid_till: Option<i64>,
    metadata: HashMap<String, String>,
    parts: i32,
}

impl Object {
    pub fn new(
        store: Arc<dyn BlockStorage>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            valid_till: None,
            metadata: HashMap::new(),
            parts: 1,
        }
    }

    /// Configure the object for a multipart upload of `parts` chunks.
    pub fn with_parts(mut self, parts: i32) -> Self {
        self.parts = parts.max(1);
        self
    }

    pub fn with_valid_till(mut self, unix_seconds: i64) -> Self {
        self.valid_till = Some(unix_seconds);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn parts(&self) -> i32 {
        self.parts
    }

    pub fn valid_till(&self) -> Option<i64> {
        self.valid_till
    }

    pub fn store(&self) -> &Arc<dyn BlockStorage> {
        &self.store
    }

    pub fn set_valid_till(&mut self, unix_seconds: i64) -> &mut Self {
        self.valid_till = Some(unix_seconds);
        self
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn replace_metadata(&mut self, metadata: HashMap<String, String>) -> &mut Self {
        self.metadata = metadata;
        self
    }

    /// Whether a token naming this object is still within its expiry window.
    ///
    /// Receivers of a signed token call this after decoding, before touching
    /// any bytes. Objects without an expiry are always valid.
    pub fn still_valid(&self) -> bool {
        match self.valid_till {
            None => true,
            Some(t) => Utc::now().timestamp() < t,
        }
    }

    /// Presigned URL for a single-shot PUT of this object.
    ///
    /// Usage error if the object was configured for multipart; the backend is
    /// never invoked in that case.
    pub async fn upload_url(&self, timeout: Duration) -> BlobResult<String> {
        if self.parts > 1 {
            return Err(BlobError::WrongInvocation { parts: self.parts });
        }
        self.store.presign_put(self, timeout).await
    }

    /// Presigned URL authorizing a GET of this object.
    pub async fn download_url(&self, timeout: Duration) -> BlobResult<String> {
        self.store.presign_get(self, timeout).await
    }

    /// Presigned URLs for uploading this object in parts, one URL per part
    /// number `1..=parts`, plus the upload session id needed to finalize.
    ///
    /// No parts check here: the backend is the final arbiter, though a
    /// well-formed caller sets `parts > 1` first.
    pub async fn multipart_upload_urls(&self, timeout: Duration) -> BlobResult<MultipartInit> {
        self.store.initiate_multipart(self, timeout).await
    }

    /// Ask the backend to assemble the named parts into the final object.
    pub async fn complete_multipart(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()> {
        self.store.complete_multipart(self, upload_id, parts).await
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("backend", &self.store.name())
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("valid_till", &self.valid_till)
            .field("parts", &self.parts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fs::{FsConfig, FsStorage};
    use tempfile::tempdir;

    fn fs_store(dir: &std::path::Path) -> Arc<FsStorage> {
        Arc::new(
            FsStorage::new(FsConfig {
                base_path: dir.to_path_buf(),
                url_encryption_key: "0123456789abcdef0123456789abcdef".into(),
                retry_count: 0,
            })
            .unwrap(),
        )
    }

    #[test]
    fn still_valid_boundaries() {
        let dir = tempdir().unwrap();
        let store = fs_store(dir.path());
        let now = Utc::now().timestamp();

        let expired = Object::new(store.clone(), "b", "k").with_valid_till(now - 1);
        assert!(!expired.still_valid());

        let fresh = Object::new(store.clone(), "b", "k").with_valid_till(now + 3600);
        assert!(fresh.still_valid());

        let unset = Object::new(store, "b", "k");
        assert!(unset.still_valid());
    }

    #[test]
    fn parts_default_and_floor() {
        let dir = tempdir().unwrap();
        let store = fs_store(dir.path());
        assert_eq!(Object::new(store.clone(), "b", "k").parts(), 1);
        assert_eq!(Object::new(store, "b", "k").with_parts(0).parts(), 1);
    }

    #[tokio::test]
    async fn upload_url_rejects_multipart_objects() {
        let dir = tempdir().unwrap();
        let store = fs_store(dir.path());
        let object = Object::new(store, "b", "k").with_parts(3);

        let err = object
            .upload_url(Duration::from_secs(60))
            .await
            .unwrap_err();
        match err {
            BlobError::WrongInvocation { parts } => assert_eq!(parts, 3),
            other => panic!("expected WrongInvocation, got {other:?}"),
        }
    }

    #[test]
    fn metadata_mutators() {
        let dir = tempdir().unwrap();
        let store = fs_store(dir.path());
        let mut object = Object::new(store, "b", "k");
        object.set_metadata("owner", "reports");
        assert_eq!(object.metadata().get("owner").unwrap(), "reports");

        object.replace_metadata(HashMap::from([("kind".to_string(), "csv".to_string())]));
        assert!(object.metadata().get("owner").is_none());
        assert_eq!(object.metadata().get("kind").unwrap(), "csv");
    }
}
