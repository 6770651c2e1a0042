//! Local filesystem backend.
//!
//! Local disk has no native request signing, so this backend substitutes an
//! encrypted token for a presigned URL: `"<bucket>:<key>:<unixExpirySeconds>"`
//! sealed with XChaCha20-Poly1305 under a pre-shared 32-byte key, a fresh
//! random nonce prepended to the ciphertext, the whole thing base64-url
//! encoded. The AEAD tag means a tampered or truncated token fails to decode
//! instead of yielding plausible garbage.
//!
//! The same struct also performs the disk I/O driven by decoded tokens
//! (consumed by the HTTP handlers) and implements multipart as staged part
//! files concatenated in part-number order on completion.

use crate::{
    errors::{BlobError, BlobResult},
    models::{object::Object, part::CompletedPart},
    services::{BlockStorage, MultipartInit},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use chrono::Utc;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const TOKEN_DELIMITER: char = ':';
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const MAX_KEY_LEN: usize = 1024;

/// Staging area for in-flight multipart uploads, under each bucket.
const STAGING_PREFIX: &str = ".mpu";

#[derive(Debug, Clone, Deserialize)]
pub struct FsConfig {
    pub base_path: PathBuf,

    /// Symmetric key sealing signed tokens. Must be exactly 32 bytes; every
    /// verifier of tokens issued here needs the same key.
    pub url_encryption_key: String,

    /// Accepted for config parity with the cloud backends; local disk I/O
    /// performs no retries.
    #[serde(default)]
    pub retry_count: u32,
}

pub struct FsStorage {
    base_path: PathBuf,
    cipher: XChaCha20Poly1305,
}

impl FsStorage {
    /// Validates the configuration and binds the cipher. The base path must
    /// already exist; a missing storage root is a deployment problem, not
    /// something to paper over at runtime.
    pub fn new(cfg: FsConfig) -> BlobResult<Self> {
        if cfg.url_encryption_key.len() != KEY_LEN {
            return Err(BlobError::Configuration {
                reason: format!(
                    "url_encryption_key must be exactly {KEY_LEN} bytes, got {}",
                    cfg.url_encryption_key.len()
                ),
            });
        }

        let meta = std::fs::metadata(&cfg.base_path).map_err(|err| BlobError::Configuration {
            reason: format!("base path {} not accessible: {err}", cfg.base_path.display()),
        })?;
        if !meta.is_dir() {
            return Err(BlobError::Configuration {
                reason: format!("base path {} is not a directory", cfg.base_path.display()),
            });
        }

        let key = Key::from_slice(cfg.url_encryption_key.as_bytes());
        Ok(Self {
            base_path: cfg.base_path,
            cipher: XChaCha20Poly1305::new(key),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Seal `bucket:key:expiry` into an opaque url-safe token.
    fn encode_token(&self, bucket: &str, key: &str, valid_till: i64) -> BlobResult<String> {
        if bucket.contains(TOKEN_DELIMITER) || key.contains(TOKEN_DELIMITER) {
            return Err(BlobError::Validation(format!(
                "bucket and key must not contain `{TOKEN_DELIMITER}`"
            )));
        }

        let plaintext = format!("{bucket}{TOKEN_DELIMITER}{key}{TOKEN_DELIMITER}{valid_till}");
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|err| BlobError::Signing {
                bucket: bucket.to_string(),
                key: key.to_string(),
                part: None,
                reason: format!("token encryption failed: {err}"),
            })?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(nonce.as_slice());
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(raw))
    }

    /// Exact inverse of `encode_token`: recover bucket, key and expiry or
    /// fail. Expiry is *not* re-validated here; receivers call
    /// `Object::still_valid` on the result before touching bytes.
    pub fn decode_signed_url(self: &Arc<Self>, token: &str) -> BlobResult<Object> {
        let raw = URL_SAFE
            .decode(token)
            .map_err(|_| BlobError::InvalidSignedUrl {
                reason: "not valid base64".into(),
            })?;
        if raw.len() <= NONCE_LEN {
            return Err(BlobError::InvalidSignedUrl {
                reason: "token too short".into(),
            });
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| BlobError::InvalidSignedUrl {
                reason: "decryption failed".into(),
            })?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| BlobError::InvalidSignedUrl {
            reason: "payload is not utf-8".into(),
        })?;

        let fields: Vec<&str> = plaintext.split(TOKEN_DELIMITER).collect();
        if fields.len() != 3 {
            return Err(BlobError::InvalidSignedUrl {
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        }
        let valid_till: i64 = fields[2].parse().map_err(|_| BlobError::InvalidSignedUrl {
            reason: "expiry is not a unix timestamp".into(),
        })?;

        let store: Arc<dyn BlockStorage> = Arc::clone(self) as Arc<dyn BlockStorage>;
        Ok(Object::new(store, fields[0], fields[1]).with_valid_till(valid_till))
    }

    /// Reject bucket names that would escape the storage root.
    fn ensure_bucket_safe(bucket: &str) -> BlobResult<()> {
        if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
            return Err(BlobError::Validation(format!("invalid bucket `{bucket}`")));
        }
        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors: keys
    /// arrive inside attacker-presented tokens, so a forged-but-decryptable
    /// key must still not escape the bucket directory.
    fn ensure_key_safe(key: &str) -> BlobResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(BlobError::Validation("invalid object key".into()));
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(BlobError::Validation("invalid object key".into()));
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(BlobError::Validation("invalid object key".into()));
        }
        Ok(())
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.base_path.join(bucket).join(key)
    }

    fn staging_dir(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.base_path
            .join(bucket)
            .join(STAGING_PREFIX)
            .join(upload_id)
    }

    fn staging_key(upload_id: &str, part_number: i32) -> String {
        format!("{STAGING_PREFIX}/{upload_id}/{part_number:05}")
    }

    /// Write `data` to `base_path/bucket/key`, creating directories as
    /// needed. Truncate-and-write: re-uploading a key replaces its content.
    pub async fn write_object(&self, object: &Object, data: &[u8]) -> BlobResult<()> {
        Self::ensure_bucket_safe(object.bucket())?;
        Self::ensure_key_safe(object.key())?;

        let path = self.object_path(object.bucket(), object.key());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!(
            bucket = object.bucket(),
            key = object.key(),
            bytes = data.len(),
            "object written"
        );
        Ok(())
    }

    /// Open `base_path/bucket/key` for streaming out. A missing key is a
    /// not-found error, never an implicitly created empty object.
    pub async fn read_object(&self, object: &Object) -> BlobResult<File> {
        Self::ensure_bucket_safe(object.bucket())?;
        Self::ensure_key_safe(object.key())?;

        let path = self.object_path(object.bucket(), object.key());
        File::open(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound {
                    bucket: object.bucket().to_string(),
                    key: object.key().to_string(),
                }
            } else {
                BlobError::Io(err)
            }
        })
    }

    /// Validate the completed-part list: every part number in range, no
    /// duplicates. Returns the parts sorted ascending by part number.
    fn sorted_parts(parts: &[CompletedPart]) -> BlobResult<Vec<CompletedPart>> {
        if parts.is_empty() {
            return Err(BlobError::Validation("no completed parts supplied".into()));
        }
        for part in parts {
            if !part.in_range() {
                return Err(BlobError::Validation(format!(
                    "part number {} out of range",
                    part.part_number
                )));
            }
        }
        let mut sorted = parts.to_vec();
        sorted.sort_by_key(|p| p.part_number);
        if sorted.windows(2).any(|w| w[0].part_number == w[1].part_number) {
            return Err(BlobError::Validation("duplicate part numbers".into()));
        }
        Ok(sorted)
    }
}

impl std::fmt::Debug for FsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in debug output.
        f.debug_struct("FsStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BlockStorage for FsStorage {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn presign_put(&self, object: &Object, timeout: Duration) -> BlobResult<String> {
        let valid_till = Utc::now().timestamp() + timeout.as_secs() as i64;
        self.encode_token(object.bucket(), object.key(), valid_till)
    }

    async fn presign_get(&self, object: &Object, timeout: Duration) -> BlobResult<String> {
        let valid_till = Utc::now().timestamp() + timeout.as_secs() as i64;
        self.encode_token(object.bucket(), object.key(), valid_till)
    }

    /// One token per part, each addressing a staging file under
    /// `.mpu/<upload_id>/` in the object's bucket. Uploading a part through
    /// the object server writes that staging file; completion stitches them
    /// together.
    async fn initiate_multipart(
        &self,
        object: &Object,
        timeout: Duration,
    ) -> BlobResult<MultipartInit> {
        Self::ensure_bucket_safe(object.bucket())?;
        Self::ensure_key_safe(object.key())?;
        let parts = object.parts();
        if parts < 1 || parts > crate::models::part::MAX_PART_NUMBER {
            return Err(BlobError::Validation(format!(
                "part count {parts} out of range"
            )));
        }

        let upload_id = Uuid::new_v4().to_string();
        let valid_till = Utc::now().timestamp() + timeout.as_secs() as i64;
        let mut part_urls = Vec::with_capacity(parts as usize);
        for part_number in 1..=parts {
            part_urls.push(self.encode_token(
                object.bucket(),
                &Self::staging_key(&upload_id, part_number),
                valid_till,
            )?);
        }

        debug!(
            bucket = object.bucket(),
            key = object.key(),
            upload_id,
            parts,
            "multipart upload initiated"
        );
        Ok(MultipartInit {
            part_urls,
            upload_id,
        })
    }

    /// Concatenate staged part files into the final object in ascending
    /// part-number order, then delete the staging directory. Presentation
    /// order of `parts` does not matter.
    async fn complete_multipart(
        &self,
        object: &Object,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()> {
        Self::ensure_bucket_safe(object.bucket())?;
        Self::ensure_key_safe(object.key())?;
        let sorted = Self::sorted_parts(parts)?;

        let finalize = |reason: String| BlobError::Finalize {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            upload_id: upload_id.to_string(),
            reason,
        };

        let staging = self.staging_dir(object.bucket(), upload_id);
        if fs::metadata(&staging).await.is_err() {
            return Err(finalize("unknown upload session".into()));
        }

        // Assemble into a scratch file inside the staging directory; the
        // destination is only replaced once every part has been copied, so a
        // failed completion leaves any existing object untouched.
        let scratch_path = staging.join(".assembling");
        let mut scratch = File::create(&scratch_path).await?;

        for part in &sorted {
            let src_path = staging.join(format!("{:05}", part.part_number));
            let mut src = match File::open(&src_path).await {
                Ok(f) => f,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    drop(scratch);
                    let _ = fs::remove_file(&scratch_path).await;
                    return Err(finalize(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )));
                }
                Err(err) => return Err(BlobError::Io(err)),
            };
            tokio::io::copy(&mut src, &mut scratch).await?;
        }
        scratch.flush().await?;
        drop(scratch);

        let dest_path = self.object_path(object.bucket(), object.key());
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&scratch_path, &dest_path).await?;

        fs::remove_dir_all(&staging).await?;
        debug!(
            bucket = object.bucket(),
            key = object.key(),
            upload_id,
            parts = sorted.len(),
            "multipart upload completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};
    use tokio::io::AsyncReadExt;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";

    fn storage() -> (TempDir, Arc<FsStorage>) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(
            FsStorage::new(FsConfig {
                base_path: dir.path().to_path_buf(),
                url_encryption_key: TEST_KEY.into(),
                retry_count: 0,
            })
            .unwrap(),
        );
        (dir, storage)
    }

    async fn read_to_string(storage: &Arc<FsStorage>, object: &Object) -> String {
        let mut file = storage.read_object(object).await.unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).await.unwrap();
        content
    }

    #[test]
    fn rejects_wrong_key_length() {
        let dir = tempdir().unwrap();
        let err = FsStorage::new(FsConfig {
            base_path: dir.path().to_path_buf(),
            url_encryption_key: "too-short".into(),
            retry_count: 0,
        })
        .unwrap_err();
        assert!(matches!(err, BlobError::Configuration { .. }));
    }

    #[test]
    fn rejects_missing_base_path() {
        let err = FsStorage::new(FsConfig {
            base_path: PathBuf::from("/definitely/not/a/real/path"),
            url_encryption_key: TEST_KEY.into(),
            retry_count: 0,
        })
        .unwrap_err();
        assert!(matches!(err, BlobError::Configuration { .. }));
    }

    #[test]
    fn token_round_trip() {
        let (_dir, storage) = storage();
        let valid_till = Utc::now().timestamp() + 300;
        let token = storage
            .encode_token("reports", "2026/08/q2.csv", valid_till)
            .unwrap();

        let object = storage.decode_signed_url(&token).unwrap();
        assert_eq!(object.bucket(), "reports");
        assert_eq!(object.key(), "2026/08/q2.csv");
        assert_eq!(object.valid_till(), Some(valid_till));
    }

    #[test]
    fn tokens_are_not_deterministic() {
        // Fresh nonce per token: two tokens for the same triple differ.
        let (_dir, storage) = storage();
        let a = storage.encode_token("b", "k", 123).unwrap();
        let b = storage.encode_token("b", "k", 123).unwrap();
        assert_ne!(a, b);
        assert_eq!(storage.decode_signed_url(&b).unwrap().bucket(), "b");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let (_dir, storage) = storage();
        let token = storage.encode_token("b", "k", 123).unwrap();

        let mut raw = URL_SAFE.decode(&token).unwrap();
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let flipped = URL_SAFE.encode(&raw);
            assert!(matches!(
                storage.decode_signed_url(&flipped),
                Err(BlobError::InvalidSignedUrl { .. })
            ));
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn truncated_token_is_rejected() {
        let (_dir, storage) = storage();
        let token = storage.encode_token("b", "k", 123).unwrap();

        let raw = URL_SAFE.decode(&token).unwrap();
        let truncated = URL_SAFE.encode(&raw[..raw.len() - 4]);
        assert!(matches!(
            storage.decode_signed_url(&truncated),
            Err(BlobError::InvalidSignedUrl { .. })
        ));

        assert!(matches!(
            storage.decode_signed_url("@@not-base64@@"),
            Err(BlobError::InvalidSignedUrl { .. })
        ));
        assert!(matches!(
            storage.decode_signed_url(""),
            Err(BlobError::InvalidSignedUrl { .. })
        ));
    }

    #[test]
    fn delimiter_in_bucket_or_key_is_rejected() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.encode_token("bad:bucket", "k", 1),
            Err(BlobError::Validation(_))
        ));
        assert!(matches!(
            storage.encode_token("b", "bad:key", 1),
            Err(BlobError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn presign_put_token_embeds_expiry_window() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "k");
        let before = Utc::now().timestamp();
        let token = storage
            .presign_put(&object, Duration::from_secs(600))
            .await
            .unwrap();

        let decoded = storage.decode_signed_url(&token).unwrap();
        let valid_till = decoded.valid_till().unwrap();
        assert!(valid_till >= before + 600);
        assert!(valid_till <= Utc::now().timestamp() + 600);
        assert!(decoded.still_valid());
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "k");

        storage.write_object(&object, b"hello").await.unwrap();
        assert_eq!(read_to_string(&storage, &object).await, "hello");
    }

    #[tokio::test]
    async fn rewrite_truncates_instead_of_appending() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "k");

        storage.write_object(&object, b"hello").await.unwrap();
        storage.write_object(&object, b"world").await.unwrap();
        assert_eq!(read_to_string(&storage, &object).await, "world");
    }

    #[tokio::test]
    async fn read_missing_key_is_not_found() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "nope");
        assert!(matches!(
            storage.read_object(&object).await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "../../etc/passwd");
        assert!(matches!(
            storage.write_object(&object, b"x").await,
            Err(BlobError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn initiate_multipart_returns_one_url_per_part() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "big.bin").with_parts(4);

        let init = storage
            .initiate_multipart(&object, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!init.upload_id.is_empty());
        assert_eq!(init.part_urls.len(), 4);

        for (i, url) in init.part_urls.iter().enumerate() {
            let decoded = storage.decode_signed_url(url).unwrap();
            assert_eq!(decoded.bucket(), "b");
            assert_eq!(
                decoded.key(),
                format!(".mpu/{}/{:05}", init.upload_id, i + 1)
            );
        }
    }

    #[tokio::test]
    async fn complete_assembles_parts_in_ascending_order() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "big.bin").with_parts(3);

        let init = storage
            .initiate_multipart(&object, Duration::from_secs(60))
            .await
            .unwrap();
        for (url, chunk) in init.part_urls.iter().zip(["one-", "two-", "three"]) {
            let part_object = storage.decode_signed_url(url).unwrap();
            storage
                .write_object(&part_object, chunk.as_bytes())
                .await
                .unwrap();
        }

        // Present parts out of numeric order; assembly must still ascend.
        let parts = vec![
            CompletedPart::new("e2", 2),
            CompletedPart::new("e3", 3),
            CompletedPart::new("e1", 1),
        ];
        storage
            .complete_multipart(&object, &init.upload_id, &parts)
            .await
            .unwrap();

        assert_eq!(read_to_string(&storage, &object).await, "one-two-three");
        assert!(
            fs::metadata(storage.staging_dir("b", &init.upload_id))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn complete_with_unknown_session_fails() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "big.bin");
        let err = storage
            .complete_multipart(&object, "no-such-upload", &[CompletedPart::new("e", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Finalize { .. }));
    }

    #[tokio::test]
    async fn complete_with_missing_part_fails() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "big.bin").with_parts(2);

        let init = storage
            .initiate_multipart(&object, Duration::from_secs(60))
            .await
            .unwrap();
        let first = storage.decode_signed_url(&init.part_urls[0]).unwrap();
        storage.write_object(&first, b"only-one").await.unwrap();

        let parts = vec![CompletedPart::new("e1", 1), CompletedPart::new("e2", 2)];
        let err = storage
            .complete_multipart(&object, &init.upload_id, &parts)
            .await
            .unwrap_err();
        match err {
            BlobError::Finalize { reason, .. } => assert!(reason.contains("part 2")),
            other => panic!("expected Finalize, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_completion_preserves_existing_object() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "k").with_parts(2);

        storage.write_object(&object, b"precious").await.unwrap();

        let init = storage
            .initiate_multipart(&object, Duration::from_secs(60))
            .await
            .unwrap();
        let first = storage.decode_signed_url(&init.part_urls[0]).unwrap();
        storage.write_object(&first, b"new1").await.unwrap();

        // Part 2 was never uploaded: completion must fail without touching
        // the object already stored at bucket/key.
        let parts = vec![CompletedPart::new("e1", 1), CompletedPart::new("e2", 2)];
        let err = storage
            .complete_multipart(&object, &init.upload_id, &parts)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Finalize { .. }));

        assert_eq!(read_to_string(&storage, &object).await, "precious");
    }

    #[test]
    fn debug_output_hides_key_material() {
        let (_dir, storage) = storage();
        let rendered = format!("{storage:?}");
        assert!(rendered.contains("base_path"));
        assert!(!rendered.contains(TEST_KEY));
    }

    #[tokio::test]
    async fn complete_rejects_bad_part_lists() {
        let (_dir, storage) = storage();
        let object = Object::new(storage.clone(), "b", "big.bin");

        let err = storage
            .complete_multipart(&object, "u", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Validation(_)));

        let out_of_range = vec![CompletedPart::new("e", 0)];
        assert!(matches!(
            storage
                .complete_multipart(&object, "u", &out_of_range)
                .await,
            Err(BlobError::Validation(_))
        ));

        let duplicates = vec![CompletedPart::new("a", 1), CompletedPart::new("b", 1)];
        assert!(matches!(
            storage.complete_multipart(&object, "u", &duplicates).await,
            Err(BlobError::Validation(_))
        ));
    }
}
