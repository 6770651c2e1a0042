//! AWS S3 backend: native presigned URLs and multipart uploads.

use crate::{
    errors::{BlobError, BlobResult},
    models::{object::Object, part::CompletedPart},
    services::{BlockStorage, MultipartInit},
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, retry::RetryConfig};
use aws_sdk_s3::{
    Client,
    config::Credentials,
    presigning::PresigningConfig,
    types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart},
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_RETRY_COUNT: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,

    /// Max attempts handed to the SDK retry policy. Defaults to 5 when
    /// unset or zero; this layer performs no retries of its own.
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    /// Validates credentials and builds the long-lived client. Call once;
    /// the resulting value is safe to share across concurrent presigners.
    pub async fn new(cfg: S3Config) -> BlobResult<Self> {
        if cfg.region.is_empty() {
            return Err(BlobError::Configuration {
                reason: "aws region not specified".into(),
            });
        }
        if cfg.access_key_id.is_empty() || cfg.secret_access_key.is_empty() {
            return Err(BlobError::Configuration {
                reason: "aws credentials not specified".into(),
            });
        }
        let retry_count = if cfg.retry_count == 0 {
            DEFAULT_RETRY_COUNT
        } else {
            cfg.retry_count
        };

        let credentials = Credentials::new(
            cfg.access_key_id.clone(),
            cfg.secret_access_key.clone(),
            None,
            None,
            "blobsign",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::standard().with_max_attempts(retry_count))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }

    fn presigning(
        object: &Object,
        part: Option<i32>,
        timeout: Duration,
    ) -> BlobResult<PresigningConfig> {
        PresigningConfig::expires_in(timeout).map_err(|err| BlobError::Signing {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            part,
            reason: format!("invalid presign expiry: {err}"),
        })
    }
}

#[async_trait]
impl BlockStorage for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn presign_put(&self, object: &Object, timeout: Duration) -> BlobResult<String> {
        let mut request = self
            .client
            .put_object()
            .bucket(object.bucket())
            .key(object.key());
        if !object.metadata().is_empty() {
            request = request.set_metadata(Some(object.metadata().clone()));
        }

        let presigned = request
            .presigned(Self::presigning(object, None, timeout)?)
            .await
            .map_err(|err| BlobError::Signing {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                part: None,
                reason: err.to_string(),
            })?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, object: &Object, timeout: Duration) -> BlobResult<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(object.bucket())
            .key(object.key())
            .presigned(Self::presigning(object, None, timeout)?)
            .await
            .map_err(|err| BlobError::Signing {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                part: None,
                reason: err.to_string(),
            })?;
        Ok(presigned.uri().to_string())
    }

    async fn initiate_multipart(
        &self,
        object: &Object,
        timeout: Duration,
    ) -> BlobResult<MultipartInit> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(object.bucket())
            .key(object.key())
            .send()
            .await
            .map_err(|err| BlobError::Signing {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                part: None,
                reason: format!("create multipart upload failed: {err}"),
            })?;
        let upload_id = created.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            return Err(BlobError::Signing {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                part: None,
                reason: "backend returned no upload id".into(),
            });
        }

        let mut part_urls = Vec::with_capacity(object.parts() as usize);
        for part_number in 1..=object.parts() {
            let presigned = self
                .client
                .upload_part()
                .bucket(object.bucket())
                .key(object.key())
                .upload_id(&upload_id)
                .part_number(part_number)
                .presigned(Self::presigning(object, Some(part_number), timeout)?)
                .await
                .map_err(|err| BlobError::Signing {
                    bucket: object.bucket().to_string(),
                    key: object.key().to_string(),
                    part: Some(part_number),
                    reason: err.to_string(),
                })?;
            part_urls.push(presigned.uri().to_string());
        }

        debug!(
            bucket = object.bucket(),
            key = object.key(),
            upload_id,
            parts = part_urls.len(),
            "multipart upload initiated"
        );
        Ok(MultipartInit {
            part_urls,
            upload_id,
        })
    }

    async fn complete_multipart(
        &self,
        object: &Object,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()> {
        let mut sorted = parts.to_vec();
        sorted.sort_by_key(|p| p.part_number);

        let completed = sorted
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .e_tag(&p.etag)
                    .part_number(p.part_number)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(object.bucket())
            .key(object.key())
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| BlobError::Finalize {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                upload_id: upload_id.to_string(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}
