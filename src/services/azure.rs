//! Azure Blob Storage backend: SAS URLs inside one configured container.
//!
//! Buckets map to virtual folders, so an object lands at blob path
//! `<bucket>/<key>` within the container. Multipart is not offered on this
//! backend; callers needing it should target the s3 or fs backend.

use crate::{
    errors::{BlobError, BlobResult},
    models::{object::Object, part::CompletedPart},
    services::{BlockStorage, MultipartInit},
};
use async_trait::async_trait;
use azure_storage::{StorageCredentials, shared_access_signature::service_sas::BlobSasPermissions};
use azure_storage_blobs::prelude::{BlobServiceClient, ContainerClient};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    pub account_name: String,
    pub account_key: String,
    pub container_name: String,
}

pub struct AzureStorage {
    container: ContainerClient,
}

impl AzureStorage {
    pub fn new(cfg: AzureConfig) -> BlobResult<Self> {
        if cfg.account_name.is_empty() {
            return Err(BlobError::Configuration {
                reason: "account name is not set".into(),
            });
        }
        if cfg.account_key.is_empty() {
            return Err(BlobError::Configuration {
                reason: "account key is not set".into(),
            });
        }
        if cfg.container_name.is_empty() {
            return Err(BlobError::Configuration {
                reason: "container name is not set".into(),
            });
        }

        let credentials =
            StorageCredentials::access_key(cfg.account_name.clone(), cfg.account_key.clone());
        let container = BlobServiceClient::new(cfg.account_name, credentials)
            .container_client(cfg.container_name);
        Ok(Self { container })
    }

    async fn sas_url(
        &self,
        object: &Object,
        permissions: BlobSasPermissions,
        timeout: Duration,
    ) -> BlobResult<String> {
        let signing_error = |reason: String| BlobError::Signing {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            part: None,
            reason,
        };

        let blob = self
            .container
            .blob_client(format!("{}/{}", object.bucket(), object.key()));
        let expiry = OffsetDateTime::now_utc() + timeout;
        let sas = blob
            .shared_access_signature(permissions, expiry)
            .await
            .map_err(|err| signing_error(format!("failed to build SAS token: {err}")))?;
        let url = blob
            .generate_signed_blob_url(&sas)
            .map_err(|err| signing_error(format!("failed to build SAS url: {err}")))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl BlockStorage for AzureStorage {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn presign_put(&self, object: &Object, timeout: Duration) -> BlobResult<String> {
        let permissions = BlobSasPermissions {
            add: true,
            create: true,
            write: true,
            ..Default::default()
        };
        self.sas_url(object, permissions, timeout).await
    }

    async fn presign_get(&self, object: &Object, timeout: Duration) -> BlobResult<String> {
        let permissions = BlobSasPermissions {
            read: true,
            ..Default::default()
        };
        self.sas_url(object, permissions, timeout).await
    }

    async fn initiate_multipart(
        &self,
        object: &Object,
        _timeout: Duration,
    ) -> BlobResult<MultipartInit> {
        Err(BlobError::Signing {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            part: None,
            reason: "multipart upload is not supported by the azure backend".into(),
        })
    }

    async fn complete_multipart(
        &self,
        object: &Object,
        upload_id: &str,
        _parts: &[CompletedPart],
    ) -> BlobResult<()> {
        Err(BlobError::Finalize {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            upload_id: upload_id.to_string(),
            reason: "multipart upload is not supported by the azure backend".into(),
        })
    }
}
