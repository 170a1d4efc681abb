//! Object store adapter.
//!
//! `ObjectStoreClient` is the raw capability (put, get, delete, presign)
//! against one bucket. `ObjectStoreAdapter` layers the offload policy on
//! top: access classes, upload metadata, the delete-on-removal switch and
//! presign expiry bounds. A `StoreConnector` builds a fresh client from the
//! current settings every time an adapter is constructed.

use crate::{
    models::settings::{MAX_SIGNED_URL_EXPIRY_SECS, Settings},
    services::{OffloadError, OffloadResult},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client as S3Client,
    config::{BehaviorVersion, Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};
use std::{collections::HashMap, io, path::Path, sync::Arc, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Streamed object body.
pub type ByteChunks = BoxStream<'static, io::Result<Bytes>>;

pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(MAX_SIGNED_URL_EXPIRY_SECS);

/// Visibility applied to an object at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessClass {
    /// No public ACL; read through presigned redirects.
    Private,
    /// Stored with `public-read`; read through a direct URL.
    Public,
}

impl AccessClass {
    pub fn from_is_private(is_private: bool) -> Self {
        if is_private {
            AccessClass::Private
        } else {
            AccessClass::Public
        }
    }
}

/// Everything a single upload carries besides the bytes.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub content_type: String,
    pub access: AccessClass,
    /// User metadata stored with the object.
    pub metadata: HashMap<String, String>,
}

/// A time-boxed GET URL.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Raw object store capability scoped to one bucket.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Upload the file at `path` under `key`.
    async fn put_file(&self, path: &Path, key: &str, request: &PutRequest) -> OffloadResult<()>;

    /// Stream an object; `ObjectNotFound` when the key does not exist.
    async fn get(&self, key: &str) -> OffloadResult<ByteChunks>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> OffloadResult<()>;

    /// Presign a GET for `key` valid for `expires_in`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> OffloadResult<String>;
}

/// Builds a client for the bucket and credentials in `settings`.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, settings: &Settings) -> OffloadResult<Arc<dyn ObjectStoreClient>>;
}

/// Offload policy over a raw client.
#[derive(Clone)]
pub struct ObjectStoreAdapter {
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    public_endpoint: String,
    presign_expiry: Duration,
    delete_on_removal: bool,
}

impl ObjectStoreAdapter {
    /// Resolve a client from the current settings.
    pub async fn connect(connector: &dyn StoreConnector, settings: &Settings) -> OffloadResult<Self> {
        let client = connector.connect(settings).await?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Arc<dyn ObjectStoreClient>, settings: &Settings) -> Self {
        Self {
            client,
            bucket: settings.bucket_name.clone(),
            public_endpoint: settings.public_endpoint(),
            presign_expiry: settings.presign_expiry(),
            delete_on_removal: settings.delete_file_from_cloud,
        }
    }

    pub fn presign_expiry(&self) -> Duration {
        self.presign_expiry
    }

    /// Upload `path` under `key`.
    ///
    /// Metadata always carries `ContentType`; private uploads also carry the
    /// original `file_name`.
    pub async fn put(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
        access: AccessClass,
        file_name: &str,
    ) -> OffloadResult<()> {
        let mut metadata = HashMap::new();
        metadata.insert("ContentType".to_string(), content_type.to_string());
        if access == AccessClass::Private {
            metadata.insert("file_name".to_string(), file_name.to_string());
        }
        let request = PutRequest {
            content_type: content_type.to_string(),
            access,
            metadata,
        };
        debug!(key, ?access, content_type, "uploading object");
        self.client.put_file(path, key, &request).await
    }

    pub async fn get(&self, key: &str) -> OffloadResult<ByteChunks> {
        self.client.get(key).await
    }

    /// Delete `key` when the delete-on-removal policy is on; otherwise a
    /// no-op that never reaches the store.
    pub async fn delete(&self, key: &str) -> OffloadResult<()> {
        if !self.delete_on_removal {
            debug!(key, "delete-on-removal disabled; keeping object");
            return Ok(());
        }
        self.client.delete(key).await
    }

    /// Presign a GET valid for `expires_in`.
    pub async fn presign(&self, key: &str, expires_in: Duration) -> OffloadResult<PresignedUrl> {
        if expires_in.is_zero() || expires_in > MAX_PRESIGN_EXPIRY {
            return Err(OffloadError::Presign(format!(
                "expiry {:?} outside (0, {:?}]",
                expires_in, MAX_PRESIGN_EXPIRY
            )));
        }
        let url = self.client.presign_get(key, expires_in).await?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in)
                .map_err(|err| OffloadError::Presign(err.to_string()))?;
        Ok(PresignedUrl { url, expires_at })
    }

    /// Direct URL of a public object.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_endpoint, self.bucket, key)
    }
}

/// Connector producing `aws-sdk-s3` clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Connector;

#[async_trait]
impl StoreConnector for S3Connector {
    async fn connect(&self, settings: &Settings) -> OffloadResult<Arc<dyn ObjectStoreClient>> {
        Ok(Arc::new(S3ObjectStore::from_settings(settings).await))
    }
}

/// `ObjectStoreClient` backed by Amazon S3 or an S3-compatible endpoint.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Static credentials scoped to the configured region when both halves
    /// of the pair are set; the default provider chain otherwise.
    pub async fn from_settings(settings: &Settings) -> Self {
        let mut builder = match settings.credentials() {
            Some((key, secret)) => {
                let credentials = Credentials::new(key, secret, None, None, "offload-settings");
                let mut builder = aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials);
                if let Some(region) = settings.region() {
                    builder = builder.region(Region::new(region.to_string()));
                }
                builder
            }
            None => {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = settings.region() {
                    loader = loader.region(Region::new(region.to_string()));
                }
                let sdk_config = loader.load().await;
                aws_sdk_s3::config::Builder::from(&sdk_config)
            }
        };

        if let Some(endpoint) = settings.custom_endpoint() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        debug!(
            bucket = %settings.bucket_name,
            region = ?settings.region(),
            static_credentials = settings.has_credentials(),
            "built S3 client"
        );

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: settings.bucket_name.clone(),
        }
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    async fn put_file(&self, path: &Path, key: &str, request: &PutRequest) -> OffloadResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| OffloadError::UploadFailure {
                key: key.to_string(),
                reason: err.to_string(),
            })?;

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&request.content_type)
            .set_metadata(Some(request.metadata.clone()))
            .body(body);
        if request.access == AccessClass::Public {
            put = put.acl(ObjectCannedAcl::PublicRead);
        }

        put.send()
            .await
            .map_err(|err| OffloadError::UploadFailure {
                key: key.to_string(),
                reason: err.into_service_error().to_string(),
            })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> OffloadResult<ByteChunks> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    OffloadError::ObjectNotFound(key.to_string())
                } else {
                    OffloadError::Transport(err.to_string())
                }
            })?;

        Ok(ReaderStream::new(response.body.into_async_read()).boxed())
    }

    async fn delete(&self, key: &str) -> OffloadResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| OffloadError::AccessDenied {
                key: key.to_string(),
                reason: err.into_service_error().to_string(),
            })?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> OffloadResult<String> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| OffloadError::Presign(err.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| OffloadError::Presign(err.to_string()))?;
        Ok(presigned.uri().to_string())
    }
}
