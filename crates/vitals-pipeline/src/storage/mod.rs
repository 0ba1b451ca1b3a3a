//! Blob storage gateway.
//!
//! The pipeline treats durable storage as a key/value blob store with
//! get/put/list semantics behind the [`BlobStore`] trait. [`S3Store`] is the
//! production implementation; [`MemoryStore`] backs tests and local dry
//! runs. Every write carries a `Content-MD5` integrity header.

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};
use vitals_common::{fingerprint, Result, VitalsError};

pub mod memory;

pub use memory::MemoryStore;

/// Key/value blob storage with typed not-found detection.
///
/// `get` returns [`VitalsError::NotFound`] for a missing key (the expected
/// first-run signal) and a fatal [`VitalsError::Storage`] for anything
/// else.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// All keys under `prefix`, following pagination to completion.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Connection settings for the S3 store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("VITALS_S3_BUCKET")
                .map_err(|_| VitalsError::Config("VITALS_S3_BUCKET must be set".to_string()))?,
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

/// S3-backed blob store over a fixed bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config.bucket);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "vitals-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Self {
            client,
            bucket: config.bucket,
        }
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|svc| svc.is_no_such_key()) {
                    VitalsError::NotFound(key.to_string())
                } else {
                    VitalsError::Storage(format!("get {}: {}", key, e))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| VitalsError::Storage(format!("read body of {}: {}", key, e)))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let content_md5 = fingerprint::content_md5(&bytes);
        debug!(
            "Uploading {} bytes to s3://{}/{}",
            bytes.len(),
            self.bucket,
            key
        );

        self.client
            .put_object()
            .acl(ObjectCannedAcl::Private)
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_md5(content_md5)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| VitalsError::Storage(format!("put {}: {}", key, e)))?;

        info!("Uploaded s3://{}/{}", self.bucket, key);

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        debug!("Listing objects in s3://{}/{}", self.bucket, prefix);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| VitalsError::Storage(format!("list {}: {}", prefix, e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|t| t.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }
}
