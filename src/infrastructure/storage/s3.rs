use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::settings::AppConfig;

/// Extension of the source assets the gateway lists.
pub const SOURCE_EXTENSION: &str = ".usdz";

/// Every variant is a transfer failure from the pipeline's point of view.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to list s3://{bucket}/{prefix}: {message}")]
    List {
        bucket: String,
        prefix: String,
        message: String,
    },

    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("failed to download {key}: {message}")]
    Download { key: String, message: String },

    #[error("failed to upload {key}: {message}")]
    Upload { key: String, message: String },

    #[error("failed to delete {key}: {message}")]
    Delete { key: String, message: String },

    #[error("local I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Narrow view of the remote store used by the pipeline. The gateway never
/// retries; callers decide whether a failed call is worth repeating.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys under `prefix` ending in `.usdz` (case-insensitive), in listing order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Writes the object to `local_path` and returns its size in bytes.
    async fn download(&self, key: &str, local_path: &Path) -> Result<u64, StorageError>;

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub fn is_source_key(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with(SOURCE_EXTENSION)
}

#[derive(Clone)]
pub struct S3Storage {
    pub client: Client,
    pub bucket: String,
}

impl S3Storage {
    pub fn new(config: &AppConfig, bucket: &str) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            config.session_token.clone(),
            None,
            "environment",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            // Custom endpoints (MinIO, localstack) only speak path-style.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let s3_config = builder.build();

        let client = Client::from_conf(s3_config);

        info!(bucket = %bucket, region = %config.region, "S3 client ready");

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::List {
                    bucket: self.bucket.clone(),
                    prefix: prefix.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter(|key| is_source_key(key))
                    .map(str::to_string),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(prefix = %prefix, count = keys.len(), "listed source objects");
        Ok(keys)
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<u64, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|svc| svc.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Download {
                        key: key.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        let io_err = |source: std::io::Error| StorageError::Io {
            path: local_path.display().to_string(),
            source,
        };

        let mut file = tokio::fs::File::create(local_path).await.map_err(io_err)?;
        let mut body = output.body;
        let mut written: u64 = 0;

        while let Some(chunk) = body.try_next().await.map_err(|e| StorageError::Download {
            key: key.to_string(),
            message: e.to_string(),
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        Ok(written)
    }

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}
