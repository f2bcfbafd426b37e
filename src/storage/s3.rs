//! S3 Object Store Implementation
//!
//! Uses the `object_store` crate from the Arrow ecosystem, which provides:
//! - Standard S3 API support
//! - S3-compatible services (MinIO, LocalStack)
//! - Built-in retry logic
//!
//! The probe addresses buckets per call, so one client is built lazily per
//! bucket and cached.

use super::{GetResponse, ObjectMeta, ObjectStore, PutResponse, StorageError, StoreFuture};
use crate::config::{S3Config, S3Credentials};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as ObjectStoreTrait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub struct S3ObjectStore {
    config: S3Config,
    credentials: S3Credentials,
    clients: Mutex<HashMap<String, Arc<dyn ObjectStoreTrait>>>,
}

impl S3ObjectStore {
    /// Build the store and eagerly validate the client for `bucket`, so bad
    /// settings fail at startup rather than on the first write.
    pub fn new(
        config: S3Config,
        credentials: S3Credentials,
        bucket: &str,
    ) -> Result<Self, StorageError> {
        let store = S3ObjectStore {
            config,
            credentials,
            clients: Mutex::new(HashMap::new()),
        };
        store.client(bucket)?;
        Ok(store)
    }

    fn client(&self, bucket: &str) -> Result<Arc<dyn ObjectStoreTrait>, StorageError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(bucket) {
            return Ok(client.clone());
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_access_key_id(&self.credentials.access_key_id)
            .with_secret_access_key(self.credentials.secret_access_key());

        // Use custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = &self.config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let client: Arc<dyn ObjectStoreTrait> = Arc::new(builder.build().map_err(|e| {
            StorageError::Backend(format!("failed to create S3 client for {}: {}", bucket, e))
        })?);
        clients.insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    /// Get the full path with prefix
    fn full_path(&self, key: &str) -> ObjectPath {
        if self.config.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.config.prefix, key))
        }
    }

    fn map_error(bucket: &str, key: &str, err: object_store::Error) -> StorageError {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => {
                StorageError::PermissionDenied(err.to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("region", &self.config.region)
            .field("prefix", &self.config.prefix)
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

impl ObjectStore for S3ObjectStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
    ) -> StoreFuture<'a, PutResponse> {
        Box::pin(async move {
            let client = self.client(bucket)?;
            let data = bytes::Bytes::from(tokio::fs::read(source).await?);
            let size_bytes = data.len() as u64;

            let result = client
                .put(&self.full_path(key), data.into())
                .await
                .map_err(|e| Self::map_error(bucket, key, e))?;

            Ok(PutResponse {
                meta: ObjectMeta {
                    key: key.to_string(),
                    size_bytes,
                    etag: result.e_tag,
                    version: result.version,
                },
            })
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse> {
        Box::pin(async move {
            let client = self.client(bucket)?;
            let result = client
                .get(&self.full_path(key))
                .await
                .map_err(|e| Self::map_error(bucket, key, e))?;

            let meta = ObjectMeta {
                key: key.to_string(),
                size_bytes: result.meta.size as u64,
                etag: result.meta.e_tag.clone(),
                version: result.meta.version.clone(),
            };
            let body = result
                .bytes()
                .await
                .map_err(|e| Self::map_error(bucket, key, e))?;

            Ok(GetResponse::ok(meta, body))
        })
    }
}
