//! Object Store Abstraction
//!
//! The probe only needs two capabilities from object storage: upload a local
//! file under a key, and download a key. Everything else (retries,
//! authentication, multipart) belongs to the backend.
//!
//! Implementations:
//! - `InMemoryObjectStore`: for unit tests and DST
//! - `LocalFsObjectStore`: for development against a directory tree
//! - `SimulatedObjectStore`: fault-injecting wrapper around any store
//! - `S3ObjectStore`: for production (feature-gated)

pub mod local_fs;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;
pub mod simulated;

pub use local_fs::LocalFsObjectStore;
pub use memory::InMemoryObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
pub use simulated::{
    FaultPlan, SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats, StoreCall,
    StoreOp,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// HTTP-style status reported for a successful read.
pub const STATUS_OK: u16 = 200;

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// ETag or content hash (optional)
    pub etag: Option<String>,
    /// Backend version id, when the bucket is versioned
    pub version: Option<String>,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    pub meta: ObjectMeta,
}

/// Result of a download that reached the backend.
///
/// A `GetResponse` is not a success by itself: callers must check
/// [`is_success`](GetResponse::is_success).
#[derive(Debug, Clone)]
pub struct GetResponse {
    pub status: u16,
    pub meta: ObjectMeta,
    pub body: Bytes,
}

impl GetResponse {
    pub fn ok(meta: ObjectMeta, body: Bytes) -> Self {
        GetResponse {
            status: STATUS_OK,
            meta,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error type for object store operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Object store abstraction trait
pub trait ObjectStore: Send + Sync + 'static {
    /// Upload the file at `source` to `bucket/key` (create or overwrite)
    fn put<'a>(&'a self, bucket: &'a str, key: &'a str, source: &'a Path)
        -> StoreFuture<'a, PutResponse>;

    /// Download `bucket/key`
    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
    ) -> StoreFuture<'a, PutResponse> {
        (**self).put(bucket, key, source)
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse> {
        (**self).get(bucket, key)
    }
}

/// Content hash used as the etag by the local backends.
pub(crate) fn content_etag(data: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(data))
}

/// Store that panics on one operation for one key and forwards the rest.
#[cfg(test)]
pub(crate) struct PanickingStore<S> {
    pub inner: S,
    pub op: StoreOp,
    pub key: &'static str,
}

#[cfg(test)]
impl<S: ObjectStore> ObjectStore for PanickingStore<S> {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
    ) -> StoreFuture<'a, PutResponse> {
        if self.op == StoreOp::Put && key == self.key {
            panic!("put {} exploded", key);
        }
        self.inner.put(bucket, key, source)
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse> {
        if self.op == StoreOp::Get && key == self.key {
            panic!("get {} exploded", key);
        }
        self.inner.get(bucket, key)
    }
}
