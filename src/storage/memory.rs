//! In-memory object store for unit tests and deterministic simulation

use super::{
    content_etag, GetResponse, ObjectMeta, ObjectStore, PutResponse, StorageError, StoreFuture,
};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    version: u64,
}

/// In-memory object store keyed by `(bucket, key)`.
///
/// Clones share the same underlying map, so a test can keep a handle and
/// inspect what the probe wrote.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    data: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored objects (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Raw contents of an object, bypassing the trait (for testing)
    pub fn contents(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.data
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.data.clone())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
    ) -> StoreFuture<'a, PutResponse> {
        Box::pin(async move {
            let data = Bytes::from(tokio::fs::read(source).await?);
            let etag = content_etag(&data);
            let size_bytes = data.len() as u64;

            let mut map = self.data.write();
            let version = map
                .get(&(bucket.to_string(), key.to_string()))
                .map(|prev| prev.version + 1)
                .unwrap_or(1);
            map.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    data,
                    etag: etag.clone(),
                    version,
                },
            );

            Ok(PutResponse {
                meta: ObjectMeta {
                    key: key.to_string(),
                    size_bytes,
                    etag: Some(etag),
                    version: Some(version.to_string()),
                },
            })
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse> {
        Box::pin(async move {
            let map = self.data.read();
            let obj = map
                .get(&(bucket.to_string(), key.to_string()))
                .ok_or_else(|| StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;

            let meta = ObjectMeta {
                key: key.to_string(),
                size_bytes: obj.data.len() as u64,
                etag: Some(obj.etag.clone()),
                version: Some(obj.version.to_string()),
            };
            Ok(GetResponse::ok(meta, obj.data.clone()))
        })
    }
}
