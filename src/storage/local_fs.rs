//! Local filesystem object store for development and testing
//!
//! Buckets are directories under the base path; keys are file names inside
//! them.

use super::{
    content_etag, GetResponse, ObjectMeta, ObjectStore, PutResponse, StorageError, StoreFuture,
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_path: PathBuf,
}

impl LocalFsObjectStore {
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsObjectStore { base_path }
    }

    /// Get the full path for a key
    fn full_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.base_path.join(bucket).join(key)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl ObjectStore for LocalFsObjectStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
    ) -> StoreFuture<'a, PutResponse> {
        Box::pin(async move {
            let data = tokio::fs::read(source).await?;
            let path = self.full_path(bucket, key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &data).await?;

            Ok(PutResponse {
                meta: ObjectMeta {
                    key: key.to_string(),
                    size_bytes: data.len() as u64,
                    etag: Some(content_etag(&data)),
                    version: None,
                },
            })
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse> {
        Box::pin(async move {
            let path = self.full_path(bucket, key);
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    return Err(StorageError::PermissionDenied(path.display().to_string()))
                }
                Err(e) => return Err(e.into()),
            };

            let meta = ObjectMeta {
                key: key.to_string(),
                size_bytes: data.len() as u64,
                etag: Some(content_etag(&data)),
                version: None,
            };
            Ok(GetResponse::ok(meta, Bytes::from(data)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_localfs_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"hello world").await.unwrap();

        let store = LocalFsObjectStore::new(dir.path().join("store"));
        store.put("bucket", "42", &src).await.unwrap();

        assert!(store.base_path().join("bucket").join("42").exists());
        let got = store.get("bucket", "42").await.unwrap();
        assert!(got.is_success());
        assert_eq!(&got.body[..], b"hello world");
    }

    #[tokio::test]
    async fn test_localfs_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().to_path_buf());

        let err = store.get("bucket", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }), "got {:?}", err);
    }
}
