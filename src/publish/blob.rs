//! Blob storage backends

use crate::publish::{PublishError, PublishResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Object storage keyed by bucket and key
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes an object, replacing any existing one under the same key
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PublishResult<()>;

    async fn get(&self, bucket: &str, key: &str) -> PublishResult<Vec<u8>>;

    /// Content type recorded at write time, `None` if the object is missing
    async fn content_type(&self, bucket: &str, key: &str) -> PublishResult<Option<String>>;
}

/// Blobs as files: `<root>/<bucket>/<key>`
///
/// The content type sits next to each object in `<key>.content-type`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> PublishResult<PathBuf> {
        let mut bucket_parts = Path::new(bucket).components();
        if !matches!(
            (bucket_parts.next(), bucket_parts.next()),
            (Some(std::path::Component::Normal(_)), None)
        ) {
            return Err(PublishError::Blob(format!("Invalid bucket: {}", bucket)));
        }

        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if key.is_empty() || escapes {
            return Err(PublishError::Blob(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(bucket).join(relative))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".content-type");
        PathBuf::from(name)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PublishResult<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tokio::fs::write(Self::sidecar_path(&path), content_type).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> PublishResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PublishError::NotFound(format!("{}/{}", bucket, key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn content_type(&self, bucket: &str, key: &str) -> PublishResult<Option<String>> {
        let path = Self::sidecar_path(&self.object_path(bucket, key)?);
        match tokio::fs::read_to_string(&path).await {
            Ok(content_type) => Ok(Some(content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blobs
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets
    pub fn len(&self) -> PublishResult<usize> {
        Ok(self.objects.lock().map_err(|_| PublishError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> PublishResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PublishResult<()> {
        self.objects
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .insert(
                (bucket.to_string(), key.to_string()),
                (bytes, content_type.to_string()),
            );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> PublishResult<Vec<u8>> {
        self.objects
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| PublishError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn content_type(&self, bucket: &str, key: &str) -> PublishResult<Option<String>> {
        Ok(self
            .objects
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, content_type)| content_type.clone()))
    }
}
