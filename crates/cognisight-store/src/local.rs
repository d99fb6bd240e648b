//! Non-Google photo stores: a local directory and an in-process map.

use crate::drive::{ImageStore, UploadError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Reject names that could escape the target directory.
fn check_name(name: &str) -> Result<(), UploadError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(UploadError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Writes photos into a directory and links them as `file://` URLs.
pub struct LocalDirImageStore {
    dir: PathBuf,
}

impl LocalDirImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageStore for LocalDirImageStore {
    fn backend_tag(&self) -> &'static str {
        "local"
    }

    async fn put(&self, name: &str, _content_type: &str, bytes: &[u8]) -> Result<String, UploadError> {
        check_name(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        let path = tokio::fs::canonicalize(&path).await?;
        tracing::info!(path = %path.display(), size = bytes.len(), "photo stored locally");
        Ok(format!("file://{}", path.display()))
    }
}

/// Keeps photos in memory under `memory://` links.
#[derive(Default)]
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type and bytes of a stored object.
    pub async fn get(&self, name: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, UploadError> {
        check_name(name)?;
        self.objects
            .lock()
            .await
            .insert(name.to_string(), (content_type.to_string(), bytes.to_vec()));
        Ok(format!("memory://{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_dir_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirImageStore::new(dir.path().join("photos"));
        let link = store.put("a.png", "image/png", b"png-bytes").await.unwrap();

        assert!(link.starts_with("file://"));
        assert!(link.ends_with("a.png"));
        let written = std::fs::read(dir.path().join("photos/a.png")).unwrap();
        assert_eq!(written, b"png-bytes");
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirImageStore::new(dir.path());
        for name in ["../evil.png", "sub/dir.png", ".hidden", ""] {
            let err = store.put(name, "image/png", b"x").await.err().unwrap();
            assert!(matches!(err, UploadError::InvalidName(_)), "name {name:?}");
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryImageStore::new();
        assert!(store.is_empty().await);
        let link = store.put("b.jpg", "image/jpeg", b"jpg").await.unwrap();
        assert_eq!(link, "memory://b.jpg");
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("b.jpg").await,
            Some(("image/jpeg".to_string(), b"jpg".to_vec()))
        );
    }
}
