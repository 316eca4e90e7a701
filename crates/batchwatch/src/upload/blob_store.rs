//! Local store of original file bytes, keyed by file name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::BlobError;
use crate::sanitize::hash_name;

/// Original bytes of one file in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl StoredFile {
    /// Wraps `bytes`, guessing the MIME type from the name's extension.
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        let mime_type = mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            name: name.to_string(),
            bytes,
            mime_type,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_file(&self, file: StoredFile) -> Result<(), BlobError>;
    async fn get_file(&self, name: &str) -> Result<Option<StoredFile>, BlobError>;
    /// Removes every stored file.
    async fn clear(&self) -> Result<(), BlobError>;
}

/// Blob store backed by a directory. Files are stored under a hash of
/// their name, so no name can escape the directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.blob", hash_name(name)))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_file(&self, file: StoredFile) -> Result<(), BlobError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BlobError::Io {
                path: self.root.clone(),
                source: e,
            })?;

        let path = self.path_for(&file.name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| BlobError::Io { path, source: e })?;
        log::debug!("Stored blob for '{}' ({} bytes)", file.name, file.size());
        Ok(())
    }

    async fn get_file(&self, name: &str) -> Result<Option<StoredFile>, BlobError> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(StoredFile::new(name, bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobError::Io { path, source: e }),
        }
    }

    async fn clear(&self) -> Result<(), BlobError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                log::debug!("Cleared blob store at {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io {
                path: self.root.clone(),
                source: e,
            }),
        }
    }
}

/// Blob store held in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_file(&self, file: StoredFile) -> Result<(), BlobError> {
        self.files.write().await.insert(file.name.clone(), file);
        Ok(())
    }

    async fn get_file(&self, name: &str) -> Result<Option<StoredFile>, BlobError> {
        Ok(self.files.read().await.get(name).cloned())
    }

    async fn clear(&self) -> Result<(), BlobError> {
        self.files.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_mime_type() {
        assert_eq!(StoredFile::new("a.pdf", vec![]).mime_type, "application/pdf");
        assert_eq!(StoredFile::new("scan.png", vec![]).mime_type, "image/png");
        assert_eq!(
            StoredFile::new("noext", vec![1, 2]).mime_type,
            "application/octet-stream"
        );
        assert_eq!(StoredFile::new("noext", vec![1, 2]).size(), 2);
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("blobs"));

        assert!(store.get_file("a.pdf").await.unwrap().is_none());
        store
            .put_file(StoredFile::new("a.pdf", b"%PDF-1.7".to_vec()))
            .await
            .unwrap();

        let file = store.get_file("a.pdf").await.unwrap().unwrap();
        assert_eq!(file.bytes, b"%PDF-1.7");
        assert_eq!(file.name, "a.pdf");

        store.clear().await.unwrap();
        assert!(store.get_file("a.pdf").await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_fs_store_contains_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let store = FsBlobStore::new(&root);

        store
            .put_file(StoredFile::new("../../etc/passwd", b"x".to_vec()))
            .await
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(&root).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(store.get_file("../../etc/passwd").await.unwrap().is_some());
        assert!(!dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        store
            .put_file(StoredFile::new("a.pdf", vec![1]))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.get_file("a.pdf").await.unwrap().is_some());
        assert!(store.get_file("b.pdf").await.unwrap().is_none());
        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }
}
