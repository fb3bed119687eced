//! Content byte storage
//!
//! The tree store keeps metadata only. Document bodies live behind the
//! `ContentStore` trait; `DiskContentStore` maps resource paths onto a
//! directory tree, collections as directories and documents as files.

use async_trait::async_trait;
use bytes::Bytes;
use canopy_core::ResourcePath;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("No content at {0}")]
    NotFound(ResourcePath),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContentError>;

/// Backing store for resource content
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create an empty file or directory for a new resource
    async fn create_placeholder(&self, path: &ResourcePath, collection: bool) -> Result<()>;

    async fn read_bytes(&self, path: &ResourcePath) -> Result<Bytes>;

    async fn write_bytes(&self, path: &ResourcePath, data: Bytes) -> Result<()>;

    /// Copy a document, or a collection with everything below it
    async fn copy(&self, from: &ResourcePath, to: &ResourcePath, collection: bool) -> Result<()>;

    /// Remove content at `path` and below; missing content is not an error
    async fn delete_recursive(&self, path: &ResourcePath) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct DiskContentStore {
    root: PathBuf,
}

impl DiskContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &ResourcePath) -> PathBuf {
        let mut file = self.root.clone();
        for segment in path.as_str().split('/').filter(|s| !s.is_empty()) {
            file.push(segment);
        }
        file
    }
}

#[async_trait]
impl ContentStore for DiskContentStore {
    async fn create_placeholder(&self, path: &ResourcePath, collection: bool) -> Result<()> {
        let file = self.file_path(path);
        if collection {
            tokio::fs::create_dir_all(&file).await?;
        } else {
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::OpenOptions::new().create(true).write(true).truncate(false).open(&file).await?;
        }
        debug!("Created content placeholder {:?}", file);
        Ok(())
    }

    async fn read_bytes(&self, path: &ResourcePath) -> Result<Bytes> {
        match tokio::fs::read(self.file_path(path)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ContentError::NotFound(path.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_bytes(&self, path: &ResourcePath, data: Bytes) -> Result<()> {
        let file = self.file_path(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, &data).await?;
        Ok(())
    }

    async fn copy(&self, from: &ResourcePath, to: &ResourcePath, collection: bool) -> Result<()> {
        let source = self.file_path(from);
        let dest = self.file_path(to);
        if !collection {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&source, &dest).await?;
            return Ok(());
        }

        let mut pending = vec![(source, dest)];
        while let Some((src_dir, dest_dir)) = pending.pop() {
            tokio::fs::create_dir_all(&dest_dir).await?;
            let mut entries = tokio::fs::read_dir(&src_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let target = dest_dir.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    tokio::fs::copy(entry.path(), target).await?;
                }
            }
        }
        Ok(())
    }

    async fn delete_recursive(&self, path: &ResourcePath) -> Result<()> {
        let file = self.file_path(path);
        let metadata = match tokio::fs::metadata(&file).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&file).await?;
        } else {
            tokio::fs::remove_file(&file).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path(p: &str) -> ResourcePath {
        ResourcePath::parse(p).unwrap()
    }

    #[tokio::test]
    async fn test_write_copy_and_delete_tree() {
        let dir = TempDir::new().unwrap();
        let store = DiskContentStore::new(dir.path());
        store.create_placeholder(&path("/docs"), true).await.unwrap();
        store.write_bytes(&path("/docs/a/readme.txt"), Bytes::from_static(b"hello")).await.unwrap();

        store.copy(&path("/docs"), &path("/backup"), true).await.unwrap();
        assert_eq!(store.read_bytes(&path("/backup/a/readme.txt")).await.unwrap(), Bytes::from_static(b"hello"));

        store.delete_recursive(&path("/docs")).await.unwrap();
        assert!(matches!(store.read_bytes(&path("/docs/a/readme.txt")).await, Err(ContentError::NotFound(_))));
        store.delete_recursive(&path("/docs")).await.unwrap();
    }

    #[tokio::test]
    async fn test_placeholder_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let store = DiskContentStore::new(dir.path());
        store.write_bytes(&path("/note.txt"), Bytes::from_static(b"keep")).await.unwrap();
        store.create_placeholder(&path("/note.txt"), false).await.unwrap();
        assert_eq!(store.read_bytes(&path("/note.txt")).await.unwrap(), Bytes::from_static(b"keep"));
    }
}
