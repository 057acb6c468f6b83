//! Blob storage for uploaded files

use std::fmt::Debug;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

/// Storage holding the bytes behind each file record
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Remove a blob. Returns `false` when it was already gone.
    async fn remove(&self, name: &str) -> io::Result<bool>;
}

/// Blobs stored as plain files under one directory
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

    /// Resolve a blob name inside the root. Names that would escape it are refused.
    pub fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid blob name '{}'", name),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn remove(&self, name: &str) -> io::Result<bool> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
