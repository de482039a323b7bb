//! File operations
//!
//! Single-file listing and mutations on top of a storage backend.

use log::{debug, info};
use std::sync::Arc;

use crate::error::FsError;
use crate::storage::backend::{EntryMetadata, StorageBackend};
use crate::storage::metadata::MetadataProbe;
use crate::storage::path::VirtualPath;
use crate::storage::results::FileEntry;

#[derive(Clone)]
pub struct FileStore {
    backend: Arc<dyn StorageBackend>,
    probe: MetadataProbe,
}

impl FileStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            probe: MetadataProbe::new(backend.clone()),
            backend,
        }
    }

    /// Regular files directly inside `dir`, sorted by name
    pub async fn list(&self, dir: &VirtualPath) -> Result<Vec<FileEntry>, FsError> {
        match self.backend.metadata(dir).await? {
            Some(metadata) if metadata.is_dir() => {}
            Some(_) => return Err(FsError::InvalidPath(format!("{} is not a directory", dir))),
            None => return Err(FsError::NotFound(dir.to_string())),
        }

        let mut files = Vec::new();
        for (path, metadata) in self.backend.read_dir(dir).await? {
            if metadata.is_file() {
                files.push(self.probe.probe(path, &metadata).await);
            }
        }
        debug!("Listed {} files in {}", files.len(), dir);
        Ok(files)
    }

    pub async fn delete(&self, path: &VirtualPath) -> Result<(), FsError> {
        self.require_file(path).await?;
        self.backend.remove_file(path).await?;
        info!("Deleted file {}", path);
        Ok(())
    }

    pub async fn copy(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        self.check_transfer(origin, destination).await?;
        let bytes = self.backend.copy_file(origin, destination).await?;
        info!("Copied file {} to {} ({} bytes)", origin, destination, bytes);
        Ok(())
    }

    pub async fn move_to(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        self.check_transfer(origin, destination).await?;
        match self.backend.rename(origin, destination).await {
            Ok(()) => {}
            Err(e) if e.is_cross_device() => {
                debug!("Falling back to copy for {} -> {}", origin, destination);
                self.backend.copy_file(origin, destination).await?;
                self.backend.remove_file(origin).await?;
            }
            Err(e) => return Err(e),
        }
        info!("Moved file {} to {}", origin, destination);
        Ok(())
    }

    /// Same-parent move
    pub async fn rename(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        if origin.parent() != destination.parent() {
            return Err(FsError::InvalidPath(format!(
                "rename must stay within {}",
                origin.parent().unwrap_or_else(VirtualPath::root)
            )));
        }
        self.move_to(origin, destination).await
    }

    /// Metadata of an existing regular file
    pub async fn require_file(&self, path: &VirtualPath) -> Result<EntryMetadata, FsError> {
        match self.backend.metadata(path).await? {
            Some(metadata) if metadata.is_file() => Ok(metadata),
            Some(_) => Err(FsError::InvalidPath(format!("{} is not a file", path))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn check_transfer(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        self.require_file(origin).await?;
        if self.backend.metadata(destination).await?.is_some() {
            return Err(FsError::Conflict(destination.to_string()));
        }
        let parent = destination.parent().unwrap_or_else(VirtualPath::root);
        match self.backend.metadata(&parent).await? {
            Some(metadata) if metadata.is_dir() => Ok(()),
            _ => Err(FsError::NotFound(parent.to_string())),
        }
    }
}
