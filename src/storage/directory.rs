//! Directory operations
//!
//! Tree listing and whole-directory mutations on top of a storage backend.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FsError;
use crate::storage::backend::{EntryKind, StorageBackend};
use crate::storage::path::VirtualPath;
use crate::storage::results::DirectoryEntry;

#[derive(Clone)]
pub struct DirectoryStore {
    backend: Arc<dyn StorageBackend>,
}

impl DirectoryStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Every directory of the sandbox, depth-first in lexicographic order,
    /// with immediate child counts taken from a single fresh walk.
    pub async fn list_tree(&self) -> Result<Vec<DirectoryEntry>, FsError> {
        let walked = self.backend.walk(&VirtualPath::root()).await?;

        let mut order = Vec::new();
        let mut counts: HashMap<VirtualPath, (u64, u64)> = HashMap::new();
        for (path, kind) in &walked {
            if *kind == EntryKind::Directory {
                order.push(path.clone());
                counts.entry(path.clone()).or_default();
            }
            let Some(parent) = path.parent() else {
                continue;
            };
            let slot = counts.entry(parent).or_default();
            match kind {
                EntryKind::File => slot.0 += 1,
                EntryKind::Directory => slot.1 += 1,
                EntryKind::Other => {}
            }
        }

        debug!("Listed {} directories", order.len());
        Ok(order
            .into_iter()
            .map(|path| {
                let (file_count, subdirectory_count) = counts.get(&path).copied().unwrap_or_default();
                DirectoryEntry {
                    path,
                    file_count,
                    subdirectory_count,
                }
            })
            .collect())
    }

    pub async fn create(&self, parent: &VirtualPath, name: &str) -> Result<VirtualPath, FsError> {
        let target = parent.join(name)?;
        self.require_dir(parent).await?;
        self.backend.create_dir(&target).await?;
        info!("Created directory {}", target);
        Ok(target)
    }

    /// Recursive removal. The sandbox root itself is never removed.
    pub async fn delete(&self, target: &VirtualPath) -> Result<(), FsError> {
        if target.is_root() {
            return Err(FsError::PermissionDenied("the root directory cannot be deleted".into()));
        }
        self.require_dir(target).await?;
        self.backend.remove_dir_all(target).await?;
        info!("Deleted directory {}", target);
        Ok(())
    }

    pub async fn copy(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        self.check_transfer(origin, destination).await?;
        self.copy_tree(origin, destination).await?;
        info!("Copied directory {} to {}", origin, destination);
        Ok(())
    }

    /// Atomic rename where the backend allows it, copy-then-delete when the
    /// destination sits on another device.
    pub async fn move_to(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        self.check_transfer(origin, destination).await?;
        match self.backend.rename(origin, destination).await {
            Ok(()) => {}
            Err(e) if e.is_cross_device() => {
                debug!("Falling back to copy for {} -> {}", origin, destination);
                self.copy_tree(origin, destination).await?;
                self.backend.remove_dir_all(origin).await?;
            }
            Err(e) => return Err(e),
        }
        info!("Moved directory {} to {}", origin, destination);
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

    async fn require_dir(&self, path: &VirtualPath) -> Result<(), FsError> {
        match self.backend.metadata(path).await? {
            Some(metadata) if metadata.is_dir() => Ok(()),
            Some(_) => Err(FsError::InvalidPath(format!("{} is not a directory", path))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn check_transfer(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        if origin.is_root() {
            return Err(FsError::PermissionDenied("the root directory cannot be relocated".into()));
        }
        self.require_dir(origin).await?;
        if destination.starts_with(origin) {
            return Err(FsError::InvalidPath(format!(
                "{} cannot be placed inside itself",
                origin
            )));
        }
        if self.backend.metadata(destination).await?.is_some() {
            return Err(FsError::Conflict(destination.to_string()));
        }
        match destination.parent() {
            Some(parent) => self.require_dir(&parent).await,
            None => Err(FsError::Conflict(destination.to_string())),
        }
    }

    async fn copy_tree(&self, origin: &VirtualPath, destination: &VirtualPath) -> Result<(), FsError> {
        for (path, kind) in self.backend.walk(origin).await? {
            let Some(target) = path.rebase(origin, destination) else {
                continue;
            };
            match kind {
                EntryKind::Directory => self.backend.create_dir(&target).await?,
                EntryKind::File => {
                    self.backend.copy_file(&path, &target).await?;
                }
                EntryKind::Other => debug!("Skipping special entry {}", path),
            }
        }
        Ok(())
    }
}
