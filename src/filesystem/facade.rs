//! File system facade
//!
//! The public contract used by request handlers. Raw client strings are
//! resolved here, once, and every mutation comes back as an
//! [`OperationResult`] instead of an error.

use std::path::Path;
use std::sync::Arc;

use crate::error::FsError;
use crate::error::handlers::{handle_error, into_operation_result};
use crate::filesystem::results::OperationResult;
use crate::storage::{
    DirectoryEntry, DirectoryStore, FileEntry, FileStore, LocalFileSystem, StorageBackend,
    VirtualPath,
};
use crate::thumbnail::{ThumbnailEngine, ThumbnailSettings};
use crate::transfer::file_ops::drain;
use crate::transfer::{DownloadHandle, IncomingFile, StreamTransfer, TransferSettings};

#[derive(Debug, Clone, Default)]
pub struct FileSystemSettings {
    pub transfer: TransferSettings,
    pub thumbnails: ThumbnailSettings,
}

/// One sandboxed file system, bound to a profile
pub struct FileSystem {
    profile: String,
    backend: Arc<dyn StorageBackend>,
    directories: DirectoryStore,
    files: FileStore,
    transfer: StreamTransfer,
    thumbnails: ThumbnailEngine,
}

impl FileSystem {
    pub fn new(
        profile: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        settings: &FileSystemSettings,
    ) -> Self {
        Self {
            profile: profile.into(),
            directories: DirectoryStore::new(backend.clone()),
            files: FileStore::new(backend.clone()),
            transfer: StreamTransfer::new(backend.clone(), settings.transfer.clone()),
            thumbnails: ThumbnailEngine::new(backend.clone(), &settings.thumbnails),
            backend,
        }
    }

    /// Facade over a local directory
    pub fn local(
        profile: impl Into<String>,
        root: impl AsRef<Path>,
        settings: &FileSystemSettings,
    ) -> Result<Self, FsError> {
        let backend = Arc::new(LocalFileSystem::new(root)?);
        Ok(Self::new(profile, backend, settings))
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn resolve(&self, raw: &str) -> Result<VirtualPath, FsError> {
        self.backend.resolver().resolve(raw)
    }

    /// Rename destinations may be a full path or a bare new name for the
    /// same parent, which is what older clients send.
    fn rename_target(&self, origin: &VirtualPath, raw: &str) -> Result<VirtualPath, FsError> {
        if raw.contains('/') {
            return self.resolve(raw);
        }
        let sibling = origin.parent().unwrap_or_else(VirtualPath::root).join(raw)?;
        self.resolve(sibling.as_str())
    }

    pub async fn list_tree(&self) -> Result<Vec<DirectoryEntry>, FsError> {
        self.directories.list_tree().await.inspect_err(|e| handle_error("list_tree", e))
    }

    pub async fn list_files(&self, dir: &str) -> Result<Vec<FileEntry>, FsError> {
        let outcome = async {
            let dir = self.resolve(dir)?;
            self.files.list(&dir).await
        }
        .await;
        outcome.inspect_err(|e| handle_error("list_files", e))
    }

    pub async fn create_directory(&self, dir: &str, name: &str) -> OperationResult {
        let outcome = async {
            let parent = self.resolve(dir)?;
            self.directories.create(&parent, name).await.map(|_| ())
        }
        .await;
        into_operation_result("create_directory", outcome)
    }

    pub async fn delete_directory(&self, dir: &str) -> OperationResult {
        let outcome = async {
            let target = self.resolve(dir)?;
            self.directories.delete(&target).await
        }
        .await;
        into_operation_result("delete_directory", outcome)
    }

    pub async fn move_directory(&self, origin: &str, destination: &str) -> OperationResult {
        let outcome = async {
            let origin = self.resolve(origin)?;
            let destination = self.resolve(destination)?;
            self.directories.move_to(&origin, &destination).await
        }
        .await;
        into_operation_result("move_directory", outcome)
    }

    pub async fn copy_directory(&self, origin: &str, destination: &str) -> OperationResult {
        let outcome = async {
            let origin = self.resolve(origin)?;
            let destination = self.resolve(destination)?;
            self.directories.copy(&origin, &destination).await
        }
        .await;
        into_operation_result("copy_directory", outcome)
    }

    pub async fn rename_directory(&self, origin: &str, destination: &str) -> OperationResult {
        let outcome = async {
            let origin = self.resolve(origin)?;
            let destination = self.rename_target(&origin, destination)?;
            self.directories.rename(&origin, &destination).await
        }
        .await;
        into_operation_result("rename_directory", outcome)
    }

    /// Stores every part into `dir`; one message lists all failed parts
    pub async fn upload(&self, dir: &str, mut files: Vec<IncomingFile>) -> OperationResult {
        let target = match self.resolve(dir) {
            Ok(target) => target,
            Err(e) => {
                for file in files.iter_mut() {
                    drain(&mut file.data).await;
                }
                return into_operation_result("upload", Err(e));
            }
        };

        match self.transfer.upload(&target, files).await {
            Ok(report) => match report.failure_message() {
                None => OperationResult::ok(),
                Some(message) => OperationResult::failure(message),
            },
            Err(e) => into_operation_result("upload", Err(e)),
        }
    }

    pub async fn download(&self, file: &str) -> Result<DownloadHandle, FsError> {
        let outcome = async {
            let file = self.resolve(file)?;
            self.transfer.download(&file).await
        }
        .await;
        outcome.inspect_err(|e| handle_error("download", e))
    }

    pub async fn download_directory(&self, dir: &str) -> Result<DownloadHandle, FsError> {
        let outcome = async {
            let dir = self.resolve(dir)?;
            self.transfer.download_directory(&dir).await
        }
        .await;
        outcome.inspect_err(|e| handle_error("download_directory", e))
    }

    pub async fn delete_file(&self, file: &str) -> OperationResult {
        let outcome = async {
            let file = self.resolve(file)?;
            self.files.delete(&file).await
        }
        .await;
        into_operation_result("delete_file", outcome)
    }

    pub async fn move_file(&self, origin: &str, destination: &str) -> OperationResult {
        let outcome = async {
            let origin = self.resolve(origin)?;
            let destination = self.resolve(destination)?;
            self.files.move_to(&origin, &destination).await
        }
        .await;
        into_operation_result("move_file", outcome)
    }

    pub async fn copy_file(&self, origin: &str, destination: &str) -> OperationResult {
        let outcome = async {
            let origin = self.resolve(origin)?;
            let destination = self.resolve(destination)?;
            self.files.copy(&origin, &destination).await
        }
        .await;
        into_operation_result("copy_file", outcome)
    }

    pub async fn rename_file(&self, origin: &str, destination: &str) -> OperationResult {
        let outcome = async {
            let origin = self.resolve(origin)?;
            let destination = self.rename_target(&origin, destination)?;
            self.files.rename(&origin, &destination).await
        }
        .await;
        into_operation_result("rename_file", outcome)
    }

    pub async fn thumbnail(
        &self,
        file: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<DownloadHandle, FsError> {
        let outcome = async {
            let file = self.resolve(file)?;
            self.thumbnails.thumbnail(&file, width, height).await
        }
        .await;
        outcome.inspect_err(|e| handle_error("thumbnail", e))
    }
}
