//! Transfer operations
//!
//! Upload ingestion and download emission for one storage backend.

use log::{info, warn};
use std::sync::Arc;

use crate::error::FsError;
use crate::storage::{ByteStream, StorageBackend, VirtualPath};
use crate::transfer::archive::archive_stream;
use crate::transfer::file_ops::{client_file_name, content_type_for, drain, reader_stream};
use crate::transfer::results::{DownloadHandle, IncomingFile, UploadReport};

/// Stream sizing knobs
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Largest chunk handed to consumers
    pub chunk_size: usize,
    /// Bytes buffered between the archive producer and its consumer
    pub archive_pipe_capacity: usize,
    pub max_upload_bytes: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            archive_pipe_capacity: 256 * 1024,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Clone)]
pub struct StreamTransfer {
    backend: Arc<dyn StorageBackend>,
    settings: TransferSettings,
}

impl StreamTransfer {
    pub fn new(backend: Arc<dyn StorageBackend>, settings: TransferSettings) -> Self {
        Self { backend, settings }
    }

    /// Stores every part into `dir`, replacing same-named files. Parts are
    /// handled in order; a failing part is recorded and drained, and the
    /// batch carries on with the next one.
    pub async fn upload(
        &self,
        dir: &VirtualPath,
        files: Vec<IncomingFile>,
    ) -> Result<UploadReport, FsError> {
        if let Err(e) = self.require_dir(dir).await {
            for mut file in files {
                drain(&mut file.data).await;
            }
            return Err(e);
        }

        let mut report = UploadReport::default();
        for IncomingFile {
            file_name,
            mut data,
        } in files
        {
            match self.store_one(dir, &file_name, &mut data).await {
                Ok(path) => report.stored.push(path),
                Err(e) => {
                    warn!("Upload of {:?} into {} failed: {}", file_name, dir, e);
                    drain(&mut data).await;
                    report.failures.push(format!("{}: {}", file_name, e));
                }
            }
        }

        info!(
            "Upload into {}: {} stored, {} failed",
            dir,
            report.stored.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn store_one(
        &self,
        dir: &VirtualPath,
        file_name: &str,
        data: &mut ByteStream,
    ) -> Result<VirtualPath, FsError> {
        let target = dir.join(client_file_name(file_name))?;
        if let Some(existing) = self.backend.metadata(&target).await? {
            if !existing.is_file() {
                return Err(FsError::Conflict(target.to_string()));
            }
        }
        self.backend
            .write_stream(&target, data, self.settings.max_upload_bytes)
            .await?;
        Ok(target)
    }

    /// Streams one file straight from storage
    pub async fn download(&self, file: &VirtualPath) -> Result<DownloadHandle, FsError> {
        match self.backend.metadata(file).await? {
            Some(metadata) if metadata.is_file() => {}
            Some(_) => return Err(FsError::InvalidPath(format!("{} is not a file", file))),
            None => return Err(FsError::NotFound(file.to_string())),
        }

        let reader = self.backend.open_read(file).await?;
        let file_name = file.file_name().unwrap_or_default().to_string();
        info!("Download of {} started", file);
        Ok(DownloadHandle {
            content_type: content_type_for(&file_name).to_string(),
            file_name,
            data: reader_stream(reader, self.settings.chunk_size),
        })
    }

    /// Streams a zip of the directory. The tree is walked up front so that
    /// a missing or unreadable directory fails before any byte is sent.
    pub async fn download_directory(&self, dir: &VirtualPath) -> Result<DownloadHandle, FsError> {
        self.require_dir(dir).await?;
        let entries = self.backend.walk(dir).await?;

        let file_name = format!("{}.zip", dir.file_name().unwrap_or("root"));
        info!("Archive download of {} started ({} entries)", dir, entries.len().saturating_sub(1));
        Ok(DownloadHandle {
            content_type: "application/zip".to_string(),
            file_name,
            data: archive_stream(
                self.backend.clone(),
                dir.clone(),
                entries,
                self.settings.chunk_size,
                self.settings.archive_pipe_capacity,
            ),
        })
    }

    async fn require_dir(&self, dir: &VirtualPath) -> Result<(), FsError> {
        match self.backend.metadata(dir).await? {
            Some(metadata) if metadata.is_dir() => Ok(()),
            Some(_) => Err(FsError::InvalidPath(format!("{} is not a directory", dir))),
            None => Err(FsError::NotFound(dir.to_string())),
        }
    }
}
