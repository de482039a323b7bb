//! Local disk backend
//!
//! Implements [`StorageBackend`] on top of `tokio::fs`, with blocking tree
//! walks pushed onto the blocking pool.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use std::fs::FileType;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use walkdir::WalkDir;

use crate::error::FsError;
use crate::storage::backend::{ByteReader, ByteStream, EntryKind, EntryMetadata, StorageBackend};
use crate::storage::path::{PathResolver, STAGING_DIR, VirtualPath};

const MAX_RETRIES: u32 = 3;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sandboxed directory on the local file system
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    resolver: PathResolver,
    staging: PathBuf,
}

impl LocalFileSystem {
    /// Opens the sandbox and clears staging files left behind by a previous
    /// run that died mid-write.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let resolver = PathResolver::new(root)?;
        let staging = resolver.root().join(STAGING_DIR);
        match std::fs::remove_dir_all(&staging) {
            Ok(()) => debug!("Cleared stale staging area {}", staging.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not clear staging area {}: {}", staging.display(), e),
        }
        Ok(Self { resolver, staging })
    }

    fn locate(&self, path: &VirtualPath) -> PathBuf {
        self.resolver.locate(path)
    }

    /// Fresh staging file on the same device as the sandbox. Unique per
    /// process and call so concurrent writers never share one.
    async fn staging_path(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.staging).await?;
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        Ok(self.staging.join(format!("{}-{}.part", process::id(), seq)))
    }
}

fn is_staging_entry(parent: &VirtualPath, name: &str) -> bool {
    parent.is_root() && name == STAGING_DIR
}

fn kind_of(file_type: FileType) -> EntryKind {
    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

fn entry_metadata(metadata: &std::fs::Metadata) -> EntryMetadata {
    EntryMetadata {
        kind: kind_of(metadata.file_type()),
        size: metadata.len(),
        modified: metadata.modified().ok(),
    }
}

/// `rename(2)` replaces an existing file, so files are linked under the new
/// name first, which fails if the name is taken.
async fn move_file_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    fs::hard_link(source, target).await?;
    if let Err(e) = fs::remove_file(source).await {
        if let Err(undo) = fs::remove_file(target).await {
            warn!("Failed to undo link {}: {}", target.display(), undo);
        }
        return Err(e);
    }
    Ok(())
}

/// Claims the target name with an empty directory, then renames over it.
/// A concurrent claim loses at `create_dir`.
async fn move_dir_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir(target).await?;
    if let Err(e) = fs::rename(source, target).await {
        if let Err(undo) = fs::remove_dir(target).await {
            warn!("Failed to release {}: {}", target.display(), undo);
        }
        return Err(e);
    }
    Ok(())
}

/// Removes a partially written file on every exit path unless disarmed,
/// including when the owning future is dropped mid-transfer.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Runs a removal, retrying transient permission failures.
async fn with_retries<F, Fut>(path: &VirtualPath, mut op: F) -> Result<(), FsError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = io::Result<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_RETRIES && e.kind() == io::ErrorKind::PermissionDenied => {
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                attempt += 1;
            }
            Err(e) => return Err(FsError::from_io(e, path)),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFileSystem {
    fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    async fn metadata(&self, path: &VirtualPath) -> Result<Option<EntryMetadata>, FsError> {
        match fs::symlink_metadata(self.locate(path)).await {
            Ok(metadata) => Ok(Some(entry_metadata(&metadata))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FsError::from_io(e, path)),
        }
    }

    async fn read_dir(
        &self,
        path: &VirtualPath,
    ) -> Result<Vec<(VirtualPath, EntryMetadata)>, FsError> {
        let mut entries = fs::read_dir(self.locate(path))
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| FsError::from_io(e, path))? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!("Skipping non UTF-8 entry in {}", path);
                continue;
            };
            if is_staging_entry(path, &name) {
                continue;
            }
            let Ok(child) = path.join(&name) else {
                warn!("Skipping unaddressable entry {:?} in {}", name, path);
                continue;
            };
            match entry.metadata().await {
                Ok(metadata) => children.push((child, entry_metadata(&metadata))),
                // Removed between listing and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(FsError::from_io(e, &child)),
            }
        }

        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    async fn walk(&self, path: &VirtualPath) -> Result<Vec<(VirtualPath, EntryKind)>, FsError> {
        let root = self.locate(path);
        let base = path.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<(VirtualPath, EntryKind)>, FsError> {
            let mut out = Vec::new();
            let mut it = WalkDir::new(&root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter();

            while let Some(entry) = it.next() {
                let entry = entry.map_err(|e| FsError::from_io(io::Error::from(e), &base))?;
                let kind = kind_of(entry.file_type());

                if entry.depth() == 0 {
                    out.push((base.clone(), kind));
                    continue;
                }
                if entry.depth() == 1
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| is_staging_entry(&base, name))
                {
                    if kind == EntryKind::Directory {
                        it.skip_current_dir();
                    }
                    continue;
                }

                let Some(child) = entry
                    .path()
                    .strip_prefix(&root)
                    .ok()
                    .and_then(|rel| {
                        rel.components().try_fold(base.clone(), |acc, component| {
                            acc.join(component.as_os_str().to_str()?).ok()
                        })
                    })
                else {
                    warn!("Skipping unaddressable entry {}", entry.path().display());
                    if kind == EntryKind::Directory {
                        it.skip_current_dir();
                    }
                    continue;
                };
                out.push((child, kind));
            }
            Ok(out)
        })
        .await
        .map_err(|e| FsError::Io(io::Error::other(e)))?
    }

    async fn create_dir(&self, path: &VirtualPath) -> Result<(), FsError> {
        fs::create_dir(self.locate(path))
            .await
            .map_err(|e| FsError::from_io(e, path))
    }

    async fn remove_dir_all(&self, path: &VirtualPath) -> Result<(), FsError> {
        let real = self.locate(path);
        with_retries(path, || fs::remove_dir_all(&real)).await
    }

    async fn remove_file(&self, path: &VirtualPath) -> Result<(), FsError> {
        let real = self.locate(path);
        with_retries(path, || fs::remove_file(&real)).await
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<(), FsError> {
        let source = self.locate(from);
        let target = self.locate(to);
        let metadata = fs::symlink_metadata(&source)
            .await
            .map_err(|e| FsError::from_io(e, from))?;

        let outcome = if metadata.is_dir() {
            move_dir_no_replace(&source, &target).await
        } else {
            move_file_no_replace(&source, &target).await
        };
        outcome.map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                FsError::Conflict(to.to_string())
            }
            _ => FsError::from_io(e, from),
        })
    }

    async fn copy_file(&self, from: &VirtualPath, to: &VirtualPath) -> Result<u64, FsError> {
        let mut reader = File::open(self.locate(from))
            .await
            .map_err(|e| FsError::from_io(e, from))?;
        let modified = reader
            .metadata()
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        let target = self.locate(to);
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| FsError::from_io(e, to))?;
        let mut guard = PartialFile::new(target);

        let copied = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| FsError::from_io(e, to))?;
        writer.flush().await.map_err(|e| FsError::from_io(e, to))?;
        guard.disarm();

        if let Some(time) = modified {
            let file = writer.into_std().await;
            let outcome = tokio::task::spawn_blocking(move || file.set_modified(time)).await;
            if !matches!(outcome, Ok(Ok(()))) {
                debug!("Could not carry modification time over to {}", to);
            }
        }

        Ok(copied)
    }

    async fn open_read(&self, path: &VirtualPath) -> Result<ByteReader, FsError> {
        let file = File::open(self.locate(path))
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn read_head(&self, path: &VirtualPath, limit: u64) -> Result<Vec<u8>, FsError> {
        let file = File::open(self.locate(path))
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        let mut head = Vec::new();
        file.take(limit)
            .read_to_end(&mut head)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(head)
    }

    async fn write_stream(
        &self,
        path: &VirtualPath,
        data: &mut ByteStream,
        max_bytes: u64,
    ) -> Result<u64, FsError> {
        let target = self.locate(path);
        let staging = self
            .staging_path()
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        let mut guard = PartialFile::new(staging.clone());

        let mut total = 0u64;
        while let Some(chunk) = data.next().await {
            let chunk = chunk.map_err(FsError::Io)?;
            total += chunk.len() as u64;
            if total > max_bytes {
                return Err(FsError::Io(io::Error::new(
                    io::ErrorKind::FileTooLarge,
                    format!("{} exceeds the upload limit of {} bytes", path, max_bytes),
                )));
            }
            file.write_all(&chunk).await.map_err(FsError::Io)?;
        }

        file.flush().await.map_err(FsError::Io)?;
        file.sync_all().await.map_err(FsError::Io)?;
        drop(file);

        fs::rename(&staging, &target)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        guard.disarm();

        info!("Stored {} ({} bytes)", path, total);
        Ok(total)
    }
}
