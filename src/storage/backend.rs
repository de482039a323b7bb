//! Storage backend abstraction
//!
//! The stores and the transfer layer only ever talk to [`StorageBackend`];
//! the local disk is one implementation, object storage could be another.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use std::time::SystemTime;
use tokio::io::AsyncRead;

use crate::error::FsError;
use crate::storage::path::{PathResolver, VirtualPath};

/// Lazy, single-consumption sequence of byte chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Boxed reader handed out by [`StorageBackend::open_read`].
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks, sockets and anything else the stores leave alone
    Other,
}

#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl EntryMetadata {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Capability set every storage variant provides.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Resolver confining client input to this backend's sandbox
    fn resolver(&self) -> &PathResolver;

    /// Metadata without following a final symlink, `None` if absent
    async fn metadata(&self, path: &VirtualPath) -> Result<Option<EntryMetadata>, FsError>;

    /// Immediate children sorted by name
    async fn read_dir(
        &self,
        path: &VirtualPath,
    ) -> Result<Vec<(VirtualPath, EntryMetadata)>, FsError>;

    /// Depth-first walk in lexicographic order, starting with `path` itself
    async fn walk(&self, path: &VirtualPath) -> Result<Vec<(VirtualPath, EntryKind)>, FsError>;

    /// Creates a single directory, failing if anything exists at `path`
    async fn create_dir(&self, path: &VirtualPath) -> Result<(), FsError>;

    async fn remove_dir_all(&self, path: &VirtualPath) -> Result<(), FsError>;

    async fn remove_file(&self, path: &VirtualPath) -> Result<(), FsError>;

    /// Atomic rename within the backend. Never replaces an existing entry:
    /// a taken destination is `Conflict`, even when another caller claims
    /// it between any earlier check and this call.
    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<(), FsError>;

    /// Copies one file to a path that must not exist yet, keeping the
    /// modification time where the backend allows it
    async fn copy_file(&self, from: &VirtualPath, to: &VirtualPath) -> Result<u64, FsError>;

    async fn open_read(&self, path: &VirtualPath) -> Result<ByteReader, FsError>;

    /// Reads at most `limit` bytes from the start of a file
    async fn read_head(&self, path: &VirtualPath, limit: u64) -> Result<Vec<u8>, FsError>;

    /// Writes `data` so that readers see either the previous content or the
    /// complete new content. Aborts once more than `max_bytes` arrive.
    async fn write_stream(
        &self,
        path: &VirtualPath,
        data: &mut ByteStream,
        max_bytes: u64,
    ) -> Result<u64, FsError>;
}
