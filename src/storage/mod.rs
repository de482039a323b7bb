//! File system storage management
//!
//! Path confinement, the backend abstraction, and the directory and file
//! stores built on it.

pub mod backend;
pub mod directory;
pub mod files;
pub mod local;
pub mod metadata;
pub mod path;
pub mod results;

pub use backend::{ByteReader, ByteStream, EntryKind, EntryMetadata, StorageBackend};
pub use directory::DirectoryStore;
pub use files::FileStore;
pub use local::LocalFileSystem;
pub use metadata::MetadataProbe;
pub use path::{PathResolver, STAGING_DIR, VirtualPath};
pub use results::{DirectoryEntry, FileEntry};
