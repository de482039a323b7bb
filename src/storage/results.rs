//! Storage result types
//!
//! Listing records returned by the stores. Field names serialize to the
//! compact keys existing browser clients expect.

use serde::Serialize;

use crate::storage::path::VirtualPath;

/// One directory of the tree listing, `{p, f, d}` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    #[serde(rename = "p")]
    pub path: VirtualPath,
    /// Immediate regular files
    #[serde(rename = "f")]
    pub file_count: u64,
    /// Immediate subdirectories
    #[serde(rename = "d")]
    pub subdirectory_count: u64,
}

/// One file of a directory listing, `{p, s, t, w, h}` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    #[serde(rename = "p")]
    pub path: VirtualPath,
    #[serde(rename = "s")]
    pub size_bytes: u64,
    /// Unix seconds
    #[serde(rename = "t")]
    pub last_modified: u64,
    #[serde(rename = "w")]
    pub width: Option<u32>,
    #[serde(rename = "h")]
    pub height: Option<u32>,
}
