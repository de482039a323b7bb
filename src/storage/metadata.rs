//! Metadata probing
//!
//! Size, modification time and, for images, pixel dimensions read from the
//! file header.

use image::ImageReader;
use log::debug;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::storage::backend::{EntryMetadata, StorageBackend};
use crate::storage::path::VirtualPath;
use crate::storage::results::FileEntry;

/// Header bytes read when looking for image dimensions. Large enough for
/// JPEGs carrying embedded EXIF previews.
const PROBE_LIMIT: u64 = 256 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// True when the name carries an image extension we can size
pub fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn unix_seconds(time: Option<SystemTime>) -> u64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct MetadataProbe {
    backend: Arc<dyn StorageBackend>,
}

impl MetadataProbe {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Builds the listing record for a file already known to exist
    pub async fn probe(&self, path: VirtualPath, metadata: &EntryMetadata) -> FileEntry {
        let dimensions = self.dimensions(&path).await;
        FileEntry {
            size_bytes: metadata.size,
            last_modified: unix_seconds(metadata.modified),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            path,
        }
    }

    /// Pixel dimensions for recognized images, `None` for everything else
    /// including images whose header cannot be parsed.
    pub async fn dimensions(&self, path: &VirtualPath) -> Option<(u32, u32)> {
        if !path.file_name().map(is_image_name).unwrap_or(false) {
            return None;
        }
        let head = match self.backend.read_head(path, PROBE_LIMIT).await {
            Ok(head) => head,
            Err(e) => {
                debug!("Could not read header of {}: {}", path, e);
                return None;
            }
        };
        let dimensions = ImageReader::new(Cursor::new(head))
            .with_guessed_format()
            .ok()?
            .into_dimensions();
        match dimensions {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                debug!("No dimensions for {}: {}", path, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_names_are_recognized_case_insensitively() {
        assert!(is_image_name("photo.JPG"));
        assert!(is_image_name("a.b.webp"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("png"));
    }

    #[test]
    fn missing_times_render_as_zero() {
        assert_eq!(unix_seconds(None), 0);
        assert_eq!(unix_seconds(Some(UNIX_EPOCH + std::time::Duration::from_secs(42))), 42);
    }
}
