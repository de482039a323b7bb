//! Thumbnail engine
//!
//! Decodes a source image, shrinks it to fit a bounding box with its aspect
//! ratio intact, and re-encodes it. Decoding and encoding run on the
//! blocking pool under a semaphore so they never stall I/O work.

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use std::io::{self, Cursor};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::FsError;
use crate::storage::{StorageBackend, VirtualPath};
use crate::thumbnail::cache::{CacheKey, CachedThumbnail, ThumbnailCache};
use crate::transfer::{DownloadHandle, bytes_stream};

pub const DEFAULT_WIDTH: u32 = 200;
pub const DEFAULT_HEIGHT: u32 = 200;

#[derive(Debug, Clone)]
pub struct ThumbnailSettings {
    /// Concurrent decode/encode jobs
    pub workers: usize,
    pub cache_entries: usize,
    /// Sources above this size are refused before decoding
    pub max_source_bytes: u64,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            cache_entries: 256,
            max_source_bytes: 20 * 1024 * 1024,
        }
    }
}

pub struct ThumbnailEngine {
    backend: Arc<dyn StorageBackend>,
    workers: Arc<Semaphore>,
    cache: ThumbnailCache,
    max_source_bytes: u64,
}

impl ThumbnailEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, settings: &ThumbnailSettings) -> Self {
        Self {
            backend,
            workers: Arc::new(Semaphore::new(settings.workers.max(1))),
            cache: ThumbnailCache::new(settings.cache_entries),
            max_source_bytes: settings.max_source_bytes,
        }
    }

    /// Renders (or fetches from cache) a thumbnail of `file` fitting within
    /// `width` x `height`. Missing or zero dimensions fall back to 200x200.
    pub async fn thumbnail(
        &self,
        file: &VirtualPath,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<DownloadHandle, FsError> {
        let width = width.filter(|w| *w > 0).unwrap_or(DEFAULT_WIDTH);
        let height = height.filter(|h| *h > 0).unwrap_or(DEFAULT_HEIGHT);

        let metadata = match self.backend.metadata(file).await? {
            Some(metadata) if metadata.is_file() => metadata,
            Some(_) => return Err(FsError::UnsupportedFormat(file.to_string())),
            None => return Err(FsError::NotFound(file.to_string())),
        };
        if metadata.size > self.max_source_bytes {
            return Err(FsError::UnsupportedFormat(format!(
                "{} is too large to thumbnail",
                file
            )));
        }

        let key = CacheKey {
            path: file.clone(),
            modified: metadata.modified,
            size: metadata.size,
            width,
            height,
        };
        let file_name = file.file_name().unwrap_or_default().to_string();

        if let Some(hit) = self.cache.get(&key) {
            debug!("Thumbnail cache hit for {} at {}x{}", file, width, height);
            return Ok(handle(file_name, hit));
        }

        // Waiting callers hold no source bytes
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FsError::Io(io::Error::other(e)))?;
        let source = self.backend.read_head(file, self.max_source_bytes).await?;
        let label = file.to_string();
        let rendered = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            render(&source, width, height, &label)
        })
        .await
        .map_err(|e| FsError::Io(io::Error::other(e)))??;

        self.cache.insert(key, rendered.clone());
        info!(
            "Rendered thumbnail of {} at {}x{} ({} bytes, {} cached)",
            file,
            width,
            height,
            rendered.body.len(),
            self.cache.len()
        );
        Ok(handle(file_name, rendered))
    }
}

fn handle(file_name: String, thumbnail: CachedThumbnail) -> DownloadHandle {
    DownloadHandle {
        content_type: thumbnail.content_type.to_string(),
        file_name,
        data: bytes_stream(thumbnail.body),
    }
}

/// Formats we can write back in kind; everything else becomes PNG.
fn output_format(source: ImageFormat) -> ImageFormat {
    match source {
        ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::Gif
        | ImageFormat::Bmp
        | ImageFormat::WebP => source,
        _ => ImageFormat::Png,
    }
}

/// Fit-within resize. Images already inside the box are left at their size.
pub fn fit_within(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() <= width && image.height() <= height {
        return image;
    }
    image.thumbnail(width, height)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    if format == ImageFormat::Jpeg {
        // JPEG has no alpha channel
        DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut Cursor::new(&mut out), format)?;
    } else {
        image.write_to(&mut Cursor::new(&mut out), format)?;
    }
    Ok(out)
}

/// Decodes `source`, resizes and re-encodes it. CPU bound.
pub fn render(source: &[u8], width: u32, height: u32, label: &str) -> Result<CachedThumbnail, FsError> {
    let format = image::guess_format(source)
        .map_err(|_| FsError::UnsupportedFormat(label.to_string()))?;
    let decoded = image::load_from_memory_with_format(source, format)
        .map_err(|e| FsError::UnsupportedFormat(format!("{} ({})", label, e)))?;
    let resized = fit_within(decoded, width, height);

    let target = output_format(format);
    let (format, body) = match encode(&resized, target) {
        Ok(body) => (target, body),
        Err(e) if target != ImageFormat::Png => {
            debug!("Re-encoding {} as {:?} failed ({}), using PNG", label, target, e);
            let body = encode(&resized, ImageFormat::Png)
                .map_err(|e| FsError::Io(io::Error::other(e)))?;
            (ImageFormat::Png, body)
        }
        Err(e) => return Err(FsError::Io(io::Error::other(e))),
    };

    Ok(CachedThumbnail {
        content_type: format.to_mime_type(),
        body: Bytes::from(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn landscape_fits_box_with_aspect_ratio() {
        let thumb = render(&png(800, 600), 200, 200, "/x.png").unwrap();
        assert_eq!(thumb.content_type, "image/png");
        let decoded = image::load_from_memory(&thumb.body).unwrap();
        assert_eq!(decoded.dimensions(), (200, 150));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let thumb = render(&png(40, 30), 200, 200, "/small.png").unwrap();
        let decoded = image::load_from_memory(&thumb.body).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[tokio::test]
    async fn source_is_read_only_once_a_worker_is_free() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("late.png"), png(64, 64)).unwrap();
        let backend = Arc::new(crate::storage::LocalFileSystem::new(dir.path()).unwrap());
        let settings = ThumbnailSettings {
            workers: 1,
            ..ThumbnailSettings::default()
        };
        let engine = Arc::new(ThumbnailEngine::new(backend, &settings));

        let busy = engine.workers.clone().acquire_owned().await.unwrap();
        let waiting = {
            let engine = engine.clone();
            tokio::spawn(async move {
                let file = VirtualPath::root().join("late.png").unwrap();
                engine.thumbnail(&file, None, None).await.map(|_| ())
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // Nothing was buffered while queued, so the removal is observed
        std::fs::remove_file(dir.path().join("late.png")).unwrap();
        drop(busy);
        assert!(matches!(waiting.await.unwrap(), Err(FsError::NotFound(_))));
    }

    #[test]
    fn non_images_are_unsupported() {
        assert!(matches!(
            render(b"plain text, not pixels", 200, 200, "/a.txt"),
            Err(FsError::UnsupportedFormat(_))
        ));
    }
}
