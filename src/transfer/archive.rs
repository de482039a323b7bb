//! Directory archives
//!
//! Packs a directory into a zip container on a background task. The task
//! writes into a bounded in-memory pipe, so memory stays flat regardless of
//! tree size and the consumer sees bytes as soon as the first entry starts.

use async_zip::base::write::ZipFileWriter;
use async_zip::error::ZipError;
use async_zip::{Compression, ZipEntryBuilder};
use futures::AsyncWriteExt;
use log::{info, warn};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, DuplexStream};

use crate::storage::{ByteStream, EntryKind, StorageBackend, VirtualPath};
use crate::transfer::file_ops::producer_stream;

fn zip_error(e: ZipError) -> io::Error {
    io::Error::other(e)
}

/// Starts the producer and returns the consumer side as a chunk stream.
/// Dropping the stream closes the pipe, which makes the producer fail on its
/// next write and release the file it was reading.
pub fn archive_stream(
    backend: Arc<dyn StorageBackend>,
    dir: VirtualPath,
    entries: Vec<(VirtualPath, EntryKind)>,
    chunk_size: usize,
    pipe_capacity: usize,
) -> ByteStream {
    let (writer, reader) = tokio::io::duplex(pipe_capacity);

    let producer = tokio::spawn(async move {
        let outcome = write_archive(backend.as_ref(), &dir, entries, writer, chunk_size).await;
        match &outcome {
            Ok(count) => info!("Archived {} ({} entries)", dir, count),
            Err(e) => warn!("Archive of {} aborted: {}", dir, e),
        }
        outcome.map(|_| ())
    });

    producer_stream(reader, producer, chunk_size)
}

async fn write_archive(
    backend: &dyn StorageBackend,
    dir: &VirtualPath,
    entries: Vec<(VirtualPath, EntryKind)>,
    writer: DuplexStream,
    chunk_size: usize,
) -> io::Result<usize> {
    let mut zip = ZipFileWriter::with_tokio(writer);
    let mut buf = vec![0u8; chunk_size];
    let mut count = 0;

    for (path, kind) in entries {
        let Some(name) = path.relative_to(dir) else {
            continue;
        };
        match kind {
            EntryKind::Directory => {
                let entry = ZipEntryBuilder::new(format!("{}/", name).into(), Compression::Stored);
                zip.write_entry_whole(entry, &[]).await.map_err(zip_error)?;
            }
            EntryKind::File => {
                let mut source = backend.open_read(&path).await.map_err(io::Error::other)?;
                let entry = ZipEntryBuilder::new(name.to_string().into(), Compression::Deflate);
                let mut sink = zip.write_entry_stream(entry).await.map_err(zip_error)?;
                loop {
                    let n = source.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    sink.write_all(&buf[..n]).await?;
                }
                sink.close().await.map_err(zip_error)?;
            }
            EntryKind::Other => continue,
        }
        count += 1;
    }

    zip.close().await.map_err(zip_error)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFileSystem;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Bytes deflate cannot shrink much, so the pipe fills quickly
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_producer() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("large.bin"), noise(2 * 1024 * 1024)).unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(LocalFileSystem::new(dir.path()).unwrap());
        let entries = backend.walk(&VirtualPath::root()).await.unwrap();

        let mut data = archive_stream(backend.clone(), VirtualPath::root(), entries, 1024, 4096);
        assert!(data.next().await.unwrap().is_ok());
        assert!(Arc::strong_count(&backend) > 1);
        drop(data);

        // The producer owns the only other handle, and the open file with it
        let released = tokio::time::timeout(Duration::from_secs(5), async {
            while Arc::strong_count(&backend) > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(released.is_ok(), "archive producer still running");
    }

    #[tokio::test]
    async fn missing_source_fails_the_stream() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gone.txt"), b"soon removed").unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(LocalFileSystem::new(dir.path()).unwrap());
        let entries = backend.walk(&VirtualPath::root()).await.unwrap();
        std::fs::remove_file(dir.path().join("gone.txt")).unwrap();

        let outcome: Result<Vec<_>, _> = archive_stream(backend, VirtualPath::root(), entries, 1024, 4096)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        assert!(outcome.is_err());
    }
}
