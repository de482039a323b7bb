//! Module `file_ops`
//!
//! Stream plumbing shared by uploads and downloads: turning readers into
//! pull-based chunk streams, surfacing producer failures, and draining
//! rejected upload parts.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream;
use log::debug;
use std::io;
use std::path::Path;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::storage::ByteStream;

/// Lazily reads `reader` in chunks of at most `chunk_size` bytes. Nothing is
/// read before the consumer polls, and dropping the stream closes the reader.
pub fn reader_stream<R>(reader: R, chunk_size: usize) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream::try_unfold(reader, move |mut reader| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            Ok::<_, io::Error>(None)
        } else {
            Ok(Some((buf.freeze(), reader)))
        }
    })
    .boxed()
}

struct ProducerState<R> {
    reader: R,
    producer: Option<JoinHandle<io::Result<()>>>,
}

/// Like [`reader_stream`], for a pipe fed by a background producer. Once the
/// pipe runs dry the producer's outcome is checked, so a failed producer
/// ends the stream with an error instead of a silently truncated body.
pub fn producer_stream<R>(
    reader: R,
    producer: JoinHandle<io::Result<()>>,
    chunk_size: usize,
) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let state = ProducerState {
        reader,
        producer: Some(producer),
    };
    stream::try_unfold(state, move |mut state| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        let n = state.reader.read_buf(&mut buf).await?;
        if n > 0 {
            return Ok(Some((buf.freeze(), state)));
        }
        if let Some(producer) = state.producer.take() {
            match producer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(io::Error::other(e)),
            }
        }
        Ok(None)
    })
    .boxed()
}

/// Runs one I/O step, failing with `TimedOut` once `limit` passes.
pub async fn within<F, T>(limit: Duration, step: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, step).await {
        Ok(outcome) => outcome,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no progress within {:?}", limit),
        )),
    }
}

/// Reads exactly `size` bytes from a source shared by several consecutive
/// parts. The lock is held per chunk, so parts must be consumed in order.
/// Each chunk must arrive within `idle`. After any failure the source is
/// dropped, so later parts fail at once instead of waiting again.
pub fn shared_part_stream<R>(
    source: Arc<Mutex<Option<R>>>,
    size: u64,
    chunk_size: usize,
    idle: Duration,
) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream::try_unfold((source, size), move |(source, remaining)| async move {
        if remaining == 0 {
            return Ok(None);
        }
        let want = remaining.min(chunk_size as u64);
        let mut buf = BytesMut::with_capacity(want as usize);

        let mut slot = source.lock().await;
        let Some(reader) = slot.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "upload aborted by an earlier part",
            ));
        };
        let read = within(idle, reader.take(want).read_buf(&mut buf)).await;
        let n = match read {
            Ok(0) => {
                *slot = None;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("upload part ended {} bytes early", remaining),
                ));
            }
            Ok(n) => n,
            Err(e) => {
                *slot = None;
                return Err(e);
            }
        };
        drop(slot);
        Ok(Some((buf.freeze(), (source, remaining - n as u64))))
    })
    .boxed()
}

/// Single-chunk stream over an in-memory body
pub fn bytes_stream(body: Bytes) -> ByteStream {
    stream::once(async move { Ok(body) }).boxed()
}

/// Consumes what is left of a rejected part so that a shared sequential
/// source stays aligned for the next part.
pub async fn drain(data: &mut ByteStream) {
    let mut skipped = 0u64;
    while let Some(chunk) = data.next().await {
        match chunk {
            Ok(chunk) => skipped += chunk.len() as u64,
            Err(_) => break,
        }
    }
    debug!("Drained {} bytes of a rejected upload", skipped);
}

/// Browsers used to send full client paths; keep only the last component.
pub fn client_file_name(raw: &str) -> &str {
    raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw)
}

/// Content type derived from the file extension
pub fn content_type_for(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt" | "log") => "text/plain",
        Some("htm" | "html") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn reader_stream_yields_bounded_chunks() {
        let data = vec![7u8; 10];
        let chunks: Vec<Bytes> = reader_stream(std::io::Cursor::new(data), 4)
            .try_collect()
            .await
            .unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert!(sizes.iter().all(|&n| n <= 4));
        assert_eq!(sizes.iter().sum::<usize>(), 10);
    }

    #[tokio::test]
    async fn producer_failure_surfaces_after_data() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let producer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            if let Err(e) = writer.write_all(b"partial").await {
                return Err(e);
            }
            Err(io::Error::other("source vanished"))
        });

        let mut stream = producer_stream(reader, producer, 16);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn shared_parts_split_one_source() {
        let idle = Duration::from_secs(5);
        let source = Arc::new(Mutex::new(Some(std::io::Cursor::new(b"abcdefgh".to_vec()))));
        let first: Vec<Bytes> = shared_part_stream(source.clone(), 3, 2, idle)
            .try_collect()
            .await
            .unwrap();
        let second: Vec<Bytes> = shared_part_stream(source.clone(), 5, 2, idle)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.concat(), b"abc");
        assert_eq!(second.concat(), b"defgh");

        let mut short = shared_part_stream(source, 1, 2, idle);
        assert!(short.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn stalled_part_times_out_and_fails_the_rest() {
        let (_client, server) = tokio::io::duplex(64);
        let source = Arc::new(Mutex::new(Some(server)));
        let idle = Duration::from_millis(50);

        let mut first = shared_part_stream(source.clone(), 3, 2, idle);
        let err = first.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        let mut second = shared_part_stream(source, 3, 2, idle);
        let err = second.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn client_paths_are_reduced_to_names() {
        assert_eq!(client_file_name("C:\\Users\\me\\photo.jpg"), "photo.jpg");
        assert_eq!(client_file_name("dir/notes.txt"), "notes.txt");
        assert_eq!(client_file_name("plain.bin"), "plain.bin");
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("archive.zip"), "application/zip");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }
}
