//! Connection handling
//!
//! One request per connection: a request line, upload part bodies if the
//! request declares any, then the reply. JSON replies are one line; streamed
//! replies are a JSON header line followed by raw bytes until close. Every
//! read from and write to the client has its own deadline.

use futures::StreamExt;
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::Mutex;

use crate::controller::{self, Reply, responses};
use crate::error::RequestError;
use crate::filesystem::ProfileRegistry;
use crate::protocol::{Action, Request, parse_request};
use crate::transfer::IncomingFile;
use crate::transfer::file_ops::{shared_part_stream, within};

/// Longest accepted request line, newline included
pub const MAX_REQUEST_LINE: u64 = 8 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Upload chunk size
    pub chunk_size: usize,
    /// Longest wait on the client for a single read or write
    pub idle_timeout: Duration,
}

/// Serves a single request on `stream` and closes it. A client that stays
/// silent, or stops reading, for longer than the idle timeout is dropped
/// with a `TimedOut` error.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    registry: Arc<ProfileRegistry>,
    settings: ConnectionSettings,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let idle = settings.idle_timeout;
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let request = match within(idle, read_request(&mut reader)).await? {
        Some(Ok(request)) => request,
        Some(Err(e)) => {
            warn!("Rejected request from {}: {}", peer, e);
            write_reply(&mut writer, responses::request_error(&e), peer, idle).await?;
            return within(idle, writer.shutdown()).await;
        }
        None => {
            debug!("Client {} closed before sending a request", peer);
            return Ok(());
        }
    };
    debug!("Client {} requested {}", peer, request.action.name());

    let uploads = if request.action == Action::Upload {
        match request.upload_parts() {
            Ok(parts) => {
                let source = Arc::new(Mutex::new(Some(reader)));
                parts
                    .into_iter()
                    .map(|part| {
                        IncomingFile::new(
                            part.name,
                            shared_part_stream(source.clone(), part.size, settings.chunk_size, idle),
                        )
                    })
                    .collect()
            }
            Err(e) => {
                // Part boundaries are unknown, nothing after the line can be trusted
                warn!("Rejected upload from {}: {}", peer, e);
                write_reply(&mut writer, responses::request_error(&e), peer, idle).await?;
                return within(idle, writer.shutdown()).await;
            }
        }
    } else {
        Vec::new()
    };

    let reply = controller::dispatch(&registry, &request, uploads).await;
    write_reply(&mut writer, reply, peer, idle).await?;
    within(idle, writer.shutdown()).await
}

/// Reads the request line. `None` when the peer sent nothing at all.
async fn read_request<R>(reader: &mut R) -> io::Result<Option<Result<Request, RequestError>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut limited = reader.take(MAX_REQUEST_LINE);
    let n = limited.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && n as u64 >= MAX_REQUEST_LINE {
        return Ok(Some(Err(RequestError::RequestTooLong)));
    }
    Ok(Some(parse_request(&line)))
}

async fn write_reply<W>(
    writer: &mut W,
    reply: Reply,
    peer: SocketAddr,
    idle: Duration,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match reply {
        Reply::Json(body) => {
            let line = format!("{}\n", body);
            within(idle, writer.write_all(line.as_bytes())).await?;
        }
        Reply::Stream { header, mut data } => {
            let line = format!("{}\n", header);
            within(idle, writer.write_all(line.as_bytes())).await?;

            let mut sent = 0u64;
            while let Some(chunk) = data.next().await {
                match chunk {
                    Ok(chunk) => {
                        within(idle, writer.write_all(&chunk)).await?;
                        sent += chunk.len() as u64;
                    }
                    Err(e) => {
                        // Closing early is the only way to signal a broken body
                        warn!("Stream to {} aborted after {} bytes: {}", peer, sent, e);
                        return Err(e);
                    }
                }
            }
            info!("Streamed {} bytes to {}", sent, peer);
        }
    }
    within(idle, writer.flush()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FileSystem, FileSystemSettings};
    use tempfile::TempDir;

    fn registry(root: &TempDir) -> Arc<ProfileRegistry> {
        let mut registry = ProfileRegistry::new("default");
        registry.register(
            FileSystem::local("default", root.path(), &FileSystemSettings::default()).unwrap(),
        );
        Arc::new(registry)
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn settings(idle_timeout: Duration) -> ConnectionSettings {
        ConnectionSettings {
            chunk_size: 4,
            idle_timeout,
        }
    }

    async fn exchange(registry: Arc<ProfileRegistry>, input: &[u8]) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(1024 * 1024);
        let task = tokio::spawn(handle_connection(
            server,
            peer(),
            registry,
            settings(Duration::from_secs(10)),
        ));
        client.write_all(input).await.unwrap();
        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        task.await.unwrap().unwrap();
        output
    }

    #[tokio::test]
    async fn upload_parts_follow_request_line() {
        let root = TempDir::new().unwrap();
        let registry = registry(&root);

        let reply = exchange(
            registry.clone(),
            b"upload?d=/&name=a.txt&size=5&name=b.txt&size=3\nhelloabc",
        )
        .await;
        assert_eq!(reply, b"{\"res\":\"ok\",\"msg\":null}\n");
        assert_eq!(std::fs::read(root.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(root.path().join("b.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn download_writes_header_then_body() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("notes.txt"), b"0123456789").unwrap();

        let reply = exchange(registry(&root), b"download?f=/notes.txt\n").await;
        let split = reply.iter().position(|b| *b == b'\n').unwrap();
        let header: serde_json::Value = serde_json::from_slice(&reply[..split]).unwrap();
        assert_eq!(header["res"], "ok");
        assert_eq!(header["content_type"], "text/plain");
        assert_eq!(&reply[split + 1..], b"0123456789");
    }

    #[tokio::test]
    async fn overlong_request_line_is_rejected() {
        let root = TempDir::new().unwrap();
        let mut input = b"dirlist?d=".to_vec();
        input.extend(std::iter::repeat_n(b'a', MAX_REQUEST_LINE as usize));
        input.push(b'\n');

        let reply = exchange(registry(&root), &input).await;
        let text = String::from_utf8(reply).unwrap();
        assert!(text.contains("Request line too long"));
    }

    #[tokio::test]
    async fn silent_client_is_dropped() {
        let root = TempDir::new().unwrap();
        let (_client, server) = tokio::io::duplex(1024);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            handle_connection(server, peer(), registry(&root), settings(Duration::from_millis(100))),
        )
        .await
        .expect("connection released");
        assert_eq!(outcome.unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn stalled_upload_fails_and_replies() {
        let root = TempDir::new().unwrap();
        let (mut client, server) = tokio::io::duplex(1024 * 1024);
        let task = tokio::spawn(handle_connection(
            server,
            peer(),
            registry(&root),
            settings(Duration::from_millis(100)),
        ));

        // Ten bytes announced, three sent, connection left open
        client
            .write_all(b"upload?d=/&name=a.txt&size=10&name=b.txt&size=2\nabc")
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("connection released")
            .unwrap()
            .unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply["res"], "error");
        assert!(!root.path().join("a.txt").exists());
        assert!(!root.path().join("b.txt").exists());
    }
}
