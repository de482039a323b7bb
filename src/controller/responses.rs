//! Controller replies
//!
//! Rendering of facade outcomes into what the server writes back: a single
//! JSON line, or a JSON header line followed by a raw byte stream.

use log::error;
use serde::Serialize;
use std::fmt;

use crate::error::handlers::error_label;
use crate::error::{FsError, RequestError};
use crate::storage::ByteStream;
use crate::transfer::DownloadHandle;

pub enum Reply {
    Json(String),
    Stream { header: String, data: ByteStream },
}

impl Reply {
    pub fn is_stream(&self) -> bool {
        matches!(self, Reply::Stream { .. })
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Json(body) => f.debug_tuple("Json").field(body).finish(),
            Reply::Stream { header, .. } => f
                .debug_struct("Stream")
                .field("header", header)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    res: &'static str,
    msg: String,
    code: &'a str,
}

#[derive(Serialize)]
struct StreamHeader<'a> {
    res: &'static str,
    content_type: &'a str,
    content_disposition: String,
}

pub fn json<T: Serialize>(value: &T) -> Reply {
    match serde_json::to_string(value) {
        Ok(body) => Reply::Json(body),
        Err(e) => {
            error!("Failed to render reply: {}", e);
            Reply::Json(r#"{"res":"error","msg":"Internal error","code":"io_failure"}"#.into())
        }
    }
}

pub fn fs_error(err: &FsError) -> Reply {
    json(&ErrorBody {
        res: "error",
        msg: err.to_string(),
        code: error_label(err),
    })
}

pub fn request_error(err: &RequestError) -> Reply {
    let code = match err {
        RequestError::UnknownProfile(_) => "unknown_profile",
        _ => "bad_request",
    };
    json(&ErrorBody {
        res: "error",
        msg: err.to_string(),
        code,
    })
}

pub fn listing<T: Serialize>(outcome: Result<Vec<T>, FsError>) -> Reply {
    match outcome {
        Ok(entries) => json(&entries),
        Err(e) => fs_error(&e),
    }
}

pub fn stream(outcome: Result<DownloadHandle, FsError>) -> Reply {
    let handle = match outcome {
        Ok(handle) => handle,
        Err(e) => return fs_error(&e),
    };
    let header = StreamHeader {
        res: "ok",
        content_type: &handle.content_type,
        content_disposition: handle.content_disposition(),
    };
    match serde_json::to_string(&header) {
        Ok(header) => Reply::Stream {
            header,
            data: handle.data,
        },
        Err(e) => {
            error!("Failed to render stream header: {}", e);
            fs_error(&FsError::Io(std::io::Error::other(e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::bytes_stream;

    #[test]
    fn errors_carry_message_and_code() {
        let Reply::Json(body) = fs_error(&FsError::NotFound("/a.txt".into())) else {
            panic!("expected json");
        };
        assert_eq!(body, r#"{"res":"error","msg":"Not found: /a.txt","code":"not_found"}"#);
    }

    #[test]
    fn stream_header_describes_attachment() {
        let handle = DownloadHandle {
            content_type: "text/plain".into(),
            file_name: "a.txt".into(),
            data: bytes_stream("hi".into()),
        };
        let Reply::Stream { header, .. } = stream(Ok(handle)) else {
            panic!("expected stream");
        };
        assert_eq!(
            header,
            r#"{"res":"ok","content_type":"text/plain","content_disposition":"attachment; filename=\"a.txt\""}"#
        );
    }
}
