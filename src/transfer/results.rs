//! Transfer result types
//!
//! Defines the values exchanged with callers of the transfer operations.

use std::fmt;

use crate::storage::{ByteStream, VirtualPath};

/// A download ready to be streamed. `data` is consumed exactly once.
pub struct DownloadHandle {
    pub content_type: String,
    pub file_name: String,
    pub data: ByteStream,
}

impl DownloadHandle {
    /// Value for an attachment `Content-Disposition` header
    pub fn content_disposition(&self) -> String {
        let escaped = self.file_name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{}\"", escaped)
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("content_type", &self.content_type)
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// One part of an upload request
pub struct IncomingFile {
    pub file_name: String,
    pub data: ByteStream,
}

impl IncomingFile {
    pub fn new(file_name: impl Into<String>, data: ByteStream) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }
}

/// Outcome of a batch upload. Failures never undo stored siblings.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub stored: Vec<VirtualPath>,
    pub failures: Vec<String>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// All failures folded into one message, `None` when everything landed
    pub fn failure_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} files failed: {}",
            self.failures.len(),
            self.failures.len() + self.stored.len(),
            self.failures.join("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn disposition_quotes_file_name() {
        let handle = DownloadHandle {
            content_type: "text/plain".into(),
            file_name: "say \"hi\".txt".into(),
            data: futures::stream::empty().boxed(),
        };
        assert_eq!(
            handle.content_disposition(),
            "attachment; filename=\"say \\\"hi\\\".txt\""
        );
    }

    #[test]
    fn report_aggregates_failures() {
        let report = UploadReport {
            stored: vec![VirtualPath::root().join("ok.txt").unwrap()],
            failures: vec!["a: bad".into(), "b: worse".into()],
        };
        assert!(!report.is_complete());
        assert_eq!(
            report.failure_message().unwrap(),
            "2 of 3 files failed: a: bad; b: worse"
        );
        assert_eq!(UploadReport::default().failure_message(), None);
    }
}
