//! Transfer module
//!
//! Streams uploads onto storage and downloads (single files or whole
//! directories packed as zip archives) back out, without holding payloads
//! in memory.

pub mod archive;
pub mod file_ops;
pub mod operations;
pub mod results;

pub use file_ops::{bytes_stream, reader_stream};
pub use operations::{StreamTransfer, TransferSettings};
pub use results::{DownloadHandle, IncomingFile, UploadReport};
