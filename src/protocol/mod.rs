//! Request protocol
//!
//! Parsing of the line-based request format used by the server.

pub mod commands;
pub mod parser;

pub use commands::Action;
pub use parser::{Request, UploadPart, parse_request};
