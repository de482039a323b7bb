//! Error types
//!
//! Defines the error taxonomy shared by the storage core and the request glue.
//! Messages only ever carry virtual paths, never absolute server locations.

use std::fmt;
use std::io;

/// Storage core errors
#[derive(Debug)]
pub enum FsError {
    InvalidPath(String),
    NotFound(String),
    AlreadyExists(String),
    Conflict(String),
    PermissionDenied(String),
    UnsupportedFormat(String),
    Io(io::Error),
}

impl FsError {
    /// Maps an I/O failure on `path` onto the taxonomy, keeping the virtual
    /// path (and nothing else) in the message.
    pub fn from_io(error: io::Error, path: impl fmt::Display) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_string()),
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_string()),
            _ => FsError::Io(error),
        }
    }

    /// True when a rename failed only because source and target live on
    /// different devices.
    pub fn is_cross_device(&self) -> bool {
        matches!(self, FsError::Io(e) if e.kind() == io::ErrorKind::CrossesDevices)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidPath(p) => write!(f, "Invalid path: {}", p),
            FsError::NotFound(p) => write!(f, "Not found: {}", p),
            FsError::AlreadyExists(p) => write!(f, "Already exists: {}", p),
            FsError::Conflict(p) => write!(f, "Destination already exists: {}", p),
            FsError::PermissionDenied(p) => write!(f, "Permission denied: {}", p),
            FsError::UnsupportedFormat(p) => write!(f, "Unsupported format: {}", p),
            FsError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(error: io::Error) -> Self {
        FsError::Io(error)
    }
}

/// Request glue errors
#[derive(Debug)]
pub enum RequestError {
    UnknownAction(String),
    MissingParameter(&'static str),
    InvalidParameter(String),
    UnknownProfile(String),
    RequestTooLong,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::UnknownAction(a) => write!(f, "Unknown action: {}", a),
            RequestError::MissingParameter(p) => write!(f, "Missing parameter: {}", p),
            RequestError::InvalidParameter(p) => write!(f, "Invalid parameter: {}", p),
            RequestError::UnknownProfile(p) => write!(f, "Unknown profile: {}", p),
            RequestError::RequestTooLong => write!(f, "Request line too long"),
        }
    }
}

impl std::error::Error for RequestError {}
