//! Error handlers
//!
//! Logs storage faults and folds them into uniform operation results.

use crate::error::types::FsError;
use crate::filesystem::OperationResult;
use log::{error, warn};

/// Log a storage error at a level matching its severity
pub fn handle_error(operation: &str, err: &FsError) {
    match err {
        FsError::Io(_) | FsError::PermissionDenied(_) => {
            error!("{} failed: {}", operation, err)
        }
        _ => warn!("{} rejected: {}", operation, err),
    }
}

/// Convert the outcome of a mutation into an operation result
pub fn into_operation_result(operation: &str, outcome: Result<(), FsError>) -> OperationResult {
    match outcome {
        Ok(()) => OperationResult::ok(),
        Err(err) => {
            handle_error(operation, &err);
            OperationResult::failure(err.to_string())
        }
    }
}

/// Short machine-readable label for an error reply
pub fn error_label(err: &FsError) -> &'static str {
    match err {
        FsError::InvalidPath(_) => "invalid_path",
        FsError::NotFound(_) => "not_found",
        FsError::AlreadyExists(_) => "already_exists",
        FsError::Conflict(_) => "conflict",
        FsError::PermissionDenied(_) => "permission_denied",
        FsError::UnsupportedFormat(_) => "unsupported_format",
        FsError::Io(_) => "io_failure",
    }
}
