//! Operation results
//!
//! Uniform outcome of every mutating facade operation.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Success flag plus a human-readable message on failure. Serializes as
/// `{"res": "ok"|"error", "msg": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    success: bool,
    error_message: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl Serialize for OperationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OperationResult", 2)?;
        state.serialize_field("res", if self.success { "ok" } else { "error" })?;
        state.serialize_field("msg", &self.error_message)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_standard_response() {
        assert_eq!(
            serde_json::to_string(&OperationResult::ok()).unwrap(),
            r#"{"res":"ok","msg":null}"#
        );
        assert_eq!(
            serde_json::to_string(&OperationResult::failure("Not found: /x")).unwrap(),
            r#"{"res":"error","msg":"Not found: /x"}"#
        );
    }
}
