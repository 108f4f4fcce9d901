//! Wire models shared by the handlers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe error codes surfaced to the operator UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    PasswordRequired,
    InvalidPassword,
    BlockedCommand,
    InvalidPattern,
    InvalidInput,
    InvalidSchema,
    EmptySql,
    UnknownCloud,
    UnknownDatabase,
    NotFound,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::PasswordRequired => "PASSWORD_REQUIRED",
            ErrorCode::InvalidPassword => "INVALID_PASSWORD",
            ErrorCode::BlockedCommand => "BLOCKED_COMMAND",
            ErrorCode::InvalidPattern => "INVALID_PATTERN",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidSchema => "INVALID_SCHEMA",
            ErrorCode::EmptySql => "EMPTY_SQL",
            ErrorCode::UnknownCloud => "UNKNOWN_CLOUD",
            ErrorCode::UnknownDatabase => "UNKNOWN_DATABASE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Uniform error body so the UI can colour-code without string matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

/// Accepted-submission response: the id to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub execution_id: String,
}

/// `POST /api/query/validate` response: the policy verdict plus the shape
/// the splitter saw, so the editor can annotate statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub statement_count: usize,
    pub categories: Vec<stratus_policy::StatementCategory>,
    pub requires_password_reauth: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_names() {
        let json = serde_json::to_value(ErrorCode::PermissionDenied).unwrap();
        assert_eq!(json, serde_json::json!("PERMISSION_DENIED"));
        assert_eq!(ErrorCode::PasswordRequired.to_string(), "PASSWORD_REQUIRED");
    }

    #[test]
    fn test_accepted_response_shape() {
        let json = serde_json::to_value(AcceptedResponse {
            execution_id: "abc".into(),
        })
        .unwrap();
        assert_eq!(json["executionId"], "abc");
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::new(ErrorCode::NotFound, "Execution not found");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "NOT_FOUND");
        assert_eq!(json["message"], "Execution not found");
    }
}
