//! Shared error body for geo-post HTTP services.
//!
//! Every failing HTTP response carries the same JSON envelope so clients can
//! branch on `type`/`code` instead of parsing messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON error envelope returned by every handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// Short reason phrase, e.g. "Bad Request".
    pub error: String,
    /// Human readable detail.
    pub message: String,
    /// HTTP status code, duplicated in the body for log pipelines.
    pub status: u16,
    /// Coarse error category, see [`error_types`].
    #[serde(rename = "type")]
    pub error_type: String,
    /// Stable machine readable code, see [`error_codes`].
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Error categories used in the `type` field.
pub mod error_types {
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const SERVER_ERROR: &str = "server_error";
}

/// Machine readable error codes used in the `code` field.
pub mod error_codes {
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const POST_NOT_FOUND: &str = "POST_NOT_FOUND";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const SEARCH_INDEX_UNAVAILABLE: &str = "SEARCH_INDEX_UNAVAILABLE";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_type_field_name() {
        let body = ErrorResponse::new(
            "Bad Request",
            "latitude out of range",
            400,
            error_types::VALIDATION_ERROR,
            error_codes::INVALID_ARGUMENT,
        );

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "validation_error");
        assert_eq!(json["code"], "INVALID_ARGUMENT");
        assert_eq!(json["status"], 400);
        assert!(json.get("error_type").is_none());
    }
}
