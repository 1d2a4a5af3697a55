/// Error types for geo-post-service
///
/// Every failure of the ingestion and search pipeline lands in one of the
/// variants below. Handlers return them as-is and `ResponseError` turns them
/// into a bounded JSON response; nothing here ever terminates the process.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use resilience::TimeoutError;

use crate::services::blob_store::BlobStoreError;
use crate::services::search_index::SearchIndexError;

/// Result type for geo-post-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No resolved caller identity
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Malformed or out-of-range input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Object storage call failed or timed out
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Search index call failed or timed out
    #[error("Search index unavailable: {0}")]
    IndexUnavailable(String),

    /// Reserved for single-post lookups
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::IndexUnavailable(_) => "index_unavailable",
            AppError::NotFound(_) => "not_found",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::StorageUnavailable(_) | AppError::IndexUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error_type, code) = match self {
            AppError::Unauthenticated(_) => {
                (kinds::AUTHENTICATION_ERROR, error_codes::INVALID_CREDENTIALS)
            }
            AppError::InvalidArgument(_) => {
                (kinds::VALIDATION_ERROR, error_codes::INVALID_ARGUMENT)
            }
            AppError::StorageUnavailable(_) => {
                (kinds::SERVER_ERROR, error_codes::STORAGE_UNAVAILABLE)
            }
            AppError::IndexUnavailable(_) => {
                (kinds::SERVER_ERROR, error_codes::SEARCH_INDEX_UNAVAILABLE)
            }
            AppError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::POST_NOT_FOUND),
        };

        let message = self.to_string();
        let response = ErrorResponse::new(
            status.canonical_reason().unwrap_or("Error"),
            &message,
            status.as_u16(),
            error_type,
            code,
        );

        HttpResponse::build(status).json(response)
    }
}

impl From<BlobStoreError> for AppError {
    fn from(err: BlobStoreError) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<SearchIndexError> for AppError {
    fn from(err: SearchIndexError) -> Self {
        AppError::IndexUnavailable(err.to_string())
    }
}

impl From<TimeoutError<BlobStoreError>> for AppError {
    fn from(err: TimeoutError<BlobStoreError>) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<TimeoutError<SearchIndexError>> for AppError {
    fn from(err: TimeoutError<SearchIndexError>) -> Self {
        AppError::IndexUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use std::time::Duration;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::InvalidArgument("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::StorageUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::IndexUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn timeouts_map_to_the_store_that_timed_out() {
        let upload: AppError = TimeoutError::<BlobStoreError>::Elapsed(Duration::from_secs(1)).into();
        assert!(matches!(upload, AppError::StorageUnavailable(_)));

        let write: AppError =
            TimeoutError::<SearchIndexError>::Elapsed(Duration::from_secs(1)).into();
        assert!(matches!(write, AppError::IndexUnavailable(_)));
    }

    #[actix_web::test]
    async fn error_body_uses_shared_envelope() {
        let response = AppError::InvalidArgument("latitude 91 is outside [-90, 90]".into())
            .error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Bad Request");
        assert_eq!(json["status"], 400);
        assert_eq!(json["type"], "validation_error");
        assert_eq!(json["code"], "INVALID_ARGUMENT");
        assert!(json["message"].as_str().unwrap().contains("latitude 91"));
    }
}
