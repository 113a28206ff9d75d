//! HTTP error mapping.
//!
//! Expected recognition outcomes (no match, low confidence, no face)
//! are values flowing through the 200-level decision responses, never
//! errors; this type covers everything else. Enrollment failure carries
//! its per-image rejection list into the response body so callers can
//! see which images to retake.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use trombino_core::{EnrollError, IndexError, ProviderError, Rejection};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("image could not be decoded: {0}")]
    ImageUnreadable(String),

    #[error("no image in the batch was accepted for enrollment")]
    EnrollmentFailed { rejections: Vec<Rejection> },

    #[error("no enrolled faces to match against")]
    EmptyIndex,

    #[error("attribute analysis model not configured")]
    AnalyzerUnavailable,

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::NoFaceDetected
            | ApiError::ImageUnreadable(_)
            | ApiError::EnrollmentFailed { .. } => StatusCode::BAD_REQUEST,
            ApiError::EmptyIndex => StatusCode::NOT_FOUND,
            ApiError::AnalyzerUnavailable | ApiError::IndexUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NoFaceDetected => "NO_FACE_DETECTED",
            ApiError::ImageUnreadable(_) => "IMAGE_UNREADABLE",
            ApiError::EnrollmentFailed { .. } => "TOTAL_ENROLLMENT_FAILURE",
            ApiError::EmptyIndex => "EMPTY_INDEX",
            ApiError::AnalyzerUnavailable => "ANALYZER_UNAVAILABLE",
            ApiError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            ApiError::Timeout => "REQUEST_TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        if let ApiError::EnrollmentFailed { rejections } = &self {
            body["error"]["rejections"] = serde_json::to_value(rejections).unwrap_or_default();
        }

        (status, Json(body)).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoFaceDetected => ApiError::NoFaceDetected,
            ProviderError::ImageUnreadable(detail) => ApiError::ImageUnreadable(detail),
            ProviderError::AnalyzerUnavailable => ApiError::AnalyzerUnavailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Unavailable(detail) => ApiError::IndexUnavailable(detail),
            corrupt @ IndexError::Corrupt { .. } => ApiError::Internal(corrupt.to_string()),
        }
    }
}

impl From<EnrollError> for ApiError {
    fn from(err: EnrollError) -> Self {
        match err {
            EnrollError::AllRejected { rejections } => ApiError::EnrollmentFailed { rejections },
            EnrollError::Index(index) => index.into(),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_is_a_client_error() {
        assert_eq!(ApiError::NoFaceDetected.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NoFaceDetected.code(), "NO_FACE_DETECTED");
    }

    #[test]
    fn test_index_unavailable_is_a_server_error() {
        let err: ApiError = IndexError::Unavailable("down".into()).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_enrollment_failure_keeps_rejections() {
        let err: ApiError = EnrollError::AllRejected { rejections: vec![] }.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "TOTAL_ENROLLMENT_FAILURE");
    }

    #[test]
    fn test_timeout_maps_to_408() {
        assert_eq!(ApiError::Timeout.status_code(), StatusCode::REQUEST_TIMEOUT);
    }
}
