use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quire_shared::ValidationError;
use quire_store::JournalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("Invalid email or password")]
    BadCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Journal(JournalError::Validation(e))
    }
}

impl ApiError {
    /// HTTP status and stable machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Journal(e) => match e {
                JournalError::BadUser(_) => (StatusCode::NOT_FOUND, "bad_user"),
                JournalError::WrongPermissions(_) => (StatusCode::FORBIDDEN, "wrong_permissions"),
                JournalError::NoSubmission(_) => (StatusCode::NOT_FOUND, "no_submission"),
                JournalError::NoFile(_) => (StatusCode::NOT_FOUND, "no_file"),
                JournalError::NoComment(_) => (StatusCode::NOT_FOUND, "no_comment"),
                JournalError::NotReviewer => (StatusCode::UNAUTHORIZED, "not_reviewer"),
                JournalError::DuplicateReview => (StatusCode::CONFLICT, "duplicate_review"),
                JournalError::SubmissionApproved => (StatusCode::CONFLICT, "submission_approved"),
                JournalError::SubmissionRejected => (StatusCode::CONFLICT, "submission_rejected"),
                JournalError::MissingReviews { .. } => (StatusCode::CONFLICT, "missing_reviews"),
                JournalError::DuplicateFile(_) => (StatusCode::CONFLICT, "duplicate_file"),
                JournalError::DuplicateEmail => (StatusCode::CONFLICT, "duplicate_email"),
                JournalError::BadParent(_) => (StatusCode::BAD_REQUEST, "bad_parent"),
                JournalError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                JournalError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            },
            ApiError::BadCredentials => (StatusCode::UNAUTHORIZED, "bad_credentials"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_store::StoreError;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (JournalError::NotReviewer.into(), StatusCode::UNAUTHORIZED, "not_reviewer"),
            (
                JournalError::MissingReviews { missing: 1, assigned: 2 }.into(),
                StatusCode::CONFLICT,
                "missing_reviews",
            ),
            (JournalError::BadParent(3).into(), StatusCode::BAD_REQUEST, "bad_parent"),
            (
                ValidationError::Missing { field: "authors" }.into(),
                StatusCode::BAD_REQUEST,
                "validation_error",
            ),
            (
                JournalError::Store(StoreError::NotFound).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
            ),
            (ApiError::BadCredentials, StatusCode::UNAUTHORIZED, "bad_credentials"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code), "{err}");
        }
    }
}
