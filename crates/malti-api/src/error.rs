use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use malti_core::{IngestError, MetricsError, StoreError};

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing API key")]
    AuthMissing,

    #[error("Invalid API key")]
    AuthInvalid,

    #[error("API key does not grant the '{0}' permission")]
    AuthForbidden(&'static str),

    #[error("{0}")]
    ServiceMismatch(String),

    #[error("{0}")]
    EmptyBatch(String),

    #[error("Invalid interval '{got}'. Valid intervals: {valid}")]
    InvalidInterval { got: String, valid: String },

    #[error("{0}")]
    RangeTooWide(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match &err {
            IngestError::EmptyBatch => AppError::EmptyBatch(err.to_string()),
            IngestError::ServiceMismatch { .. } => AppError::ServiceMismatch(err.to_string()),
        }
    }
}

impl From<MetricsError> for AppError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::RangeTooWide { .. } => AppError::RangeTooWide(err.to_string()),
            MetricsError::Store(err) => AppError::Storage(err),
        }
    }
}

#[derive(Serialize)]
struct JsonError {
    message: String,
    r#type: String,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::AuthMissing | AppError::AuthInvalid | AppError::AuthForbidden(_) => {
                "auth_error"
            }
            AppError::ServiceMismatch(_)
            | AppError::EmptyBatch(_)
            | AppError::InvalidInterval { .. }
            | AppError::RangeTooWide(_) => "validation_error",
            AppError::Storage(_) | AppError::InternalError(_) => "api_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthMissing | AppError::AuthInvalid => StatusCode::UNAUTHORIZED,
            AppError::AuthForbidden(_) | AppError::ServiceMismatch(_) => StatusCode::FORBIDDEN,
            AppError::EmptyBatch(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidInterval { .. } | AppError::RangeTooWide(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Storage(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_response = JsonErrorWrapper {
            error: JsonError {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
            },
        };
        HttpResponse::build(status_code).json(error_response)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, ResponseError};

    use super::AppError;
    use malti_core::IngestError;

    #[test]
    fn status_codes_follow_the_error_taxonomy() {
        assert_eq!(AppError::AuthMissing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::AuthInvalid.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::AuthForbidden("metrics").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(IngestError::EmptyBatch).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(IngestError::ServiceMismatch {
                expected: "a".into(),
                got: "b".into(),
            })
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::InvalidInterval {
                got: "2min".into(),
                valid: "1min, 5min, 1hour".into(),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
