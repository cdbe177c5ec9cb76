use crate::response::ApiResponse;
use anyhow::anyhow;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deadpool_diesel::InteractError;
use deadpool_diesel::postgres::PoolError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String), // 401

    #[error("Forbidden: {0}")]
    Forbidden(String), // 403

    #[error("Not Found: {0}")]
    NotFound(String), // 404

    #[error("Conflict: {0}")]
    Conflict(String), // 409

    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String), // 422

    #[error("Internal Server Error: {0}")]
    InternalServerError(#[from] anyhow::Error), // 500
}

impl AppError {
    /// Returns the database error kind if this error wraps a diesel `DatabaseError`.
    pub fn database_error_kind(&self) -> Option<&DatabaseErrorKind> {
        match self {
            AppError::InternalServerError(err) => match err.downcast_ref::<DieselError>() {
                Some(DieselError::DatabaseError(kind, _)) => Some(kind),
                _ => None,
            },
            _ => None,
        }
    }

    /// Name of the violated constraint, when the database reported one.
    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            AppError::InternalServerError(err) => match err.downcast_ref::<DieselError>() {
                Some(DieselError::DatabaseError(_, info)) => info.constraint_name(),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_unique_violation_of(&self, constraint: &str) -> bool {
        self.is_unique_violation() && self.constraint_name() == Some(constraint)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self.database_error_kind(),
            Some(DatabaseErrorKind::UniqueViolation)
        )
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self.database_error_kind(),
            Some(DatabaseErrorKind::ForeignKeyViolation)
        )
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        error!("Database pool error encountered: {:?}", err);
        AppError::InternalServerError(anyhow::Error::new(err).context("Database pool error"))
    }
}

impl From<InteractError> for AppError {
    fn from(err: InteractError) -> Self {
        error!("Database interaction error encountered: {:?}", err);
        AppError::InternalServerError(anyhow!("Database interaction error: {}", err))
    }
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => {
                error!(
                    "Diesel NotFound error reached generic conversion: {:?}",
                    err
                );
                AppError::NotFound("Resource not found (database query)".to_string())
            }
            _ => {
                error!("Unhandled Diesel error encountered: {:?}", err);
                // root cause stays downcastable for the constraint checks above
                AppError::InternalServerError(anyhow::Error::new(err))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),

            AppError::InternalServerError(source) => {
                error!(
                    "Responding with 500 Internal Server Error. Source: {:?}",
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        ApiResponse::error(status, error_message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    #[test]
    fn unique_violation_is_detected_through_conversion() {
        let err = AppError::from(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key".to_string()),
        ));
        assert!(err.is_unique_violation());
        assert!(!err.is_foreign_key_violation());
        // plain-string details carry no constraint name
        assert!(err.constraint_name().is_none());
        assert!(!err.is_unique_violation_of("quizzes_access_code_key"));
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = AppError::from(DieselError::NotFound);
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.database_error_kind().is_none());
    }

    #[tokio::test]
    async fn internal_error_hides_source_message() {
        let response =
            AppError::InternalServerError(anyhow!("secret connection string")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status_code"], 500);
        assert_eq!(body["status_message"], "An internal server error occurred");
        assert!(body["data"].is_null());
    }
}
