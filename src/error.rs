use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, RuntimeErr};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Insufficient stock for food {food_id}")]
    InsufficientStock { food_id: Uuid },

    #[error("Table {0} is not available")]
    TableUnavailable(Uuid),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("A cancellation reason is required")]
    CancellationReasonRequired,

    #[error("Order {0} is already closed")]
    OrderClosed(Uuid),

    #[error("Order {0} has an online payment in progress")]
    PaymentPending(Uuid),

    #[error("Write conflict, try again")]
    TransientConflict(#[source] DbErr),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("ORM error")]
    OrmError(#[source] DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Storage reported that a concurrent transaction touched the same rows.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientConflict(_))
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if is_write_conflict(&err) {
            AppError::TransientConflict(err)
        } else {
            AppError::OrmError(err)
        }
    }
}

// Postgres: serialization_failure, deadlock_detected. SQLite: SQLITE_BUSY, SQLITE_BUSY_SNAPSHOT.
const WRITE_CONFLICT_CODES: [&str; 4] = ["40001", "40P01", "5", "517"];

fn is_write_conflict(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::Exec(e) | DbErr::Query(e) | DbErr::Conn(e) => e,
        _ => return false,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db)) => db
            .code()
            .as_deref()
            .is_some_and(|code| WRITE_CONFLICT_CODES.contains(&code)),
        _ => false,
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::CancellationReasonRequired
            | AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock { .. }
            | AppError::TableUnavailable(_)
            | AppError::InvalidTransition { .. }
            | AppError::OrderClosed(_)
            | AppError::PaymentPending(_)
            | AppError::TransientConflict(_) => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let message = self.to_string();
        let body = ApiResponse::failure(
            message.clone(),
            ErrorData { error: message },
        );

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct DriverError(&'static str);

    impl fmt::Display for DriverError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "driver error {}", self.0)
        }
    }

    impl std::error::Error for DriverError {}

    impl sqlx::error::DatabaseError for DriverError {
        fn message(&self) -> &str {
            "driver error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn exec_error(code: &'static str) -> DbErr {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(Box::new(
            DriverError(code),
        ))))
    }

    #[test]
    fn serialization_and_busy_codes_are_transient() {
        for code in ["40001", "40P01", "5", "517"] {
            let err: AppError = exec_error(code).into();
            assert!(err.is_transient(), "code {code}");
            assert!(matches!(err, AppError::TransientConflict(_)));
        }

        let err: AppError =
            DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(Box::new(DriverError("40001")))))
                .into();
        assert!(err.is_transient());

        let response = AppError::from(exec_error("40P01")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn constraint_violations_are_not_transient() {
        for code in ["23505", "23503", "2067"] {
            let err: AppError = exec_error(code).into();
            assert!(!err.is_transient(), "code {code}");
            assert!(matches!(err, AppError::OrmError(_)));
        }
    }

    #[test]
    fn plain_query_errors_are_not_transient() {
        let err: AppError = DbErr::Custom("boom".into()).into();
        assert!(!err.is_transient());
        assert!(matches!(err, AppError::OrmError(_)));
    }

    #[test]
    fn business_errors_map_to_conflict() {
        let response = AppError::TableUnavailable(Uuid::nil()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::CancellationReasonRequired.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::NotFound("order").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
