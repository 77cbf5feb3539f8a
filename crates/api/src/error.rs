use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clubpulse_core::error::CoreError;
use clubpulse_engine::EngineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`EngineError`] for domain outcomes and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// JSON error responses: `{ "error", "code" }`, plus `"reason"` on booking
/// conflicts.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An outcome of an engine operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Core(CoreError::Validation(errors.to_string()))
    }
}

struct ErrorBody {
    status: StatusCode,
    code: &'static str,
    message: String,
    reason: Option<&'static str>,
}

impl ErrorBody {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            reason: None,
        }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Engine(err) => classify_engine_error(err),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => {
                ErrorBody::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ErrorBody::internal()
            }
        };

        let mut json = json!({
            "error": body.message,
            "code": body.code,
        });
        if let Some(reason) = body.reason {
            json["reason"] = json!(reason);
        }

        (body.status, axum::Json(json)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> ErrorBody {
    match err {
        CoreError::NotFound { entity, id } => ErrorBody::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        CoreError::Conflict(msg) => ErrorBody::new(StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => {
            ErrorBody::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
        }
        CoreError::Forbidden(msg) => ErrorBody::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Unavailable(msg) => {
            tracing::warn!(error = %msg, "Dependency unavailable");
            ErrorBody::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                "Service temporarily unavailable",
            )
        }
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            ErrorBody::internal()
        }
    }
}

fn classify_engine_error(err: &EngineError) -> ErrorBody {
    let conflict = |code| ErrorBody::new(StatusCode::CONFLICT, code, err.to_string());
    match err {
        EngineError::AlreadyLocked => conflict("ALREADY_LOCKED"),
        EngineError::NotOwner => conflict("NOT_OWNER"),
        EngineError::LockExpired => conflict("LOCK_EXPIRED"),
        EngineError::InvalidLock => conflict("INVALID_LOCK"),
        EngineError::InvalidState(_) => conflict("INVALID_STATE"),
        EngineError::Conflict(reason) => ErrorBody {
            reason: Some(reason.as_str()),
            ..conflict("CONFLICT")
        },
        EngineError::MaintenanceBusy => ErrorBody {
            reason: Some(clubpulse_engine::ConflictReason::Maintenance.as_str()),
            ..conflict("CONFLICT")
        },
        EngineError::NotFound { .. } => {
            ErrorBody::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        EngineError::Forbidden(msg) => {
            ErrorBody::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone())
        }
        EngineError::Validation(msg) => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        EngineError::Unavailable(msg) => {
            tracing::warn!(error = %msg, "Dependency unavailable");
            ErrorBody::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                "Service temporarily unavailable",
            )
        }
        EngineError::Cancelled => ErrorBody::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "CANCELLED",
            "Request was cancelled",
        ),
        EngineError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal engine error");
            ErrorBody::internal()
        }
    }
}

/// Classify a sqlx error into an HTTP response.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorBody {
    match err {
        sqlx::Error::RowNotFound => {
            ErrorBody::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
        }
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return ErrorBody::new(
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            ErrorBody::internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            ErrorBody::internal()
        }
    }
}
