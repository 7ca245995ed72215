use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use streamfleet_core::error::CoreError;
use streamfleet_fleet::error::{FleetError, StreamError};

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and fleet errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `streamfleet_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A stream lifecycle failure.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A persistent store failure.
    #[error(transparent)]
    Fleet(#[from] FleetError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Stream(err) => classify_stream_error(err),
            AppError::Fleet(err) => classify_fleet_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Classify a stream lifecycle error.
///
/// - Lifecycle violations map to 409, missing streams to 404.
/// - No eligible worker maps to 503 so clients retry later.
/// - Upload, agent and transport failures map to 502.
/// - Store failures map to 500 with a sanitized message.
fn classify_stream_error(err: &StreamError) -> Classified {
    match err {
        StreamError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Stream with id {id} not found"),
        ),
        StreamError::Transition(core) => classify_core_error(core),
        StreamError::NoAvailableWorker(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "NO_AVAILABLE_WORKER",
            err.to_string(),
        ),
        StreamError::NoWorkerAssigned => {
            (StatusCode::CONFLICT, "NO_WORKER_ASSIGNED", err.to_string())
        }
        StreamError::ConfigUpload | StreamError::InvalidResponse | StreamError::Remote(_) => {
            (StatusCode::BAD_GATEWAY, "REMOTE_ERROR", err.to_string())
        }
        StreamError::Store(e) => classify_fleet_error(e),
    }
}

fn classify_fleet_error(err: &FleetError) -> Classified {
    match err {
        FleetError::Database(e) => classify_sqlx_error(e),
        FleetError::Unavailable(msg) => {
            tracing::error!(error = %msg, "Store unavailable");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> Classified {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
