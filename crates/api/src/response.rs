//! `{ "data": ... }` envelope for successful JSON responses.
//!
//! Failures never use it; [`crate::error::AppError`] renders
//! `{ "error", "code" }` instead.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Return type of a handler answering with an enveloped body.
pub type DataJson<T> = Json<DataResponse<T>>;

/// Wrap `data` in the envelope.
pub fn data<T: Serialize>(data: T) -> DataJson<T> {
    Json(DataResponse { data })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
