//! Media file model (read-only input for job specs).

use serde::Serialize;
use sqlx::FromRow;
use streamfleet_core::types::{DbId, Timestamp};

/// A row from the `media_files` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MediaFile {
    pub id: DbId,
    pub user_id: DbId,
    pub filename: String,
    pub size_bytes: i64,
    /// Direct CDN URL when the file has been pushed to a CDN.
    pub cdn_url: Option<String>,
    pub created_at: Timestamp,
}
