//! Repository for the `media_files` table.

use sqlx::PgPool;
use streamfleet_core::types::DbId;

use crate::models::media::MediaFile;

const COLUMNS: &str = "id, user_id, filename, size_bytes, cdn_url, created_at";

/// Provides read access to media files.
pub struct MediaFileRepo;

impl MediaFileRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<MediaFile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM media_files WHERE id = $1");
        sqlx::query_as::<_, MediaFile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Fetch several files at once. Order is unspecified; missing IDs are
    /// simply absent from the result.
    pub async fn list_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<MediaFile>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("SELECT {COLUMNS} FROM media_files WHERE id = ANY($1)");
        sqlx::query_as::<_, MediaFile>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
