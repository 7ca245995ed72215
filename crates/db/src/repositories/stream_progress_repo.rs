//! Repository for the `stream_progress` table (one row per job, overwritten).

use sqlx::PgPool;
use streamfleet_core::types::{DbId, Timestamp};

use crate::models::telemetry::{StreamProgress, UpsertStreamProgress};

const COLUMNS: &str = "\
    stream_config_id, vps_server_id, status, progress, message, uptime_secs, error, updated_at";

/// Provides query operations for live stream progress.
pub struct StreamProgressRepo;

impl StreamProgressRepo {
    /// Insert or overwrite the progress row of a job.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertStreamProgress,
        updated_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO stream_progress \
                 (stream_config_id, vps_server_id, status, progress, message, uptime_secs, error, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (stream_config_id) DO UPDATE SET \
                 vps_server_id = EXCLUDED.vps_server_id, \
                 status = EXCLUDED.status, \
                 progress = EXCLUDED.progress, \
                 message = EXCLUDED.message, \
                 uptime_secs = EXCLUDED.uptime_secs, \
                 error = EXCLUDED.error, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(input.stream_config_id)
        .bind(input.vps_server_id)
        .bind(&input.status)
        .bind(input.progress)
        .bind(&input.message)
        .bind(input.uptime_secs)
        .bind(&input.error)
        .bind(updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find(
        pool: &PgPool,
        stream_config_id: DbId,
    ) -> Result<Option<StreamProgress>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stream_progress WHERE stream_config_id = $1");
        sqlx::query_as::<_, StreamProgress>(&query)
            .bind(stream_config_id)
            .fetch_optional(pool)
            .await
    }

    /// Rows written at or after `since`.
    pub async fn list_updated_since(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<StreamProgress>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stream_progress WHERE updated_at >= $1 \
             ORDER BY stream_config_id"
        );
        sqlx::query_as::<_, StreamProgress>(&query)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, stream_config_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stream_progress WHERE stream_config_id = $1")
            .bind(stream_config_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
