//! Repository for the `stream_configs` table.
//!
//! Status writes are guarded by the caller's expected current status where
//! a race would matter, so a concurrent transition makes the write a no-op
//! (`false`) instead of clobbering it.

use sqlx::PgPool;
use streamfleet_core::stream_state::StreamStatus;
use streamfleet_core::types::{DbId, Timestamp};

use crate::models::stream::StreamConfig;

/// Column list for `stream_configs` SELECT queries.
const COLUMNS: &str = "\
    id, user_id, title, media_file_ids, rtmp_url, stream_key, loop_playlist, \
    playback_order, vps_server_id, status_id, last_started_at, last_stopped_at, \
    error_message, created_at, updated_at";

/// Provides query operations for stream jobs.
pub struct StreamConfigRepo;

impl StreamConfigRepo {
    /// Find a stream job by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StreamConfig>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stream_configs WHERE id = $1");
        sqlx::query_as::<_, StreamConfig>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Jobs in `status` whose last update is older than `cutoff`.
    pub async fn list_stuck(
        pool: &PgPool,
        status: StreamStatus,
        cutoff: Timestamp,
    ) -> Result<Vec<StreamConfig>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stream_configs \
             WHERE status_id = $1 AND updated_at < $2 \
             ORDER BY updated_at"
        );
        sqlx::query_as::<_, StreamConfig>(&query)
            .bind(status.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Jobs among `ids`, ordered by ID.
    pub async fn list_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<StreamConfig>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("SELECT {COLUMNS} FROM stream_configs WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, StreamConfig>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Number of STREAMING jobs per assigned worker.
    pub async fn count_streaming_by_vps(pool: &PgPool) -> Result<Vec<(DbId, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, i64)>(
            "SELECT vps_server_id, COUNT(*) FROM stream_configs \
             WHERE status_id = $1 AND vps_server_id IS NOT NULL \
             GROUP BY vps_server_id",
        )
        .bind(StreamStatus::Streaming.id())
        .fetch_all(pool)
        .await
    }

    /// Move a job from `expected` to STARTING on `vps_id`, clearing any
    /// previous error.
    pub async fn begin_start(
        pool: &PgPool,
        id: DbId,
        expected: StreamStatus,
        vps_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stream_configs SET status_id = $3, vps_server_id = $4, error_message = NULL \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(expected.id())
        .bind(StreamStatus::Starting.id())
        .bind(vps_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// STARTING -> STREAMING, only while the job is still STARTING on
    /// `vps_id`. Returns `false` when a concurrent stop got there first.
    pub async fn mark_streaming(
        pool: &PgPool,
        id: DbId,
        vps_id: DbId,
        started_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stream_configs SET status_id = $3, last_started_at = $4, error_message = NULL \
             WHERE id = $1 AND vps_server_id = $2 AND status_id = $5",
        )
        .bind(id)
        .bind(vps_id)
        .bind(StreamStatus::Streaming.id())
        .bind(started_at)
        .bind(StreamStatus::Starting.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `expected` (STARTING or STOPPING) -> ERROR with a message. The worker
    /// assignment is kept so a later stop can still reach it.
    pub async fn mark_error(
        pool: &PgPool,
        id: DbId,
        expected: StreamStatus,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stream_configs SET status_id = $2, error_message = $3 \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(StreamStatus::Error.id())
        .bind(message)
        .bind(expected.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a job from `expected` to STOPPING.
    pub async fn mark_stopping(
        pool: &PgPool,
        id: DbId,
        expected: StreamStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stream_configs SET status_id = $3 WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(expected.id())
        .bind(StreamStatus::Stopping.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a job to INACTIVE, unassign its worker and stamp the stop time.
    /// Unguarded: a confirmed or forced stop wins over any other status.
    ///
    /// `message` overwrites `error_message` (pass `None` to clear it).
    pub async fn mark_stopped(
        pool: &PgPool,
        id: DbId,
        stopped_at: Timestamp,
        message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stream_configs SET status_id = $2, vps_server_id = NULL, \
             last_stopped_at = $3, error_message = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(StreamStatus::Inactive.id())
        .bind(stopped_at)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
