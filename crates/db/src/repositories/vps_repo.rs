//! Repository for the `vps_servers` table.

use sqlx::PgPool;
use streamfleet_core::types::{DbId, Timestamp};

use crate::models::status::{StreamStatus, VpsStatus};
use crate::models::vps::VpsServer;

/// Column list for `vps_servers` SELECT queries.
const COLUMNS: &str = "\
    id, name, ip_address, ssh_port, ssh_user, ssh_key_path, ssh_password, \
    status_id, max_streams, current_streams, last_seen_at, created_at, updated_at";

/// Provides query operations for workers.
pub struct VpsRepo;

impl VpsRepo {
    /// Find a worker by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<VpsServer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM vps_servers WHERE id = $1");
        sqlx::query_as::<_, VpsServer>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List every registered worker ordered by ID.
    pub async fn list(pool: &PgPool) -> Result<Vec<VpsServer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM vps_servers ORDER BY id");
        sqlx::query_as::<_, VpsServer>(&query).fetch_all(pool).await
    }

    /// List workers whose status is `active`.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<VpsServer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM vps_servers WHERE status_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, VpsServer>(&query)
            .bind(VpsStatus::Active.id())
            .fetch_all(pool)
            .await
    }

    /// Bump the cached stream counter by one.
    pub async fn increment_streams(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE vps_servers SET current_streams = current_streams + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lower the cached stream counter by one, never below zero.
    pub async fn decrement_streams(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE vps_servers SET current_streams = GREATEST(current_streams - 1, 0) \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the cached stream counter.
    pub async fn set_streams(pool: &PgPool, id: DbId, count: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE vps_servers SET current_streams = $2 WHERE id = $1")
            .bind(id)
            .bind(count.max(0))
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Recompute every counter from the STREAMING rows in one statement.
    ///
    /// Returns the number of workers whose counter changed.
    pub async fn reset_all_streams(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE vps_servers v SET current_streams = c.cnt \
             FROM ( \
                 SELECT v2.id, COUNT(s.id)::INT AS cnt FROM vps_servers v2 \
                 LEFT JOIN stream_configs s \
                     ON s.vps_server_id = v2.id AND s.status_id = $1 \
                 GROUP BY v2.id \
             ) c \
             WHERE v.id = c.id AND v.current_streams <> c.cnt",
        )
        .bind(StreamStatus::Streaming.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a telemetry self-report: last seen time and, when the agent
    /// reported one, its own stream count.
    pub async fn record_self_report(
        pool: &PgPool,
        id: DbId,
        total_streams: Option<i32>,
        seen_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE vps_servers SET last_seen_at = $2, \
             current_streams = COALESCE($3, current_streams) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(seen_at)
        .bind(total_streams)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
