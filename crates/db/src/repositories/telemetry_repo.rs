//! Repository for the `vps_telemetry` table (append-only time-series).

use sqlx::PgPool;
use streamfleet_core::types::{DbId, Timestamp};

use crate::models::telemetry::{CreateTelemetrySample, SampleAggregate, TelemetrySample};

/// Column list for `vps_telemetry` SELECT queries (includes `id` and `created_at`).
const COLUMNS: &str = "id, vps_server_id, cpu_usage, ram_usage, disk_usage, recorded_at, created_at";

/// Provides query operations for worker telemetry samples.
pub struct TelemetryRepo;

impl TelemetryRepo {
    /// Append one sample.
    pub async fn insert(
        pool: &PgPool,
        sample: &CreateTelemetrySample,
    ) -> Result<TelemetrySample, sqlx::Error> {
        let query = format!(
            "INSERT INTO vps_telemetry (vps_server_id, cpu_usage, ram_usage, disk_usage, recorded_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TelemetrySample>(&query)
            .bind(sample.vps_server_id)
            .bind(sample.cpu_usage)
            .bind(sample.ram_usage)
            .bind(sample.disk_usage)
            .bind(sample.recorded_at)
            .fetch_one(pool)
            .await
    }

    /// Most recent sample of a worker, if any.
    pub async fn latest_for_vps(
        pool: &PgPool,
        vps_id: DbId,
    ) -> Result<Option<TelemetrySample>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM vps_telemetry WHERE vps_server_id = $1 \
             ORDER BY recorded_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, TelemetrySample>(&query)
            .bind(vps_id)
            .fetch_optional(pool)
            .await
    }

    /// Samples since `since`, newest first, capped at `limit`.
    pub async fn recent_for_vps(
        pool: &PgPool,
        vps_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> Result<Vec<TelemetrySample>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM vps_telemetry \
             WHERE vps_server_id = $1 AND recorded_at >= $2 \
             ORDER BY recorded_at DESC LIMIT $3"
        );
        sqlx::query_as::<_, TelemetrySample>(&query)
            .bind(vps_id)
            .bind(since)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Averages and peaks over every sample since `since`.
    pub async fn aggregate_for_vps(
        pool: &PgPool,
        vps_id: DbId,
        since: Timestamp,
    ) -> Result<SampleAggregate, sqlx::Error> {
        sqlx::query_as::<_, SampleAggregate>(
            "SELECT COUNT(*) AS sample_count, \
                    AVG(cpu_usage) AS avg_cpu, AVG(ram_usage) AS avg_ram, AVG(disk_usage) AS avg_disk, \
                    MAX(cpu_usage) AS peak_cpu, MAX(ram_usage) AS peak_ram, MAX(disk_usage) AS peak_disk \
             FROM vps_telemetry WHERE vps_server_id = $1 AND recorded_at >= $2",
        )
        .bind(vps_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Latest sample per worker among samples recorded since `since`.
    ///
    /// Uses `DISTINCT ON` to pick the newest row per worker in one pass.
    pub async fn latest_per_vps_since(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<TelemetrySample>, sqlx::Error> {
        let query = format!(
            "SELECT DISTINCT ON (vps_server_id) {COLUMNS} FROM vps_telemetry \
             WHERE recorded_at >= $1 \
             ORDER BY vps_server_id, recorded_at DESC"
        );
        sqlx::query_as::<_, TelemetrySample>(&query)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    /// Delete samples recorded before `cutoff`. Returns the number removed.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM vps_telemetry WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
