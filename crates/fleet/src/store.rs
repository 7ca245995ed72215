//! Persistent store seam.
//!
//! [`FleetStore`] is the subset of the database the fleet services touch.
//! [`PgFleetStore`] forwards to the `streamfleet-db` repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use streamfleet_core::stream_state::StreamStatus;
use streamfleet_core::types::{DbId, Timestamp};
use streamfleet_db::models::media::MediaFile;
use streamfleet_db::models::stream::StreamConfig;
use streamfleet_db::models::telemetry::{
    CreateTelemetrySample, SampleAggregate, StreamProgress, TelemetrySample, UpsertStreamProgress,
};
use streamfleet_db::models::vps::VpsServer;
use streamfleet_db::repositories::{
    MediaFileRepo, StreamConfigRepo, StreamProgressRepo, TelemetryRepo, VpsRepo,
};

use crate::error::FleetError;

pub type StoreResult<T> = Result<T, FleetError>;

#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Round-trip to confirm the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    // --- workers ---

    async fn get_vps(&self, id: DbId) -> StoreResult<Option<VpsServer>>;
    async fn list_vps(&self) -> StoreResult<Vec<VpsServer>>;
    async fn list_active_vps(&self) -> StoreResult<Vec<VpsServer>>;
    async fn increment_streams(&self, id: DbId) -> StoreResult<()>;
    /// Decrement, never below zero.
    async fn decrement_streams(&self, id: DbId) -> StoreResult<()>;
    async fn set_streams(&self, id: DbId, count: i32) -> StoreResult<()>;
    /// Rewrite every counter from the STREAMING rows. Returns rows changed.
    async fn reset_all_streams(&self) -> StoreResult<u64>;
    async fn record_self_report(
        &self,
        id: DbId,
        total_streams: Option<i32>,
        seen_at: Timestamp,
    ) -> StoreResult<()>;

    // --- streams ---

    async fn get_stream(&self, id: DbId) -> StoreResult<Option<StreamConfig>>;
    async fn list_streams_by_ids(&self, ids: &[DbId]) -> StoreResult<Vec<StreamConfig>>;
    async fn list_stuck_streams(
        &self,
        status: StreamStatus,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<StreamConfig>>;
    async fn count_streaming_by_vps(&self) -> StoreResult<HashMap<DbId, i64>>;
    async fn begin_start(&self, id: DbId, expected: StreamStatus, vps_id: DbId)
        -> StoreResult<bool>;
    /// STARTING on `vps_id` -> STREAMING. `false` when the stream moved on.
    async fn mark_streaming(&self, id: DbId, vps_id: DbId, started_at: Timestamp)
        -> StoreResult<bool>;
    /// `expected` -> ERROR. `false` when the stream moved on.
    async fn mark_error(&self, id: DbId, expected: StreamStatus, message: &str)
        -> StoreResult<bool>;
    async fn mark_stopping(&self, id: DbId, expected: StreamStatus) -> StoreResult<bool>;
    async fn mark_stopped(
        &self,
        id: DbId,
        stopped_at: Timestamp,
        message: Option<&str>,
    ) -> StoreResult<bool>;

    // --- media ---

    async fn list_media_files(&self, ids: &[DbId]) -> StoreResult<Vec<MediaFile>>;

    // --- telemetry ---

    async fn insert_sample(&self, sample: &CreateTelemetrySample) -> StoreResult<TelemetrySample>;
    async fn latest_sample(&self, vps_id: DbId) -> StoreResult<Option<TelemetrySample>>;
    async fn recent_samples(
        &self,
        vps_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<TelemetrySample>>;
    async fn aggregate_samples(&self, vps_id: DbId, since: Timestamp)
        -> StoreResult<SampleAggregate>;
    async fn latest_samples_since(&self, since: Timestamp) -> StoreResult<Vec<TelemetrySample>>;
    async fn delete_samples_older_than(&self, cutoff: Timestamp) -> StoreResult<u64>;

    // --- progress ---

    async fn upsert_progress(
        &self,
        progress: &UpsertStreamProgress,
        updated_at: Timestamp,
    ) -> StoreResult<()>;
    async fn find_progress(&self, stream_id: DbId) -> StoreResult<Option<StreamProgress>>;
    async fn list_progress_since(&self, since: Timestamp) -> StoreResult<Vec<StreamProgress>>;
    async fn delete_progress(&self, stream_id: DbId) -> StoreResult<()>;
}

/// [`FleetStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgFleetStore {
    pool: PgPool,
}

impl PgFleetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FleetStore for PgFleetStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(streamfleet_db::health_check(&self.pool).await?)
    }

    async fn get_vps(&self, id: DbId) -> StoreResult<Option<VpsServer>> {
        Ok(VpsRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_vps(&self) -> StoreResult<Vec<VpsServer>> {
        Ok(VpsRepo::list(&self.pool).await?)
    }

    async fn list_active_vps(&self) -> StoreResult<Vec<VpsServer>> {
        Ok(VpsRepo::list_active(&self.pool).await?)
    }

    async fn increment_streams(&self, id: DbId) -> StoreResult<()> {
        VpsRepo::increment_streams(&self.pool, id).await?;
        Ok(())
    }

    async fn decrement_streams(&self, id: DbId) -> StoreResult<()> {
        VpsRepo::decrement_streams(&self.pool, id).await?;
        Ok(())
    }

    async fn set_streams(&self, id: DbId, count: i32) -> StoreResult<()> {
        VpsRepo::set_streams(&self.pool, id, count).await?;
        Ok(())
    }

    async fn reset_all_streams(&self) -> StoreResult<u64> {
        Ok(VpsRepo::reset_all_streams(&self.pool).await?)
    }

    async fn record_self_report(
        &self,
        id: DbId,
        total_streams: Option<i32>,
        seen_at: Timestamp,
    ) -> StoreResult<()> {
        VpsRepo::record_self_report(&self.pool, id, total_streams, seen_at).await?;
        Ok(())
    }

    async fn get_stream(&self, id: DbId) -> StoreResult<Option<StreamConfig>> {
        Ok(StreamConfigRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_streams_by_ids(&self, ids: &[DbId]) -> StoreResult<Vec<StreamConfig>> {
        Ok(StreamConfigRepo::list_by_ids(&self.pool, ids).await?)
    }

    async fn list_stuck_streams(
        &self,
        status: StreamStatus,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<StreamConfig>> {
        Ok(StreamConfigRepo::list_stuck(&self.pool, status, cutoff).await?)
    }

    async fn count_streaming_by_vps(&self) -> StoreResult<HashMap<DbId, i64>> {
        let rows = StreamConfigRepo::count_streaming_by_vps(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }

    async fn begin_start(
        &self,
        id: DbId,
        expected: StreamStatus,
        vps_id: DbId,
    ) -> StoreResult<bool> {
        Ok(StreamConfigRepo::begin_start(&self.pool, id, expected, vps_id).await?)
    }

    async fn mark_streaming(
        &self,
        id: DbId,
        vps_id: DbId,
        started_at: Timestamp,
    ) -> StoreResult<bool> {
        Ok(StreamConfigRepo::mark_streaming(&self.pool, id, vps_id, started_at).await?)
    }

    async fn mark_error(
        &self,
        id: DbId,
        expected: StreamStatus,
        message: &str,
    ) -> StoreResult<bool> {
        Ok(StreamConfigRepo::mark_error(&self.pool, id, expected, message).await?)
    }

    async fn mark_stopping(&self, id: DbId, expected: StreamStatus) -> StoreResult<bool> {
        Ok(StreamConfigRepo::mark_stopping(&self.pool, id, expected).await?)
    }

    async fn mark_stopped(
        &self,
        id: DbId,
        stopped_at: Timestamp,
        message: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(StreamConfigRepo::mark_stopped(&self.pool, id, stopped_at, message).await?)
    }

    async fn list_media_files(&self, ids: &[DbId]) -> StoreResult<Vec<MediaFile>> {
        Ok(MediaFileRepo::list_by_ids(&self.pool, ids).await?)
    }

    async fn insert_sample(&self, sample: &CreateTelemetrySample) -> StoreResult<TelemetrySample> {
        Ok(TelemetryRepo::insert(&self.pool, sample).await?)
    }

    async fn latest_sample(&self, vps_id: DbId) -> StoreResult<Option<TelemetrySample>> {
        Ok(TelemetryRepo::latest_for_vps(&self.pool, vps_id).await?)
    }

    async fn recent_samples(
        &self,
        vps_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<TelemetrySample>> {
        Ok(TelemetryRepo::recent_for_vps(&self.pool, vps_id, since, limit).await?)
    }

    async fn aggregate_samples(
        &self,
        vps_id: DbId,
        since: Timestamp,
    ) -> StoreResult<SampleAggregate> {
        Ok(TelemetryRepo::aggregate_for_vps(&self.pool, vps_id, since).await?)
    }

    async fn latest_samples_since(&self, since: Timestamp) -> StoreResult<Vec<TelemetrySample>> {
        Ok(TelemetryRepo::latest_per_vps_since(&self.pool, since).await?)
    }

    async fn delete_samples_older_than(&self, cutoff: Timestamp) -> StoreResult<u64> {
        Ok(TelemetryRepo::delete_older_than(&self.pool, cutoff).await?)
    }

    async fn upsert_progress(
        &self,
        progress: &UpsertStreamProgress,
        updated_at: Timestamp,
    ) -> StoreResult<()> {
        Ok(StreamProgressRepo::upsert(&self.pool, progress, updated_at).await?)
    }

    async fn find_progress(&self, stream_id: DbId) -> StoreResult<Option<StreamProgress>> {
        Ok(StreamProgressRepo::find(&self.pool, stream_id).await?)
    }

    async fn list_progress_since(&self, since: Timestamp) -> StoreResult<Vec<StreamProgress>> {
        Ok(StreamProgressRepo::list_updated_since(&self.pool, since).await?)
    }

    async fn delete_progress(&self, stream_id: DbId) -> StoreResult<()> {
        StreamProgressRepo::delete(&self.pool, stream_id).await?;
        Ok(())
    }
}
