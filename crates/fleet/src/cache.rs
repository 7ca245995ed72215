//! Fast shared store for live telemetry.
//!
//! Two Redis hashes:
//!
//! - `vps:latest_stats`: field = worker id, value = [`CachedSample`] JSON.
//!   Authoritative input for allocation.
//! - `stream:live_status`: field = stream id, value = [`ActiveStreamReport`]
//!   JSON.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use streamfleet_core::telemetry::{ActiveStreamReport, CachedSample};
use streamfleet_core::throttle::{fingerprint, LogThrottle};
use streamfleet_core::types::DbId;

use crate::error::CacheError;

/// Hash holding the latest sample per worker.
pub const LATEST_STATS_KEY: &str = "vps:latest_stats";

/// Hash holding the live status per stream.
pub const LIVE_STATUS_KEY: &str = "stream:live_status";

/// Hash-level access to the fast store, plus typed helpers.
#[async_trait]
pub trait TelemetryCache: Send + Sync {
    /// Round-trip to confirm the fast store is reachable.
    async fn ping(&self) -> Result<(), CacheError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;
    async fn hash_set(&self, key: &str, field: &str, value: String) -> Result<(), CacheError>;
    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError>;

    async fn put_worker_sample(
        &self,
        worker_id: DbId,
        sample: &CachedSample,
    ) -> Result<(), CacheError> {
        self.hash_set(LATEST_STATS_KEY, &worker_id.to_string(), encode(sample)?)
            .await
    }

    /// Latest sample of a worker. A malformed entry is an error, not `None`.
    async fn worker_sample(&self, worker_id: DbId) -> Result<Option<CachedSample>, CacheError> {
        let raw = self.hash_get(LATEST_STATS_KEY, &worker_id.to_string()).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn put_live_status(
        &self,
        stream_id: DbId,
        report: &ActiveStreamReport,
    ) -> Result<(), CacheError> {
        self.hash_set(LIVE_STATUS_KEY, &stream_id.to_string(), encode(report)?)
            .await
    }

    async fn live_status(&self, stream_id: DbId) -> Result<Option<ActiveStreamReport>, CacheError> {
        let raw = self.hash_get(LIVE_STATUS_KEY, &stream_id.to_string()).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn clear_live_status(&self, stream_id: DbId) -> Result<(), CacheError> {
        self.hash_delete(LIVE_STATUS_KEY, &stream_id.to_string())
            .await
    }
}

/// Log a fast-store failure at most once per window per distinct error.
pub fn warn_throttled(throttle: &LogThrottle, context: &str, err: &CacheError) {
    if throttle.should_log(&fingerprint(context, err)) {
        tracing::warn!(context, error = %err, "Fast store operation failed");
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|e| CacheError::Malformed(e.to_string()))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Malformed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

/// [`TelemetryCache`] over a multiplexed Redis connection.
///
/// `ConnectionManager` reconnects on its own; cloning it per call is cheap.
#[derive(Clone)]
pub struct RedisTelemetryCache {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisTelemetryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTelemetryCache")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisTelemetryCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        tracing::info!(redis_url, "Connecting to fast store");
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Fast store connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl TelemetryCache for RedisTelemetryCache {
    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.hget::<_, _, Option<String>>(key, field).await?)
    }

    async fn hash_set(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
