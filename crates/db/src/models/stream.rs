//! Stream job entity models.

use serde::Serialize;
use sqlx::FromRow;
use streamfleet_core::error::CoreError;
use streamfleet_core::job_spec::PlaybackOrder;
use streamfleet_core::stream_state::StreamStatus;
use streamfleet_core::types::{DbId, Timestamp};

use crate::models::status::StatusId;

/// A row from the `stream_configs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StreamConfig {
    pub id: DbId,
    pub user_id: DbId,
    pub title: String,
    /// Ordered media references.
    pub media_file_ids: Vec<DbId>,
    pub rtmp_url: String,
    #[serde(skip_serializing)]
    pub stream_key: String,
    pub loop_playlist: bool,
    pub playback_order: String,
    pub vps_server_id: Option<DbId>,
    pub status_id: StatusId,
    pub last_started_at: Option<Timestamp>,
    pub last_stopped_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StreamConfig {
    pub fn status(&self) -> Result<StreamStatus, CoreError> {
        StreamStatus::from_id(self.status_id)
    }

    /// Unknown values fall back to sequential playback.
    pub fn playback_order(&self) -> PlaybackOrder {
        PlaybackOrder::parse(&self.playback_order).unwrap_or_default()
    }
}
