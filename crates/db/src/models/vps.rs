//! Worker (VPS) entity models.

use serde::Serialize;
use sqlx::FromRow;
use streamfleet_core::counters::RecordedCounter;
use streamfleet_core::types::{DbId, Timestamp};

use crate::models::status::{StatusId, VpsStatus};

/// A row from the `vps_servers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VpsServer {
    pub id: DbId,
    pub name: String,
    pub ip_address: String,
    pub ssh_port: i32,
    pub ssh_user: String,
    #[serde(skip_serializing)]
    pub ssh_key_path: Option<String>,
    #[serde(skip_serializing)]
    pub ssh_password: Option<String>,
    pub status_id: StatusId,
    pub max_streams: i32,
    /// Cached count of running streams. Drifts; see `counters::plan_resync`.
    pub current_streams: i32,
    pub last_seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl VpsServer {
    pub fn status(&self) -> Option<VpsStatus> {
        VpsStatus::from_id(self.status_id)
    }

    pub fn is_active(&self) -> bool {
        self.status() == Some(VpsStatus::Active)
    }

    pub fn recorded_counter(&self) -> RecordedCounter {
        RecordedCounter {
            worker_id: self.id,
            current_streams: self.current_streams,
            max_streams: self.max_streams,
        }
    }
}
