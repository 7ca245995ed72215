//! Worker-side job specification.
//!
//! This is the JSON document uploaded to the worker before the agent is
//! asked to start a stream. Field names are part of the agent contract.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Order in which the worker plays the media list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackOrder {
    #[default]
    Sequential,
    Shuffle,
}

impl PlaybackOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Shuffle => "shuffle",
        }
    }

    /// Parse the value stored in the `playback_order` column.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "sequential" => Ok(Self::Sequential),
            "shuffle" | "random" => Ok(Self::Shuffle),
            other => Err(CoreError::Validation(format!(
                "Unknown playback order \"{other}\""
            ))),
        }
    }
}

/// One playable file, already resolved to a URL the worker can download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub file_id: DbId,
    pub filename: String,
    pub download_url: String,
    pub size: i64,
}

/// Full job specification sent to the worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamJobSpec {
    pub stream_id: DbId,
    pub title: String,
    pub rtmp_url: String,
    pub stream_key: String,
    pub media_files: Vec<MediaItem>,
    pub loop_playlist: bool,
    pub playback_order: PlaybackOrder,
    pub user_id: DbId,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
