//! Error types for the fleet services.

use streamfleet_core::allocation::RejectedCandidate;
use streamfleet_core::error::CoreError;
use streamfleet_core::types::DbId;

/// Persistent store failure.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store unreachable for a reason other than a driver error.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Fast shared store (Redis) failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Fast store unavailable: {0}")]
    Unavailable(String),

    #[error("Fast store entry is malformed: {0}")]
    Malformed(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Why no worker could be chosen for a stream.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("No active VPS servers")]
    NoActiveWorkers,

    #[error("No healthy VPS server ({} rejected)", rejected.len())]
    NoHealthyWorker { rejected: Vec<RejectedCandidate> },

    #[error(transparent)]
    Store(#[from] FleetError),
}

/// Failure of a synchronous stream lifecycle operation.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Stream {0} not found")]
    NotFound(DbId),

    /// The lifecycle does not allow the requested transition.
    #[error(transparent)]
    Transition(#[from] CoreError),

    #[error("No available VPS server, please try again later")]
    NoAvailableWorker(#[source] AllocationError),

    #[error("No VPS server assigned to this stream")]
    NoWorkerAssigned,

    #[error("Failed to upload config to VPS")]
    ConfigUpload,

    #[error("Invalid response from VPS")]
    InvalidResponse,

    /// The remote command failed or the agent reported an error.
    #[error("{0}")]
    Remote(String),

    #[error(transparent)]
    Store(#[from] FleetError),
}

impl From<AllocationError> for StreamError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Store(store) => Self::Store(store),
            other => Self::NoAvailableWorker(other),
        }
    }
}

impl From<sqlx::Error> for StreamError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(FleetError::Database(err))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
