//! Stream lifecycle state machine.
//!
//! Every status change of a stream goes through [`StreamStatus::apply`].
//! Callers never assign a status directly; they describe what happened with
//! a [`StreamEvent`] and persist whatever state `apply` returns.
//!
//! ```text
//! INACTIVE -> STARTING -> STREAMING -> STOPPING -> INACTIVE
//!                |                     |     ^
//!                +------> ERROR <------+     |
//!                           |                |
//!                           +----------------+ (stop)
//!                           +--> INACTIVE (recover)
//! ```
//!
//! Reconciliation can move any state to INACTIVE with
//! [`StreamEvent::ForceStop`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Persisted lifecycle status of a stream.
///
/// Discriminants match the seed order of the `stream_statuses` lookup table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Inactive = 1,
    Starting = 2,
    Streaming = 3,
    Stopping = 4,
    Error = 5,
}

/// Something that happened to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// A start was requested and a worker has been chosen.
    BeginStart,
    /// The worker agent acknowledged the start.
    StartSucceeded,
    /// Upload, transport or agent failure while starting.
    StartFailed,
    /// A stop was requested.
    BeginStop,
    /// The worker agent acknowledged the stop.
    StopSucceeded,
    /// A stop retried out of STOPPING failed again.
    StopFailed,
    /// Reconciliation gave up on the remote side and marks the stream stopped.
    ForceStop,
    /// Operator or automatic recovery from ERROR.
    Recover,
}

impl StreamStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Map a database status ID back to the enum.
    pub fn from_id(id: i16) -> Result<Self, CoreError> {
        match id {
            1 => Ok(Self::Inactive),
            2 => Ok(Self::Starting),
            3 => Ok(Self::Streaming),
            4 => Ok(Self::Stopping),
            5 => Ok(Self::Error),
            other => Err(CoreError::Internal(format!(
                "Unknown stream status id {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }

    /// Whether the database believes a worker process should exist for this stream.
    pub fn expects_remote_process(self) -> bool {
        matches!(self, Self::Starting | Self::Streaming | Self::Stopping)
    }

    /// Whether the stream occupies a slot in its worker's stream counter.
    ///
    /// The counter is only incremented when a start succeeds, so STARTING
    /// and ERROR streams never hold one. STOPPING is assumed to have been
    /// entered from STREAMING.
    pub fn holds_worker_slot(self) -> bool {
        matches!(self, Self::Streaming | Self::Stopping)
    }

    /// Apply an event, returning the next status or rejecting the transition.
    ///
    /// This is the single enforcement point for the lifecycle. Retried starts
    /// keep `Starting` and retried stops keep `Stopping`.
    pub fn apply(self, event: StreamEvent) -> Result<StreamStatus, CoreError> {
        use StreamEvent as E;
        use StreamStatus as S;

        let next = match (self, event) {
            (S::Inactive | S::Starting | S::Error, E::BeginStart) => S::Starting,
            (S::Starting, E::StartSucceeded) => S::Streaming,
            (S::Starting, E::StartFailed) => S::Error,

            (S::Starting | S::Streaming | S::Stopping | S::Error, E::BeginStop) => S::Stopping,
            (S::Starting | S::Streaming | S::Stopping | S::Error, E::StopSucceeded) => {
                S::Inactive
            }
            (S::Stopping, E::StopFailed) => S::Error,

            (_, E::ForceStop) => S::Inactive,
            (S::Error, E::Recover) => S::Inactive,

            (S::Streaming, E::BeginStart) => {
                return Err(CoreError::Conflict("Stream is already running".to_string()));
            }
            (from, event) => {
                return Err(CoreError::Conflict(format!(
                    "Cannot apply {event:?} to a stream in state {}",
                    from.as_str()
                )));
            }
        };
        Ok(next)
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
