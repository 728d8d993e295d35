//! Error types for the room layer.
//!
//! These carry the user-visible taxonomy: every variant maps onto an
//! `error{message}` event delivered to the offending connection only.
//! None of them ever terminates a room actor.

use quizarena_protocol::Username;
use quizarena_store::{SourceError, StoreError};

/// Errors that can occur during room and battle operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room, battle, challenge, or question does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The room has no free player slots.
    #[error("room {0} is full")]
    Full(String),

    /// The player already has a live connection in this room.
    #[error("{0} is already in this room")]
    AlreadyInRoom(Username),

    /// The sender is not a member of the room they addressed.
    #[error("{0} is not in this room")]
    NotInRoom(Username),

    /// The sender may not perform this action (non-host start, foreign
    /// ready flag).
    #[error("{0}")]
    Forbidden(String),

    /// The action conflicts with current state (battle full, round
    /// already decided, insufficient challenges). Idempotent no-op.
    #[error("{0}")]
    Conflict(String),

    /// The message is missing required data or malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// The room's command channel is gone (actor shut down).
    #[error("room {0} is unavailable")]
    Unavailable(String),

    /// The external judge or generator failed even after degradation.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// A store failure aborted the attempted transition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SourceError> for RoomError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Insufficient { wanted, got } => RoomError::Conflict(format!(
                "not enough questions available: wanted {wanted}, got {got}"
            )),
            SourceError::Unavailable(msg) => RoomError::Upstream(msg),
        }
    }
}
