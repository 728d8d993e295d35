//! Unified error type for the QuizArena server.

use quizarena_protocol::ProtocolError;
use quizarena_room::RoomError;
use quizarena_store::StoreError;
use quizarena_transport::TransportError;

use crate::auth::AuthError;

/// Top-level error wrapping the layer-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum QuizArenaError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room/battle-level error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A store-level error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An authentication error.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let top: QuizArenaError = err.into();
        assert!(matches!(top, QuizArenaError::Transport(_)));
        assert!(top.to_string().contains("gone"));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::Full("AB12CD".into());
        let top: QuizArenaError = err.into();
        assert!(matches!(top, QuizArenaError::Room(_)));
    }

    #[test]
    fn test_from_auth_error() {
        let err = AuthError::Failed("bad token".into());
        let top: QuizArenaError = err.into();
        assert!(top.to_string().contains("bad token"));
    }
}
