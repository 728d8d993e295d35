//! Wire protocol for QuizArena.
//!
//! This crate defines the language that clients and the server speak:
//!
//! - **Types** — identities ([`Username`], [`RoomCode`], [`BattleCode`]),
//!   state enums, and the snapshot/result payloads.
//! - **Messages** — the closed inbound set ([`ClientMessage`]) and the
//!   closed outbound set ([`ServerEvent`]), both internally tagged on a
//!   `type` field.
//! - **Codec** — [`Codec`] / [`JsonCodec`] plus [`decode_inbound`], which
//!   distinguishes unknown message types (tolerated) from malformed
//!   frames (reported to the sender).
//!
//! The protocol layer knows nothing about connections, rooms, or storage;
//! it only defines what travels on the wire.

mod codec;
mod error;
mod event;
mod message;
mod types;

pub use codec::{Codec, Inbound};
#[cfg(feature = "json")]
pub use codec::{JsonCodec, decode_inbound};
pub use error::ProtocolError;
pub use event::ServerEvent;
pub use message::ClientMessage;
pub use types::{
    BattleCode, BattleResults, BattleSnapshot, BattleStatus, BattleWinner, ChallengeView,
    Difficulty, PlayerResult, PlayerView, QuestionView, RankedScore, Recipient, RoomCode,
    RoomSnapshot, RoomStatus, RoundState, ScoreEntry, SubmissionStatus, TestCase, TestResult,
    Username,
};
