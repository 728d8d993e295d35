//! Per-room actors and match/battle engines for QuizArena.
//!
//! Each live room or battle runs as an isolated Tokio task (actor
//! model) owning all of its in-memory round state. Connections enqueue
//! commands; the actor processes them in order and fans events out to
//! every attached connection through bounded queues.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — owned map of live actors, injected into the
//!   gateway; insert on first join, remove on empty
//! - [`RoomHandle`] / [`BattleHandle`] — command channels to actors
//! - [`MatchEngine`] — quiz round progression (timers, scoring)
//! - [`BattleEngine`] — code battle progression (judging, first-solver,
//!   tie-break ladder)
//! - [`RoomError`] — the user-visible error taxonomy

mod battle;
mod battle_engine;
mod error;
mod match_engine;
mod registry;
mod room;

pub use battle::BattleHandle;
pub use battle_engine::{BattleEngine, GRACE_SECS};
pub use error::RoomError;
pub use match_engine::{MatchEngine, Outbox, REVIEW_SECS};
pub use registry::RoomRegistry;
pub use room::{EventSender, OUTBOUND_QUEUE, RoomHandle};
