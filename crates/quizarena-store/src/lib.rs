//! Persistence abstraction and question supply for QuizArena.
//!
//! The coordinator core never talks to a database directly; it issues
//! calls against the [`RoomStore`] trait. The store is the durable owner
//! of rooms, battles, players, and submissions across restarts — the
//! in-memory round state lives in the room actors and is rebuilt from
//! these records.
//!
//! All writes for a given room/battle are issued from that room's single
//! actor, so implementations don't need per-record locking beyond their
//! own internal consistency. The one genuinely cross-room concern is
//! share-code generation, which implementations must make atomic
//! (rejection sampling against existing codes under one critical
//! section).
//!
//! [`MemoryStore`] is the reference implementation used in development
//! and tests. [`QuestionSource`] supplies quiz questions, with
//! [`FallbackSource`] composing a primary (e.g. an external generator)
//! with a local pool.

mod error;
mod memory;
mod records;
mod source;

pub use error::{SourceError, StoreError};
pub use memory::MemoryStore;
pub use records::{
    BattleRecord, ChallengeRecord, NewBattle, NewQuiz, NewRoom, PlayerRecord, QuestionRecord,
    QuizRecord, RoomRecord, SubmissionRecord,
};
pub use source::{FallbackSource, FixedSource, QuestionSource};

use quizarena_protocol::{BattleCode, Difficulty, RoomCode, Username};

/// The abstract persistence collaborator.
///
/// Implementations must be cheap to clone or shared behind `Arc`; every
/// room actor holds a handle.
#[async_trait::async_trait]
pub trait RoomStore: Send + Sync + 'static {
    // -- Quiz rooms --

    /// Creates a room, generating a unique 6-character share code by
    /// rejection sampling against existing codes.
    async fn create_room(&self, new: NewRoom) -> Result<RoomRecord, StoreError>;

    async fn room(&self, code: &RoomCode) -> Result<RoomRecord, StoreError>;

    async fn update_room(&self, room: &RoomRecord) -> Result<(), StoreError>;

    async fn delete_room(&self, code: &RoomCode) -> Result<(), StoreError>;

    /// All players in a room, in join order.
    async fn players(&self, code: &RoomCode) -> Result<Vec<PlayerRecord>, StoreError>;

    async fn player(&self, code: &RoomCode, user: &Username)
    -> Result<PlayerRecord, StoreError>;

    /// Adds `user` to the room if absent. Returns the record and whether
    /// it was newly created (get-or-create semantics).
    async fn join_player(
        &self,
        code: &RoomCode,
        user: &Username,
    ) -> Result<(PlayerRecord, bool), StoreError>;

    async fn update_player(&self, player: &PlayerRecord) -> Result<(), StoreError>;

    async fn remove_player(&self, code: &RoomCode, user: &Username) -> Result<(), StoreError>;

    // -- Quizzes --

    async fn create_quiz(&self, new: NewQuiz) -> Result<QuizRecord, StoreError>;

    async fn quiz(&self, id: u64) -> Result<QuizRecord, StoreError>;

    // -- Challenges --

    async fn challenge(&self, id: u64) -> Result<ChallengeRecord, StoreError>;

    /// Picks `count` distinct random challenges at `difficulty`.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if fewer than `count` exist —
    /// battles are never silently under-filled.
    async fn challenges_by_difficulty(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<ChallengeRecord>, StoreError>;

    // -- Battles --

    /// Creates a battle, generating a unique share code.
    async fn create_battle(&self, new: NewBattle) -> Result<BattleRecord, StoreError>;

    async fn battle(&self, code: &BattleCode) -> Result<BattleRecord, StoreError>;

    async fn update_battle(&self, battle: &BattleRecord) -> Result<(), StoreError>;

    /// Finds a waiting battle containing `challenge_id` with an empty
    /// second slot, excluding battles created by `exclude`.
    async fn find_open_battle(
        &self,
        challenge_id: u64,
        exclude: &Username,
    ) -> Result<Option<BattleRecord>, StoreError>;

    /// Finds a waiting battle that `user` created containing
    /// `challenge_id` (so re-joining returns the same battle).
    async fn find_waiting_battle_of(
        &self,
        user: &Username,
        challenge_id: u64,
    ) -> Result<Option<BattleRecord>, StoreError>;

    // -- Submissions --

    async fn record_submission(&self, submission: SubmissionRecord) -> Result<(), StoreError>;

    /// Whether `user` has a terminal (accepted or time-limit) submission
    /// for `challenge_id`.
    async fn has_terminal_submission(
        &self,
        user: &Username,
        challenge_id: u64,
    ) -> Result<bool, StoreError>;

    // -- Progress bookkeeping (external gamification hooks) --

    /// Credits `score` to the user's overall progress. Invoked exactly
    /// once per player when a match ends.
    async fn update_user_progress(&self, user: &Username, score: i64) -> Result<(), StoreError>;

    /// Extends the user's daily streak. Invoked exactly once per player
    /// when a match ends.
    async fn update_streak(&self, user: &Username) -> Result<(), StoreError>;
}
