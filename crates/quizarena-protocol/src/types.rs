//! Core protocol types shared across the QuizArena stack.
//!
//! Everything here either travels on the wire (snapshots, results,
//! leaderboards) or names a participant of the match (usernames, room and
//! battle codes). The inbound/outbound message enums built from these
//! types live in [`crate::message`] and [`crate::event`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's username, as issued by the external auth layer.
///
/// Newtype over `String` so a username can't be confused with other wire
/// strings (answers, codes). Serializes as a plain JSON string.
///
/// `Ord` matters: exact-score leaderboard ties are broken alphabetically
/// by username, so ordering usernames must be deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(pub String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The human-shareable join token for a quiz room: 6 uppercase
/// alphanumeric characters, unique per active room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Normalizes user input: codes are case-insensitive on the way in,
    /// uppercase everywhere else.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The join token for a code battle. Same format as [`RoomCode`] but the
/// two namespaces are independent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleCode(pub String);

impl BattleCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }
}

impl fmt::Display for BattleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Enumerated states
// ---------------------------------------------------------------------------

/// Question/challenge difficulty. Drives the per-question timer for quiz
/// rooms and challenge selection for battles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Seconds per question for a quiz room at this difficulty.
    pub fn timer_duration(self) -> u64 {
        match self {
            Self::Easy => 30,
            Self::Medium => 45,
            Self::Hard => 60,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// Lifecycle of a quiz room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Active,
    Finished,
}

/// Lifecycle of a single question round within an active quiz.
///
/// Valid transitions: `Waiting → Active → Review → Complete → Active`
/// (next question), or `Active → Complete` when the timer expires with no
/// answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    #[default]
    Waiting,
    Active,
    Review,
    Complete,
}

/// Lifecycle of a code battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
}

/// Outcome of a code submission, derived from the judge report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Accepted,
    WrongAnswer,
    TimeLimit,
    MemoryLimit,
    CompilationError,
}

impl SubmissionStatus {
    /// A terminal submission ends the player's participation in the
    /// current challenge: either they solved it or they ran out of time.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::TimeLimit)
    }
}

// ---------------------------------------------------------------------------
// Judge vocabulary
// ---------------------------------------------------------------------------

/// One input/expected-output pair a submission is judged against.
///
/// Test cases never cross the wire to clients; they are shared vocabulary
/// between the store (which owns them) and the judge (which runs them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// Per-test detail from a judged submission. These do go to the
/// submitting client in `submission_result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub input: String,
    pub expected: String,
    pub output: String,
    pub passed: bool,
    pub error: Option<String>,
    /// Execution time in seconds for this test.
    #[serde(default)]
    pub time: f64,
}

// ---------------------------------------------------------------------------
// Snapshots and payloads
// ---------------------------------------------------------------------------

/// A question as shown to players: text and options only. The correct
/// answer stays server-side until `round_result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionView {
    pub question_text: String,
    pub options: Vec<String>,
}

/// One player's row in a room snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub user: Username,
    pub score: i64,
    pub is_ready: bool,
    pub is_host: bool,
}

/// Full room state sent on join and alongside membership changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub name: String,
    pub host: Username,
    pub status: RoomStatus,
    pub round_state: RoundState,
    pub topic: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub max_players: usize,
    pub timer_duration: u64,
    pub current_question_index: usize,
    pub quiz: Option<u64>,
    pub players: Vec<PlayerView>,
}

/// A coding challenge as shown to players. Test cases and the reference
/// solution are deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub problem_statement: String,
    pub sample_io: Option<String>,
    pub difficulty: Difficulty,
    pub time_limit: u64,
}

/// Full battle state sent on join/start and on progression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleSnapshot {
    pub battle_code: BattleCode,
    pub player1: Username,
    pub player2: Option<Username>,
    pub player1_ready: bool,
    pub player2_ready: bool,
    pub status: BattleStatus,
    pub level: Difficulty,
    pub num_questions: usize,
    pub current_challenge_index: usize,
    pub current_challenge: Option<ChallengeView>,
    pub challenges: Vec<ChallengeView>,
    pub scores: BTreeMap<Username, i64>,
}

/// One player's outcome for a quiz round, included in `round_result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub user: Username,
    pub selected: Option<String>,
    pub is_correct: bool,
    /// Seconds between question start and this player's answer.
    pub answer_time: u64,
    pub score_gained: i64,
}

/// A leaderboard row (quiz rooms, score descending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub user: Username,
    pub score: i64,
}

/// A ranked leaderboard row (battle finals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedScore {
    pub rank: usize,
    pub user: Username,
    pub score: i64,
}

/// Winner of a battle: a username, or the literal string `"tie"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleWinner {
    #[serde(rename = "tie")]
    Tie,
    #[serde(untagged)]
    Player(Username),
}

/// Final results broadcast when a battle completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResults {
    pub winner: BattleWinner,
    pub scores: BTreeMap<Username, i64>,
    pub leaderboard: Vec<RankedScore>,
}

// ---------------------------------------------------------------------------
// Recipient — who should receive an event?
// ---------------------------------------------------------------------------

/// Addressing for events produced by the engines. The room actor turns
/// these into per-connection sends, preserving join order for `All`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connection joined to the room.
    All,
    /// Every connection belonging to one player.
    Player(Username),
    /// Everyone except the named player.
    AllExcept(Username),
}

// =========================================================================
// Tests
// =========================================================================
