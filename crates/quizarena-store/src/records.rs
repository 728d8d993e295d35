//! Record types owned by the store.
//!
//! These are the durable shapes of rooms, battles, players, and content.
//! In-memory round state (timers, answered-sets) is *not* here — that is
//! owned by the room actor for the duration of a match and dies with it.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use quizarena_protocol::{
    BattleCode, BattleStatus, BattleWinner, ChallengeView, Difficulty, RoomCode, RoomStatus,
    RoundState, SubmissionStatus, TestCase, TestResult, Username,
};

// ---------------------------------------------------------------------------
// Quiz rooms
// ---------------------------------------------------------------------------

/// One multiplayer quiz session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub code: RoomCode,
    pub name: String,
    pub host: Username,
    pub topic: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub max_players: usize,
    pub status: RoomStatus,
    pub round_state: RoundState,
    /// Seconds per question, derived from difficulty at creation.
    pub timer_duration: u64,
    pub current_question_index: usize,
    /// Assigned once generation completes.
    pub quiz: Option<u64>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub round_started_at: Option<SystemTime>,
}

/// Parameters for creating a room. The store assigns the unique code.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub host: Username,
    pub topic: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub max_players: usize,
}

/// A player's membership in one room. Unique per (user, room).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub user: Username,
    pub room: RoomCode,
    /// Cumulative score. Only ever incremented within a match.
    pub score: i64,
    pub is_ready: bool,
    /// Per-question answer slot, reset at every round start.
    pub current_answer: Option<String>,
    pub answer_time_used: u64,
    pub answer_timestamp: Option<SystemTime>,
    pub joined_at: SystemTime,
}

impl PlayerRecord {
    /// Clears the per-question answer slot.
    pub fn reset_answer(&mut self) {
        self.current_answer = None;
        self.answer_time_used = 0;
        self.answer_timestamp = None;
    }
}

// ---------------------------------------------------------------------------
// Quizzes and questions
// ---------------------------------------------------------------------------

/// One generated question. `correct_answer` must match one of `options`
/// and never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl QuestionRecord {
    /// The client-facing projection: text and options only.
    pub fn view(&self) -> quizarena_protocol::QuestionView {
        quizarena_protocol::QuestionView {
            question_text: self.question_text.clone(),
            options: self.options.clone(),
        }
    }
}

/// An ordered set of questions, read-only during a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub id: u64,
    pub title: String,
    pub questions: Vec<QuestionRecord>,
}

/// Parameters for persisting a generated quiz. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub questions: Vec<QuestionRecord>,
}

// ---------------------------------------------------------------------------
// Code battles
// ---------------------------------------------------------------------------

/// A coding problem, including the private judge inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub problem_statement: String,
    /// Human-readable sample shown to players, `Input: … Output: …`.
    pub sample_io: Option<String>,
    pub difficulty: Difficulty,
    /// Seconds allowed per submission attempt.
    pub time_limit: u64,
    pub memory_limit: u64,
    pub test_cases: Vec<TestCase>,
}

impl ChallengeRecord {
    /// The client-facing projection: no test cases, no solution.
    pub fn view(&self) -> ChallengeView {
        ChallengeView {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            problem_statement: self.problem_statement.clone(),
            sample_io: self.sample_io.clone(),
            difficulty: self.difficulty,
            time_limit: self.time_limit,
        }
    }
}

/// One 1v1 coding battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub code: BattleCode,
    pub player1: Username,
    pub player2: Option<Username>,
    pub status: BattleStatus,
    pub level: Difficulty,
    pub num_questions: usize,
    /// Ordered challenge ids for this battle.
    pub challenges: Vec<u64>,
    pub current_challenge_index: usize,
    pub scores: BTreeMap<Username, i64>,
    /// First-solver ledger, keyed by challenge index. Append-only; each
    /// key is set at most once, and only from the battle's own actor.
    pub question_winners: BTreeMap<usize, Username>,
    pub player1_ready: bool,
    pub player2_ready: bool,
    pub winner: Option<BattleWinner>,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

impl BattleRecord {
    /// All usernames currently in the battle.
    pub fn players(&self) -> Vec<Username> {
        let mut players = vec![self.player1.clone()];
        if let Some(p2) = &self.player2 {
            players.push(p2.clone());
        }
        players
    }

    /// Whether `user` is one of the two battle slots.
    pub fn has_player(&self, user: &Username) -> bool {
        self.player1 == *user || self.player2.as_ref() == Some(user)
    }
}

/// Parameters for creating a battle. The store assigns the unique code.
#[derive(Debug, Clone)]
pub struct NewBattle {
    pub player1: Username,
    pub level: Difficulty,
    pub num_questions: usize,
    pub challenges: Vec<u64>,
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// One judged code submission. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub user: Username,
    pub challenge_id: u64,
    pub code: String,
    pub language: String,
    pub status: SubmissionStatus,
    pub test_results: Vec<TestResult>,
    pub submitted_at: SystemTime,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_record_reset_answer_clears_slot() {
        let mut player = PlayerRecord {
            user: Username::new("alice"),
            room: RoomCode::new("AB12CD"),
            score: 150,
            is_ready: true,
            current_answer: Some("B".into()),
            answer_time_used: 7,
            answer_timestamp: Some(SystemTime::now()),
            joined_at: SystemTime::now(),
        };
        player.reset_answer();
        assert_eq!(player.current_answer, None);
        assert_eq!(player.answer_time_used, 0);
        assert_eq!(player.answer_timestamp, None);
        // The cumulative score is untouched.
        assert_eq!(player.score, 150);
    }

    #[test]
    fn test_challenge_view_omits_test_cases() {
        let challenge = ChallengeRecord {
            id: 1,
            title: "Sum".into(),
            description: "Add numbers".into(),
            problem_statement: "Read two ints, print their sum".into(),
            sample_io: Some("Input: 1 2 Output: 3".into()),
            difficulty: Difficulty::Easy,
            time_limit: 300,
            memory_limit: 256,
            test_cases: vec![TestCase {
                input: "1 2".into(),
                output: "3".into(),
            }],
        };
        let view = challenge.view();
        assert_eq!(view.id, 1);
        // ChallengeView has no test_cases field at all; this test exists
        // so a future refactor can't quietly leak them into the view.
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("test_cases").is_none());
    }

    #[test]
    fn test_battle_record_players_and_membership() {
        let mut battle = BattleRecord {
            code: BattleCode::new("XY34ZW"),
            player1: Username::new("alice"),
            player2: None,
            status: BattleStatus::Waiting,
            level: Difficulty::Medium,
            num_questions: 3,
            challenges: vec![1, 2, 3],
            current_challenge_index: 0,
            scores: BTreeMap::new(),
            question_winners: BTreeMap::new(),
            player1_ready: false,
            player2_ready: false,
            winner: None,
            started_at: None,
            completed_at: None,
        };
        assert_eq!(battle.players().len(), 1);
        assert!(battle.has_player(&Username::new("alice")));
        assert!(!battle.has_player(&Username::new("bob")));

        battle.player2 = Some(Username::new("bob"));
        assert_eq!(battle.players().len(), 2);
        assert!(battle.has_player(&Username::new("bob")));
    }
}
