//! Outbound wire events: everything the server may broadcast or reply.
//!
//! One variant per design-level event. The gateway serializes these with
//! an exhaustive `match`-free serde derive, so a new event cannot be
//! added without appearing in the wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    BattleResults, BattleSnapshot, ChallengeView, PlayerResult, QuestionView, RoomSnapshot,
    ScoreEntry, SubmissionStatus, TestResult, Username,
};

/// An event from the server, encoded as one JSON text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // -- Connection-level --
    /// Reply to a successful `authenticate`.
    Authenticated { user: Username },

    // -- Membership (quiz rooms carry `room`, battles carry `battle`) --
    /// Full room state, sent to a client right after it joins.
    RoomState { room: RoomSnapshot },
    PlayerJoined {
        user: Username,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        battle: Option<BattleSnapshot>,
    },
    PlayerReady {
        user: Username,
        ready: bool,
        room: RoomSnapshot,
    },
    PlayerLeft {
        user: Username,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        battle: Option<BattleSnapshot>,
    },

    // -- Quiz progression --
    GameStarted { quiz_id: u64 },
    NewQuestion {
        question_index: usize,
        question: QuestionView,
        timer_duration: u64,
    },
    /// 1 Hz countdown broadcast. `remaining` counts down to zero.
    Timer { remaining: u64 },
    /// The first answer of the round truncated everyone's timer.
    TimerReduced {
        new_duration: u64,
        triggered_by: Username,
    },
    PlayerAnswered {
        user: Username,
        question_index: usize,
        answered_count: usize,
        total_players: usize,
        time_used: u64,
    },
    RoundResult {
        question_index: usize,
        correct_answer: String,
        player_results: Vec<PlayerResult>,
        leaderboard: Vec<ScoreEntry>,
        review_duration: u64,
    },
    ReviewStart { duration: u64 },
    ReviewEnd,
    QuizFinished { final_leaderboard: Vec<ScoreEntry> },

    // -- Battle membership / lifecycle --
    BattleJoined { battle: BattleSnapshot },
    BattleStarted { battle: BattleSnapshot },
    ReadyUpdate {
        user: Username,
        ready: bool,
        battle: BattleSnapshot,
    },
    ChallengeLoaded { challenge: ChallengeView },

    // -- Battle play --
    CodeResult {
        output: String,
        error: Option<String>,
        time: f64,
        memory: u64,
    },
    /// Detailed judging outcome, sent to the submitter only.
    SubmissionResult {
        status: SubmissionStatus,
        passed: usize,
        total: usize,
        details: Vec<TestResult>,
    },
    OpponentRunningCode { user: Username },
    OpponentSubmission {
        user: Username,
        passed: usize,
        total: usize,
        scores: BTreeMap<Username, i64>,
    },
    /// First fully-correct solution (or ladder winner) for a challenge.
    QuestionWinner {
        user: Username,
        challenge_index: usize,
        scores: BTreeMap<Username, i64>,
    },
    NextChallenge { battle: BattleSnapshot },
    BattleUpdate { scores: BTreeMap<Username, i64> },
    BattleEnded { results: BattleResults },

    // -- Social relays --
    Typing { user: Username },
    StopTyping { user: Username },
    TabWarning { user: Username },

    // -- Errors --
    /// Any recoverable failure, delivered to the offending connection
    /// only. Never closes a working connection.
    Error { message: String },
}

impl ServerEvent {
    /// Shorthand for the error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BattleWinner, Difficulty, RankedScore, RoomStatus, RoundState};

    fn sample_room() -> RoomSnapshot {
        RoomSnapshot {
            code: crate::RoomCode::new("AB12CD"),
            name: "friday night".into(),
            host: Username::new("alice"),
            status: RoomStatus::Waiting,
            round_state: RoundState::Waiting,
            topic: "geography".into(),
            difficulty: Difficulty::Medium,
            num_questions: 3,
            max_players: 10,
            timer_duration: 45,
            current_question_index: 0,
            quiz: None,
            players: vec![],
        }
    }

    #[test]
    fn test_timer_event_json_shape() {
        let json = serde_json::to_value(&ServerEvent::Timer { remaining: 7 }).unwrap();
        assert_eq!(json["type"], "timer");
        assert_eq!(json["remaining"], 7);
    }

    #[test]
    fn test_timer_reduced_event_json_shape() {
        let event = ServerEvent::TimerReduced {
            new_duration: 7,
            triggered_by: Username::new("alice"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timer_reduced");
        assert_eq!(json["new_duration"], 7);
        assert_eq!(json["triggered_by"], "alice");
    }

    #[test]
    fn test_room_state_round_trip() {
        let event = ServerEvent::RoomState { room: sample_room() };
        let text = serde_json::to_string(&event).unwrap();
        let decoded: ServerEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_review_end_is_tag_only() {
        assert_eq!(
            serde_json::to_string(&ServerEvent::ReviewEnd).unwrap(),
            r#"{"type":"review_end"}"#
        );
    }

    #[test]
    fn test_round_result_json_shape() {
        let event = ServerEvent::RoundResult {
            question_index: 1,
            correct_answer: "B".into(),
            player_results: vec![PlayerResult {
                user: Username::new("bob"),
                selected: Some("B".into()),
                is_correct: true,
                answer_time: 5,
                score_gained: 189,
            }],
            leaderboard: vec![ScoreEntry {
                user: Username::new("bob"),
                score: 189,
            }],
            review_duration: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "round_result");
        assert_eq!(json["correct_answer"], "B");
        assert_eq!(json["player_results"][0]["score_gained"], 189);
        assert_eq!(json["review_duration"], 5);
    }

    #[test]
    fn test_battle_ended_tie_json_shape() {
        let event = ServerEvent::BattleEnded {
            results: BattleResults {
                winner: BattleWinner::Tie,
                scores: BTreeMap::from([
                    (Username::new("alice"), 50),
                    (Username::new("bob"), 50),
                ]),
                leaderboard: vec![
                    RankedScore {
                        rank: 1,
                        user: Username::new("alice"),
                        score: 50,
                    },
                    RankedScore {
                        rank: 2,
                        user: Username::new("bob"),
                        score: 50,
                    },
                ],
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "battle_ended");
        assert_eq!(json["results"]["winner"], "tie");
        assert_eq!(json["results"]["leaderboard"][0]["rank"], 1);
    }

    #[test]
    fn test_error_helper_builds_error_event() {
        let event = ServerEvent::error("Room not found");
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"error","message":"Room not found"}"#
        );
    }

    #[test]
    fn test_tab_warning_tag() {
        let json =
            serde_json::to_value(&ServerEvent::TabWarning { user: Username::new("x") }).unwrap();
        assert_eq!(json["type"], "tab_warning");
    }
}
