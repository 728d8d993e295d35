//! Inbound wire messages: everything a client may send.
//!
//! The wire format is one JSON object per WebSocket text frame, tagged by
//! a `type` field — `{"type": "submit_answer", "question_index": 2,
//! "answer": "B"}`. The tag names are the protocol contract; the serde
//! `snake_case` rename keeps the Rust variants in sync with them.

use serde::{Deserialize, Serialize};

use crate::{BattleCode, Difficulty, RoomCode};

/// A message from a client, decoded from a JSON text frame.
///
/// This is a closed set: the gateway dispatches with an exhaustive
/// `match`, so adding a message type is a compile-time visible change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // -- Connection-level --
    /// Presents an auth token. Until this succeeds, every mutating
    /// message is answered with an authentication-required error.
    Authenticate { token: String },

    // -- Quiz rooms --
    /// Joins a quiz room by its share code.
    JoinRoom { room_code: RoomCode },
    /// Flips the sender's ready flag.
    ToggleReady,
    /// Host-only: generates the quiz and starts the first round.
    StartGame,
    /// Leaves the room (full removal: roster, host-reassignment).
    LeaveRoom,
    /// Submits an answer for the current question. Stale indices are
    /// silently ignored.
    SubmitAnswer { question_index: usize, answer: String },
    /// Client-side countdown reached zero. The server timer stays
    /// authoritative; this only ends the round if it is still active.
    TimeUp,

    // -- Code battles --
    /// Creates a battle with randomly selected challenges at `level`.
    CreateBattle { num_questions: usize, level: Difficulty },
    /// Joins (or creates) a waiting battle containing this challenge.
    JoinBattle { challenge_id: u64 },
    /// Joins a waiting battle by its share code.
    JoinBattleByCode { battle_code: BattleCode },
    /// Sets the sender's own ready flag (battles use explicit values,
    /// not a toggle).
    SetReady { ready: bool },
    /// Leaves the battle and returns to the lobby.
    LeaveBattle,
    /// Requests challenge details (lobby-level, no battle required).
    LoadChallenge { challenge_id: u64 },
    /// Runs code against the challenge's sample input; result goes to
    /// the sender only.
    RunCode { code: String, language: String },
    /// Submits code for judging against the full test set. `is_timeout`
    /// marks a forced submission at the challenge deadline.
    SubmitCode {
        code: String,
        language: String,
        #[serde(default)]
        is_timeout: bool,
    },
    /// Host-only: starts the battle once both players are present.
    StartBattle,
    /// Ends the battle and computes final results.
    EndBattle,

    // -- Social relays --
    Typing,
    StopTyping,
    TabSwitchWarning,
}

impl ClientMessage {
    /// Every wire tag this protocol version recognizes.
    ///
    /// The gateway uses this to distinguish "unknown message type"
    /// (ignored, logged) from "known type with a malformed body"
    /// (error event to the sender).
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "authenticate",
        "join_room",
        "toggle_ready",
        "start_game",
        "leave_room",
        "submit_answer",
        "time_up",
        "create_battle",
        "join_battle",
        "join_battle_by_code",
        "set_ready",
        "leave_battle",
        "load_challenge",
        "run_code",
        "submit_code",
        "start_battle",
        "end_battle",
        "typing",
        "stop_typing",
        "tab_switch_warning",
    ];
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_answer_json_shape() {
        let json = r#"{"type":"submit_answer","question_index":2,"answer":"B"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubmitAnswer {
                question_index: 2,
                answer: "B".into()
            }
        );
    }

    #[test]
    fn test_unit_variants_need_only_the_tag() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"toggle_ready"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ToggleReady);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"time_up"}"#).unwrap();
        assert_eq!(msg, ClientMessage::TimeUp);
    }

    #[test]
    fn test_submit_code_is_timeout_defaults_false() {
        let json = r#"{"type":"submit_code","code":"print(1)","language":"python"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubmitCode {
                code: "print(1)".into(),
                language: "python".into(),
                is_timeout: false,
            }
        );
    }

    #[test]
    fn test_create_battle_parses_level() {
        let json = r#"{"type":"create_battle","num_questions":5,"level":"hard"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateBattle {
                num_questions: 5,
                level: Difficulty::Hard
            }
        );
    }

    #[test]
    fn test_every_variant_tag_is_in_known_types() {
        // One sample instance per variant. If a variant is added without
        // updating KNOWN_TYPES, this test fails.
        let samples: Vec<ClientMessage> = vec![
            ClientMessage::Authenticate { token: "t".into() },
            ClientMessage::JoinRoom {
                room_code: RoomCode::new("ABC123"),
            },
            ClientMessage::ToggleReady,
            ClientMessage::StartGame,
            ClientMessage::LeaveRoom,
            ClientMessage::SubmitAnswer {
                question_index: 0,
                answer: "A".into(),
            },
            ClientMessage::TimeUp,
            ClientMessage::CreateBattle {
                num_questions: 5,
                level: Difficulty::Medium,
            },
            ClientMessage::JoinBattle { challenge_id: 1 },
            ClientMessage::JoinBattleByCode {
                battle_code: BattleCode::new("XYZ789"),
            },
            ClientMessage::SetReady { ready: true },
            ClientMessage::LeaveBattle,
            ClientMessage::LoadChallenge { challenge_id: 1 },
            ClientMessage::RunCode {
                code: String::new(),
                language: "python".into(),
            },
            ClientMessage::SubmitCode {
                code: String::new(),
                language: "python".into(),
                is_timeout: false,
            },
            ClientMessage::StartBattle,
            ClientMessage::EndBattle,
            ClientMessage::Typing,
            ClientMessage::StopTyping,
            ClientMessage::TabSwitchWarning,
        ];

        for msg in samples {
            let value = serde_json::to_value(&msg).unwrap();
            let tag = value["type"].as_str().expect("tag must be a string");
            assert!(
                ClientMessage::KNOWN_TYPES.contains(&tag),
                "variant tag {tag:?} missing from KNOWN_TYPES"
            );
        }
    }

    #[test]
    fn test_unknown_type_fails_to_parse() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"fly_to_moon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"submit_answer","answer":"A"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tab_switch_warning_tag() {
        let json = serde_json::to_value(&ClientMessage::TabSwitchWarning).unwrap();
        assert_eq!(json["type"], "tab_switch_warning");
    }
}
