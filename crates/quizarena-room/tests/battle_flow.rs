//! End-to-end code battle flows through the registry and battle actors.
//!
//! The simulated judge passes a test when the submitted code contains
//! the expected output literal, which is enough to steer accepted /
//! wrong_answer / time_limit outcomes deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use quizarena_judge::SimJudge;
use quizarena_protocol::{
    BattleStatus, BattleWinner, ClientMessage, Difficulty, ServerEvent, SubmissionStatus,
    TestCase, Username,
};
use quizarena_room::{BattleHandle, RoomRegistry};
use quizarena_store::{ChallengeRecord, FixedSource, MemoryStore, RoomStore};
use quizarena_transport::ConnectionId;

type Registry = RoomRegistry<MemoryStore, FixedSource, SimJudge>;

const EVENT_WAIT: Duration = Duration::from_secs(600);

fn challenge(id: u64, difficulty: Difficulty, expected: &str) -> ChallengeRecord {
    ChallengeRecord {
        id,
        title: format!("challenge {id}"),
        description: "print the answer".into(),
        problem_statement: "read nothing, print the answer".into(),
        sample_io: Some(format!("Input: none Output: {expected}")),
        difficulty,
        time_limit: 300,
        memory_limit: 256,
        test_cases: vec![TestCase {
            input: String::new(),
            output: expected.into(),
        }],
    }
}

async fn setup(challenges: &[(u64, &str)]) -> (MemoryStore, Arc<Registry>) {
    let store = MemoryStore::new();
    for (id, expected) in challenges {
        store
            .add_challenge(challenge(*id, Difficulty::Hard, expected))
            .await;
    }
    let registry = Arc::new(RoomRegistry::new(
        Arc::new(store.clone()),
        Arc::new(FixedSource::default()),
        Arc::new(SimJudge),
    ));
    (store, registry)
}

fn conn(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

fn user(name: &str) -> Username {
    Username::new(name)
}

async fn wait_for(
    rx: &mut mpsc::Receiver<ServerEvent>,
    mut pred: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

/// Creates a 2-challenge hard battle, joins both players, and starts it.
async fn started_battle(
    registry: &Registry,
) -> (
    BattleHandle,
    quizarena_protocol::BattleCode,
    mpsc::Receiver<ServerEvent>,
    mpsc::Receiver<ServerEvent>,
) {
    let (alice_tx, mut alice_rx) = mpsc::channel(256);
    let (bob_tx, mut bob_rx) = mpsc::channel(256);

    let (handle, snapshot) = registry
        .create_battle(conn(1), user("alice"), alice_tx, 2, Difficulty::Hard)
        .await
        .unwrap();
    let code = snapshot.battle_code.clone();

    registry
        .join_battle_by_code(&code, conn(2), user("bob"), bob_tx)
        .await
        .unwrap();
    wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::PlayerJoined { .. })).await;

    handle
        .send_message(conn(1), user("alice"), ClientMessage::StartBattle)
        .await
        .unwrap();
    wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::BattleStarted { .. })).await;
    wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::BattleStarted { .. })).await;

    (handle, code, alice_rx, bob_rx)
}

fn submit(code_text: &str) -> ClientMessage {
    ClientMessage::SubmitCode {
        code: code_text.into(),
        language: "python".into(),
        is_timeout: false,
    }
}

// =========================================================================
// Creation and joining
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_battle_with_insufficient_challenges_is_rejected() {
    let (_store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (tx, _rx) = mpsc::channel(256);
    let result = registry
        .create_battle(conn(1), user("alice"), tx, 5, Difficulty::Hard)
        .await;
    assert!(result.is_err(), "5 questions from a pool of 2 must fail, not under-fill");
}

#[tokio::test(start_paused = true)]
async fn test_create_battle_rejects_out_of_range_question_count() {
    let (_store, registry) = setup(&[(1, "42")]).await;
    let (tx, _rx) = mpsc::channel(256);
    assert!(
        registry
            .create_battle(conn(1), user("alice"), tx.clone(), 0, Difficulty::Hard)
            .await
            .is_err()
    );
    assert!(
        registry
            .create_battle(conn(1), user("alice"), tx, 11, Difficulty::Hard)
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_battle_selects_distinct_challenges() {
    let (_store, registry) = setup(&[(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")]).await;
    let (tx, _rx) = mpsc::channel(256);
    let (_, snapshot) = registry
        .create_battle(conn(1), user("alice"), tx, 5, Difficulty::Hard)
        .await
        .unwrap();
    let mut ids: Vec<u64> = snapshot.challenges.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert!(snapshot.challenges.iter().all(|c| c.difficulty == Difficulty::Hard));
}

#[tokio::test(start_paused = true)]
async fn test_third_player_cannot_join_a_full_battle() {
    let (_store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (alice_tx, _a) = mpsc::channel(256);
    let (bob_tx, _b) = mpsc::channel(256);
    let (carol_tx, _c) = mpsc::channel(256);

    let (_, snapshot) = registry
        .create_battle(conn(1), user("alice"), alice_tx, 2, Difficulty::Hard)
        .await
        .unwrap();
    registry
        .join_battle_by_code(&snapshot.battle_code, conn(2), user("bob"), bob_tx)
        .await
        .unwrap();

    let result = registry
        .join_battle_by_code(&snapshot.battle_code, conn(3), user("carol"), carol_tx)
        .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_join_battle_matches_open_battle_for_challenge() {
    let (_store, registry) = setup(&[(1, "42")]).await;
    let (alice_tx, _a) = mpsc::channel(256);
    let (bob_tx, _b) = mpsc::channel(256);

    // Alice creates a single-challenge battle via matchmaking.
    let (_, alice_battle) = registry
        .join_battle(conn(1), user("alice"), alice_tx, 1)
        .await
        .unwrap();
    assert_eq!(alice_battle.player2, None);

    // Bob's matchmaking lands in the same battle.
    let (_, bob_battle) = registry
        .join_battle(conn(2), user("bob"), bob_tx, 1)
        .await
        .unwrap();
    assert_eq!(bob_battle.battle_code, alice_battle.battle_code);
    assert_eq!(bob_battle.player2, Some(user("bob")));
}

#[tokio::test(start_paused = true)]
async fn test_start_battle_requires_host_and_opponent() {
    let (_store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (alice_tx, mut alice_rx) = mpsc::channel(256);
    let (handle, snapshot) = registry
        .create_battle(conn(1), user("alice"), alice_tx, 2, Difficulty::Hard)
        .await
        .unwrap();

    // No opponent yet.
    handle
        .send_message(conn(1), user("alice"), ClientMessage::StartBattle)
        .await
        .unwrap();
    let event = wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::Error { .. })).await;
    match event {
        ServerEvent::Error { message } => assert!(message.contains("opponent")),
        _ => unreachable!(),
    }

    // Bob joins, then tries to start: only the host may.
    let (bob_tx, mut bob_rx) = mpsc::channel(256);
    registry
        .join_battle_by_code(&snapshot.battle_code, conn(2), user("bob"), bob_tx)
        .await
        .unwrap();
    handle
        .send_message(conn(2), user("bob"), ClientMessage::StartBattle)
        .await
        .unwrap();
    let event = wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::Error { .. })).await;
    match event {
        ServerEvent::Error { message } => assert!(message.contains("host")),
        _ => unreachable!(),
    }
}

// =========================================================================
// Submissions, first-solver, progression
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_accepted_submission_wins_question_and_schedules_advance() {
    let (store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, code, mut alice_rx, mut bob_rx) = started_battle(&registry).await;

    let first_expected = {
        let battle = store.battle(&code).await.unwrap();
        let c = store.challenge(battle.challenges[0]).await.unwrap();
        c.test_cases[0].output.clone()
    };

    handle
        .send_message(conn(1), user("alice"), submit(&format!("print({first_expected})")))
        .await
        .unwrap();

    // Submitter gets the detailed result.
    let event = wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::SubmissionResult { .. })
    })
    .await;
    match event {
        ServerEvent::SubmissionResult { status, passed, total, .. } => {
            assert_eq!(status, SubmissionStatus::Accepted);
            assert_eq!((passed, total), (1, 1));
        }
        _ => unreachable!(),
    }

    // Opponent sees the summary, then the first-solver announcement.
    wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::OpponentSubmission { .. })).await;
    let event = wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::QuestionWinner { .. })).await;
    match event {
        ServerEvent::QuestionWinner { user: winner, challenge_index, .. } => {
            assert_eq!(winner.as_str(), "alice");
            assert_eq!(challenge_index, 0);
        }
        _ => unreachable!(),
    }

    // The ledger records the winner exactly once.
    let battle = store.battle(&code).await.unwrap();
    assert_eq!(battle.question_winners.get(&0), Some(&user("alice")));

    // After the 5s grace (paused clock auto-advances), the battle moves
    // to the next challenge.
    let event = wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::NextChallenge { .. })).await;
    match event {
        ServerEvent::NextChallenge { battle } => {
            assert_eq!(battle.current_challenge_index, 1);
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_question_winner_is_set_at_most_once_under_racing_submits() {
    let (store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, code, mut alice_rx, mut bob_rx) = started_battle(&registry).await;

    let expected = {
        let battle = store.battle(&code).await.unwrap();
        let c = store.challenge(battle.challenges[0]).await.unwrap();
        c.test_cases[0].output.clone()
    };
    let winning_code = format!("print({expected})");

    // Both submissions enqueue back-to-back; the actor serializes them.
    handle
        .send_message(conn(1), user("alice"), submit(&winning_code))
        .await
        .unwrap();
    handle
        .send_message(conn(2), user("bob"), submit(&winning_code))
        .await
        .unwrap();

    // Exactly one question_winner for index 0, and it is the first
    // submission processed.
    let mut winners = Vec::new();
    loop {
        let event = tokio::time::timeout(EVENT_WAIT, alice_rx.recv())
            .await
            .expect("events stalled")
            .expect("channel closed");
        match event {
            ServerEvent::QuestionWinner { user: w, challenge_index, .. } => {
                winners.push((w, challenge_index));
            }
            // Both terminal → battle advances immediately.
            ServerEvent::NextChallenge { .. } => break,
            _ => continue,
        }
    }
    assert_eq!(winners.len(), 1, "question_winner must fire exactly once");
    assert_eq!(winners[0].0.as_str(), "alice");
    assert_eq!(winners[0].1, 0);

    let battle = store.battle(&code).await.unwrap();
    assert_eq!(battle.question_winners.get(&0), Some(&user("alice")));
    assert_eq!(battle.current_challenge_index, 1);

    // Bob observed the same single winner.
    wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::NextChallenge { .. })).await;
}

#[tokio::test(start_paused = true)]
async fn test_both_timeouts_advance_without_grace_and_ladder_decides() {
    let (store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, code, mut alice_rx, _bob_rx) = started_battle(&registry).await;

    // Neither solution passes; both are forced timeouts (terminal).
    let timeout_submit = |code_text: &str| ClientMessage::SubmitCode {
        code: code_text.into(),
        language: "python".into(),
        is_timeout: true,
    };
    handle
        .send_message(conn(1), user("alice"), timeout_submit("pass"))
        .await
        .unwrap();
    handle
        .send_message(conn(2), user("bob"), timeout_submit("pass"))
        .await
        .unwrap();

    // All players terminal: the ladder picks a round winner and the
    // battle advances immediately (no 5-second wait is observable here
    // because virtual time only moves when a timer is pending).
    let event = wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::QuestionWinner { .. })).await;
    match event {
        // Equal pass counts, runtimes, and (on the paused clock)
        // submission instants: the final alphabetical rung picks alice.
        ServerEvent::QuestionWinner { user: w, .. } => assert_eq!(w.as_str(), "alice"),
        _ => unreachable!(),
    }
    wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::NextChallenge { .. })).await;

    let battle = store.battle(&code).await.unwrap();
    assert_eq!(battle.current_challenge_index, 1);
    let subs = store.submissions_of(&user("alice"), battle.challenges[0]).await;
    assert_eq!(subs[0].status, SubmissionStatus::TimeLimit);
}

#[tokio::test(start_paused = true)]
async fn test_full_battle_completes_with_winner_and_bookkeeping() {
    let (store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, code, mut alice_rx, mut bob_rx) = started_battle(&registry).await;

    // Alice solves both challenges; bob times out on both.
    for _ in 0..2 {
        let expected = {
            let battle = store.battle(&code).await.unwrap();
            let c = store
                .challenge(battle.challenges[battle.current_challenge_index])
                .await
                .unwrap();
            c.test_cases[0].output.clone()
        };
        handle
            .send_message(conn(1), user("alice"), submit(&format!("print({expected})")))
            .await
            .unwrap();
        handle
            .send_message(
                conn(2),
                user("bob"),
                ClientMessage::SubmitCode {
                    code: "pass".into(),
                    language: "python".into(),
                    is_timeout: true,
                },
            )
            .await
            .unwrap();
        wait_for(&mut alice_rx, |e| {
            matches!(
                e,
                ServerEvent::NextChallenge { .. } | ServerEvent::BattleEnded { .. }
            )
        })
        .await;
    }

    let event = wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::BattleEnded { .. })).await;
    match event {
        ServerEvent::BattleEnded { results } => {
            assert_eq!(results.winner, BattleWinner::Player(user("alice")));
            assert!(results.scores[&user("alice")] > results.scores[&user("bob")]);
            assert_eq!(results.leaderboard[0].rank, 1);
            assert_eq!(results.leaderboard[0].user.as_str(), "alice");
        }
        _ => unreachable!(),
    }

    let battle = store.battle(&code).await.unwrap();
    assert_eq!(battle.status, BattleStatus::Completed);
    assert_eq!(battle.winner, Some(BattleWinner::Player(user("alice"))));

    // Progress hooks ran exactly once per player.
    assert_eq!(store.progress_of(&user("alice")).await.unwrap().completions, 1);
    assert_eq!(store.progress_of(&user("bob")).await.unwrap().completions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_battle_with_equal_scores_is_a_tie() {
    let (store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, code, mut alice_rx, _bob_rx) = started_battle(&registry).await;

    handle
        .send_message(conn(1), user("alice"), ClientMessage::EndBattle)
        .await
        .unwrap();
    let event = wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::BattleEnded { .. })).await;
    match event {
        ServerEvent::BattleEnded { results } => {
            assert_eq!(results.winner, BattleWinner::Tie);
        }
        _ => unreachable!(),
    }
    let battle = store.battle(&code).await.unwrap();
    assert_eq!(battle.status, BattleStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_run_code_replies_to_sender_and_signals_opponent() {
    let (_store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, _code, mut alice_rx, mut bob_rx) = started_battle(&registry).await;

    handle
        .send_message(
            conn(1),
            user("alice"),
            ClientMessage::RunCode {
                code: "print(42)".into(),
                language: "python".into(),
            },
        )
        .await
        .unwrap();

    wait_for(&mut bob_rx, |e| {
        matches!(e, ServerEvent::OpponentRunningCode { user } if user.as_str() == "alice")
    })
    .await;
    wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::CodeResult { .. })).await;
}

#[tokio::test(start_paused = true)]
async fn test_typing_relays_reach_the_room() {
    let (_store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (handle, _code, _alice_rx, mut bob_rx) = started_battle(&registry).await;

    handle
        .send_message(conn(1), user("alice"), ClientMessage::Typing)
        .await
        .unwrap();
    wait_for(&mut bob_rx, |e| {
        matches!(e, ServerEvent::Typing { user } if user.as_str() == "alice")
    })
    .await;

    handle
        .send_message(conn(1), user("alice"), ClientMessage::TabSwitchWarning)
        .await
        .unwrap();
    wait_for(&mut bob_rx, |e| {
        matches!(e, ServerEvent::TabWarning { user } if user.as_str() == "alice")
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_set_ready_updates_own_flag_only() {
    let (store, registry) = setup(&[(1, "42"), (2, "7")]).await;
    let (alice_tx, _a) = mpsc::channel(256);
    let (bob_tx, mut bob_rx) = mpsc::channel(256);

    let (handle, snapshot) = registry
        .create_battle(conn(1), user("alice"), alice_tx, 2, Difficulty::Hard)
        .await
        .unwrap();
    registry
        .join_battle_by_code(&snapshot.battle_code, conn(2), user("bob"), bob_tx)
        .await
        .unwrap();

    handle
        .send_message(conn(2), user("bob"), ClientMessage::SetReady { ready: true })
        .await
        .unwrap();
    let event = wait_for(&mut bob_rx, |e| matches!(e, ServerEvent::ReadyUpdate { .. })).await;
    match event {
        ServerEvent::ReadyUpdate { user: who, ready, battle } => {
            assert_eq!(who.as_str(), "bob");
            assert!(ready);
            assert!(battle.player2_ready);
            assert!(!battle.player1_ready);
        }
        _ => unreachable!(),
    }

    let battle = store.battle(&snapshot.battle_code).await.unwrap();
    assert!(battle.player2_ready && !battle.player1_ready);
}
