//! Quiz round progression: collection → scoring → broadcast → advance.
//!
//! One `MatchEngine` lives inside each quiz room actor and owns the
//! authoritative round state: the ticking countdown, the answered-set,
//! and the round identity. Because the actor is single-threaded, the
//! "first answer truncates the timer" check-and-set needs no lock — the
//! ordered command queue is the synchronization.
//!
//! Engine methods return the events to broadcast; the actor dispatches
//! them in order, so every connection observes the same sequence
//! (`timer_reduced` strictly before `round_result`, and so on).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use quizarena_protocol::{
    PlayerResult, Recipient, RoomSnapshot, RoomStatus, RoundState, ScoreEntry, ServerEvent,
    Username,
};
use quizarena_store::{NewQuiz, PlayerRecord, QuestionSource, RoomRecord, RoomStore};
use quizarena_timer::{Countdown, Delay};

use crate::RoomError;

/// Events addressed by the engine, dispatched by the actor.
pub type Outbox = Vec<(Recipient, ServerEvent)>;

/// Seconds of the post-round review pause.
pub const REVIEW_SECS: u64 = 5;

/// In-memory state of the current round. Reset at every question start.
#[derive(Debug, Default)]
struct RoundRuntime {
    question_index: usize,
    state: RoundState,
    /// When the round went active; `time_used` is measured from here.
    started: Option<Instant>,
    /// Players who have answered this round. The first insert triggers
    /// the timer truncation; reaching the connected count ends the round.
    answered: HashSet<Username>,
    /// Denominator of the speed bonus: the round's configured duration.
    effective_duration: u64,
}

/// Drives one question at a time under a single authoritative timer.
pub struct MatchEngine<S, Q> {
    store: Arc<S>,
    source: Arc<Q>,
    code: quizarena_protocol::RoomCode,
    pub(crate) countdown: Countdown,
    pub(crate) review: Delay<usize>,
    round: RoundRuntime,
}

impl<S: RoomStore, Q: QuestionSource> MatchEngine<S, Q> {
    pub fn new(code: quizarena_protocol::RoomCode, store: Arc<S>, source: Arc<Q>) -> Self {
        Self {
            store,
            source,
            code,
            countdown: Countdown::new(),
            review: Delay::new(),
            round: RoundRuntime::default(),
        }
    }

    /// Builds the full room snapshot from the store.
    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let room = self.store.room(&self.code).await?;
        let players = self.store.players(&self.code).await?;
        Ok(build_snapshot(&room, &players))
    }

    /// Flips the sender's ready flag and announces the new room state.
    pub async fn toggle_ready(&mut self, user: &Username) -> Result<Outbox, RoomError> {
        let mut player = self
            .store
            .player(&self.code, user)
            .await
            .map_err(|_| RoomError::NotInRoom(user.clone()))?;
        player.is_ready = !player.is_ready;
        self.store.update_player(&player).await?;

        tracing::debug!(room = %self.code, %user, ready = player.is_ready, "ready toggled");
        let snapshot = self.snapshot().await?;
        Ok(vec![(
            Recipient::All,
            ServerEvent::PlayerReady {
                user: user.clone(),
                ready: player.is_ready,
                room: snapshot,
            },
        )])
    }

    /// Host-only: generates the quiz, flips the room to active, and
    /// starts the first question.
    pub async fn start_game(&mut self, user: &Username) -> Result<Outbox, RoomError> {
        let mut room = self.store.room(&self.code).await?;
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::Conflict("game already started".into()));
        }
        let players = self.store.players(&self.code).await?;
        if !players.iter().any(|p| p.user == *user) {
            return Err(RoomError::NotInRoom(user.clone()));
        }
        if room.host != *user {
            return Err(RoomError::Forbidden(
                "only the host can start the game".into(),
            ));
        }
        if players.len() < 2 {
            return Err(RoomError::Conflict(
                "need at least 2 players to start".into(),
            ));
        }
        if !players.iter().all(|p| p.is_ready) {
            return Err(RoomError::Conflict(
                "all players must be ready to start".into(),
            ));
        }

        let questions = self
            .source
            .next_batch(&room.topic, room.difficulty, room.num_questions)
            .await?;
        if questions.len() < room.num_questions {
            return Err(RoomError::Conflict(format!(
                "not enough questions available: wanted {}, got {}",
                room.num_questions,
                questions.len()
            )));
        }

        let quiz = self
            .store
            .create_quiz(NewQuiz {
                title: format!("{} ({})", room.topic, room.difficulty),
                questions,
            })
            .await?;

        room.quiz = Some(quiz.id);
        room.status = RoomStatus::Active;
        room.started_at = Some(SystemTime::now());
        self.store.update_room(&room).await?;

        tracing::info!(room = %self.code, quiz = quiz.id, "game started");
        let mut out = vec![(Recipient::All, ServerEvent::GameStarted { quiz_id: quiz.id })];
        out.extend(self.start_question(0).await?);
        Ok(out)
    }

    /// Loads question `index`, resets answer slots, and starts the
    /// countdown. Broadcasts `new_question`.
    pub async fn start_question(&mut self, index: usize) -> Result<Outbox, RoomError> {
        let mut room = self.store.room(&self.code).await?;
        let quiz_id = room
            .quiz
            .ok_or_else(|| RoomError::Conflict("no quiz attached to this room".into()))?;
        let quiz = self.store.quiz(quiz_id).await?;
        let Some(question) = quiz.questions.get(index) else {
            return Ok(Vec::new());
        };

        for mut player in self.store.players(&self.code).await? {
            player.reset_answer();
            self.store.update_player(&player).await?;
        }

        room.current_question_index = index;
        room.round_state = RoundState::Active;
        room.round_started_at = Some(SystemTime::now());
        self.store.update_room(&room).await?;

        self.round = RoundRuntime {
            question_index: index,
            state: RoundState::Active,
            started: Some(Instant::now()),
            answered: HashSet::new(),
            effective_duration: room.timer_duration,
        };
        self.review.cancel();
        self.countdown.start(room.timer_duration);

        tracing::debug!(room = %self.code, index, "question started");
        Ok(vec![(
            Recipient::All,
            ServerEvent::NewQuestion {
                question_index: index,
                question: question.view(),
                timer_duration: room.timer_duration,
            },
        )])
    }

    /// One countdown tick: broadcast the remaining time; at zero, end
    /// the round if it is still active.
    pub async fn handle_tick(&mut self, remaining: u64) -> Result<Outbox, RoomError> {
        let mut out = vec![(Recipient::All, ServerEvent::Timer { remaining })];
        if remaining == 0 && self.round.state == RoundState::Active {
            out.extend(self.end_round().await?);
        }
        Ok(out)
    }

    /// Records an answer. Stale submissions (wrong index, inactive
    /// round, duplicate) are silently ignored — the client's view of the
    /// round may transiently lag the server's.
    pub async fn submit_answer(
        &mut self,
        user: &Username,
        question_index: usize,
        answer: String,
        connected: usize,
    ) -> Result<Outbox, RoomError> {
        if self.round.state != RoundState::Active
            || question_index != self.round.question_index
            || self.round.answered.contains(user)
        {
            return Ok(Vec::new());
        }

        let mut player = self
            .store
            .player(&self.code, user)
            .await
            .map_err(|_| RoomError::NotInRoom(user.clone()))?;

        let time_used = self
            .round
            .started
            .map(|s| s.elapsed().as_secs())
            .unwrap_or(0);

        player.current_answer = Some(answer);
        player.answer_time_used = time_used;
        player.answer_timestamp = Some(SystemTime::now());
        self.store.update_player(&player).await?;
        self.round.answered.insert(user.clone());

        let mut out = Vec::new();

        // First answer of the round: everyone's remaining window shrinks
        // to the time the fastest player needed.
        if self.round.answered.len() == 1 {
            let new_duration = time_used.max(1);
            self.countdown.truncate(new_duration);
            tracing::debug!(
                room = %self.code,
                %user,
                new_duration,
                "first answer truncated the round timer"
            );
            out.push((
                Recipient::All,
                ServerEvent::TimerReduced {
                    new_duration,
                    triggered_by: user.clone(),
                },
            ));
        }

        out.push((
            Recipient::All,
            ServerEvent::PlayerAnswered {
                user: user.clone(),
                question_index,
                answered_count: self.round.answered.len(),
                total_players: connected,
                time_used,
            },
        ));

        // All connected players answered: end immediately, bypassing
        // the timer.
        if connected > 0 && self.round.answered.len() >= connected {
            out.extend(self.end_round().await?);
        }

        Ok(out)
    }

    /// Client-side countdown hit zero. The server timer is
    /// authoritative, so this only ends a round that is still active.
    pub async fn time_up(&mut self) -> Result<Outbox, RoomError> {
        if self.round.state != RoundState::Active {
            return Ok(Vec::new());
        }
        self.end_round().await
    }

    /// The review pause elapsed. `token` is the round identity at
    /// scheduling time; a stale token means the match has already moved
    /// on and the wake-up is dropped.
    pub async fn handle_review_elapsed(&mut self, token: usize) -> Result<Outbox, RoomError> {
        if token != self.round.question_index
            || !matches!(self.round.state, RoundState::Review | RoundState::Complete)
        {
            return Ok(Vec::new());
        }
        let mut out = vec![(Recipient::All, ServerEvent::ReviewEnd)];
        out.extend(self.advance().await?);
        Ok(out)
    }

    /// Scores the round, broadcasts results, and schedules the review
    /// pause.
    async fn end_round(&mut self) -> Result<Outbox, RoomError> {
        self.countdown.cancel();

        let mut room = self.store.room(&self.code).await?;
        let quiz_id = room
            .quiz
            .ok_or_else(|| RoomError::Conflict("no quiz attached to this room".into()))?;
        let quiz = self.store.quiz(quiz_id).await?;
        let question = quiz
            .questions
            .get(self.round.question_index)
            .ok_or_else(|| RoomError::NotFound("question not found".into()))?;

        // A round nobody answered goes straight to `complete`; otherwise
        // it parks in `review` while clients display the answers.
        let next_state = if self.round.answered.is_empty() {
            RoundState::Complete
        } else {
            RoundState::Review
        };
        room.round_state = next_state;
        self.store.update_room(&room).await?;
        self.round.state = next_state;

        let mut players = self.store.players(&self.code).await?;
        let mut player_results = Vec::with_capacity(players.len());
        for player in &mut players {
            let selected = player.current_answer.clone();
            let is_correct = selected.as_deref() == Some(question.correct_answer.as_str());
            let mut gained = 0;
            if is_correct {
                gained = score_gained(player.answer_time_used, self.round.effective_duration);
                player.score += gained;
                self.store.update_player(player).await?;
            }
            player_results.push(PlayerResult {
                user: player.user.clone(),
                selected,
                is_correct,
                answer_time: player.answer_time_used,
                score_gained: gained,
            });
        }

        let leaderboard = leaderboard_of(&players);
        self.review.schedule(
            Duration::from_secs(REVIEW_SECS),
            self.round.question_index,
        );

        tracing::debug!(
            room = %self.code,
            index = self.round.question_index,
            answered = self.round.answered.len(),
            "round ended"
        );

        Ok(vec![
            (
                Recipient::All,
                ServerEvent::RoundResult {
                    question_index: self.round.question_index,
                    correct_answer: question.correct_answer.clone(),
                    player_results,
                    leaderboard,
                    review_duration: REVIEW_SECS,
                },
            ),
            (
                Recipient::All,
                ServerEvent::ReviewStart {
                    duration: REVIEW_SECS,
                },
            ),
        ])
    }

    /// Moves to the next question, or finishes the quiz.
    async fn advance(&mut self) -> Result<Outbox, RoomError> {
        let mut room = self.store.room(&self.code).await?;
        let quiz_id = room
            .quiz
            .ok_or_else(|| RoomError::Conflict("no quiz attached to this room".into()))?;
        let quiz = self.store.quiz(quiz_id).await?;

        let next = self.round.question_index + 1;
        if next < quiz.questions.len() {
            room.round_state = RoundState::Complete;
            room.current_question_index = next;
            self.store.update_room(&room).await?;
            self.round.state = RoundState::Complete;
            return self.start_question(next).await;
        }

        // Quiz finished.
        room.status = RoomStatus::Finished;
        room.round_state = RoundState::Complete;
        self.store.update_room(&room).await?;
        self.round.state = RoundState::Complete;

        let players = self.store.players(&self.code).await?;
        let final_leaderboard = leaderboard_of(&players);
        for player in &players {
            self.store
                .update_user_progress(&player.user, player.score)
                .await?;
            self.store.update_streak(&player.user).await?;
        }

        tracing::info!(room = %self.code, "quiz finished");
        Ok(vec![(
            Recipient::All,
            ServerEvent::QuizFinished { final_leaderboard },
        )])
    }
}

/// Score for a correct answer: 100 base plus a speed bonus scaled
/// linearly against the round's effective duration.
fn score_gained(time_used: u64, effective_duration: u64) -> i64 {
    let duration = effective_duration.max(1) as f64;
    let ratio = (time_used as f64 / duration).min(1.0);
    let bonus = (100.0 - (ratio * 100.0).round()).max(0.0) as i64;
    100 + bonus
}

/// Score-descending leaderboard; exact ties order alphabetically by
/// username so the ordering is deterministic.
fn leaderboard_of(players: &[PlayerRecord]) -> Vec<ScoreEntry> {
    let mut board: Vec<ScoreEntry> = players
        .iter()
        .map(|p| ScoreEntry {
            user: p.user.clone(),
            score: p.score,
        })
        .collect();
    board.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.user.cmp(&b.user)));
    board
}

/// Projects store records into the wire snapshot.
pub(crate) fn build_snapshot(room: &RoomRecord, players: &[PlayerRecord]) -> RoomSnapshot {
    RoomSnapshot {
        code: room.code.clone(),
        name: room.name.clone(),
        host: room.host.clone(),
        status: room.status,
        round_state: room.round_state,
        topic: room.topic.clone(),
        difficulty: room.difficulty,
        num_questions: room.num_questions,
        max_players: room.max_players,
        timer_duration: room.timer_duration,
        current_question_index: room.current_question_index,
        quiz: room.quiz,
        players: players
            .iter()
            .map(|p| quizarena_protocol::PlayerView {
                user: p.user.clone(),
                score: p.score,
                is_ready: p.is_ready,
                is_host: p.user == room.host,
            })
            .collect(),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, score: i64) -> PlayerRecord {
        PlayerRecord {
            user: Username::new(name),
            room: quizarena_protocol::RoomCode::new("AB12CD"),
            score,
            is_ready: false,
            current_answer: None,
            answer_time_used: 0,
            answer_timestamp: None,
            joined_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_score_gained_instant_answer_gets_full_bonus() {
        assert_eq!(score_gained(0, 20), 200);
    }

    #[test]
    fn test_score_gained_scales_linearly() {
        // 5s of a 20s window: ratio 0.25 → bonus 75.
        assert_eq!(score_gained(5, 20), 175);
        // 10s of 20s: bonus 50.
        assert_eq!(score_gained(10, 20), 150);
    }

    #[test]
    fn test_score_gained_at_or_past_deadline_is_base_only() {
        assert_eq!(score_gained(20, 20), 100);
        assert_eq!(score_gained(35, 20), 100, "ratio clamps at 1");
    }

    #[test]
    fn test_score_gained_zero_duration_does_not_divide_by_zero() {
        assert_eq!(score_gained(3, 0), 100);
    }

    #[test]
    fn test_leaderboard_sorts_by_score_descending() {
        let board = leaderboard_of(&[player("alice", 100), player("bob", 250)]);
        assert_eq!(board[0].user.as_str(), "bob");
        assert_eq!(board[1].user.as_str(), "alice");
    }

    #[test]
    fn test_leaderboard_breaks_ties_alphabetically() {
        let board = leaderboard_of(&[
            player("carol", 100),
            player("alice", 100),
            player("bob", 200),
        ]);
        let order: Vec<&str> = board.iter().map(|e| e.user.as_str()).collect();
        assert_eq!(order, vec!["bob", "alice", "carol"]);
    }

    #[test]
    fn test_build_snapshot_marks_host() {
        let room = RoomRecord {
            code: quizarena_protocol::RoomCode::new("AB12CD"),
            name: "room".into(),
            host: Username::new("alice"),
            topic: "t".into(),
            difficulty: quizarena_protocol::Difficulty::Easy,
            num_questions: 1,
            max_players: 4,
            status: RoomStatus::Waiting,
            round_state: RoundState::Waiting,
            timer_duration: 30,
            current_question_index: 0,
            quiz: None,
            created_at: SystemTime::now(),
            started_at: None,
            round_started_at: None,
        };
        let snapshot = build_snapshot(&room, &[player("alice", 0), player("bob", 0)]);
        assert!(snapshot.players[0].is_host);
        assert!(!snapshot.players[1].is_host);
    }
}
