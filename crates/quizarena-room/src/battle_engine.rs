//! Code-battle progression: judging, scoring, first-solver bonus, and
//! the tie-break ladder.
//!
//! One `BattleEngine` lives inside each battle actor. The
//! `question_winners` ledger is set-once per challenge index; because
//! only the battle's own actor runs this code, the check-then-set cannot
//! race even under near-simultaneous submissions from both players.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use quizarena_judge::{JudgeClient, JudgeReport};
use quizarena_protocol::{
    BattleResults, BattleSnapshot, BattleStatus, BattleWinner, RankedScore, Recipient,
    ServerEvent, SubmissionStatus, Username,
};
use quizarena_store::{BattleRecord, RoomStore, SubmissionRecord};
use quizarena_timer::Delay;

use crate::match_engine::Outbox;
use crate::RoomError;

/// Seconds of the first-solver grace period before auto-advancing.
pub const GRACE_SECS: u64 = 5;

/// Runtimes closer than this are considered equal by the ladder.
const RUNTIME_EPSILON: f64 = 0.001;

/// What the engine remembers about a player's submission for the
/// current challenge. Feeds the tie-break ladder and dies on advance.
#[derive(Debug, Clone)]
pub(crate) struct SubmissionSummary {
    pub user: Username,
    pub passed: usize,
    /// Total runtime across the test set, seconds.
    pub runtime: f64,
    pub submitted_at: Instant,
}

/// Drives one battle through its challenges.
pub struct BattleEngine<S, J> {
    store: Arc<S>,
    judge: Arc<J>,
    code: quizarena_protocol::BattleCode,
    pub(crate) grace: Delay<usize>,
    /// Current-challenge submissions, keyed by player.
    submissions: HashMap<Username, SubmissionSummary>,
}

impl<S: RoomStore, J: JudgeClient> BattleEngine<S, J> {
    pub fn new(code: quizarena_protocol::BattleCode, store: Arc<S>, judge: Arc<J>) -> Self {
        Self {
            store,
            judge,
            code,
            grace: Delay::new(),
            submissions: HashMap::new(),
        }
    }

    /// Builds the full battle snapshot from the store.
    pub async fn snapshot(&self) -> Result<BattleSnapshot, RoomError> {
        let battle = self.store.battle(&self.code).await?;
        self.snapshot_of(&battle).await
    }

    async fn snapshot_of(&self, battle: &BattleRecord) -> Result<BattleSnapshot, RoomError> {
        let mut challenges = Vec::with_capacity(battle.challenges.len());
        for id in &battle.challenges {
            challenges.push(self.store.challenge(*id).await?.view());
        }
        let current_challenge = challenges.get(battle.current_challenge_index).cloned();
        Ok(BattleSnapshot {
            battle_code: battle.code.clone(),
            player1: battle.player1.clone(),
            player2: battle.player2.clone(),
            player1_ready: battle.player1_ready,
            player2_ready: battle.player2_ready,
            status: battle.status,
            level: battle.level,
            num_questions: battle.num_questions,
            current_challenge_index: battle.current_challenge_index,
            current_challenge,
            challenges,
            scores: battle.scores.clone(),
        })
    }

    /// Fills the second player slot, or re-admits an existing player.
    /// Returns the snapshot and whether the roster changed.
    pub async fn add_player(
        &mut self,
        user: &Username,
    ) -> Result<(BattleSnapshot, bool), RoomError> {
        let mut battle = self.store.battle(&self.code).await?;
        if battle.has_player(user) {
            return Ok((self.snapshot_of(&battle).await?, false));
        }
        if battle.status != BattleStatus::Waiting {
            return Err(RoomError::Conflict("battle has already started".into()));
        }
        if battle.player2.is_some() {
            return Err(RoomError::Conflict(
                "Could not join battle. Battle may be full or not exist.".into(),
            ));
        }
        battle.player2 = Some(user.clone());
        self.store.update_battle(&battle).await?;
        tracing::info!(battle = %self.code, %user, "second player joined");
        Ok((self.snapshot_of(&battle).await?, true))
    }

    /// Sets the sender's own ready flag.
    pub async fn set_ready(&mut self, user: &Username, ready: bool) -> Result<Outbox, RoomError> {
        let mut battle = self.store.battle(&self.code).await?;
        if battle.player1 == *user {
            battle.player1_ready = ready;
        } else if battle.player2.as_ref() == Some(user) {
            battle.player2_ready = ready;
        } else {
            return Err(RoomError::Forbidden(
                "not a player in this battle".into(),
            ));
        }
        self.store.update_battle(&battle).await?;
        let snapshot = self.snapshot_of(&battle).await?;
        Ok(vec![(
            Recipient::All,
            ServerEvent::ReadyUpdate {
                user: user.clone(),
                ready,
                battle: snapshot,
            },
        )])
    }

    /// Host-only start, once both players are present.
    pub async fn start_battle(&mut self, user: &Username) -> Result<Outbox, RoomError> {
        let mut battle = self.store.battle(&self.code).await?;
        if battle.player1 != *user {
            return Err(RoomError::Forbidden(
                "Only the host can start the battle".into(),
            ));
        }
        if battle.status != BattleStatus::Waiting {
            return Err(RoomError::Conflict("battle has already started".into()));
        }
        if battle.player2.is_none() {
            return Err(RoomError::Conflict("waiting for an opponent".into()));
        }

        battle.status = BattleStatus::InProgress;
        battle.started_at = Some(SystemTime::now());
        self.store.update_battle(&battle).await?;
        self.submissions.clear();
        self.grace.cancel();

        tracing::info!(battle = %self.code, "battle started");
        let snapshot = self.snapshot_of(&battle).await?;
        Ok(vec![(
            Recipient::All,
            ServerEvent::BattleStarted { battle: snapshot },
        )])
    }

    /// Runs code against the challenge's sample input. The result goes
    /// to the sender only; the opponent just sees activity.
    pub async fn run_code(
        &mut self,
        user: &Username,
        code: String,
        language: String,
    ) -> Result<Outbox, RoomError> {
        let battle = self.store.battle(&self.code).await?;
        if !battle.has_player(user) {
            return Err(RoomError::Forbidden("not a player in this battle".into()));
        }
        let challenge_id = *battle
            .challenges
            .get(battle.current_challenge_index)
            .ok_or_else(|| {
                RoomError::Conflict(
                    "All challenges have been completed. Battle is ending.".into(),
                )
            })?;
        let challenge = self.store.challenge(challenge_id).await?;
        let stdin = challenge
            .sample_io
            .as_deref()
            .map(extract_sample_input)
            .unwrap_or_default();

        let mut out = vec![(
            Recipient::AllExcept(user.clone()),
            ServerEvent::OpponentRunningCode { user: user.clone() },
        )];

        match self.judge.run(&code, &language, &stdin).await {
            Ok(result) => out.push((
                Recipient::Player(user.clone()),
                ServerEvent::CodeResult {
                    output: result.output,
                    error: result.error,
                    time: result.time,
                    memory: result.memory,
                },
            )),
            Err(e) => {
                tracing::warn!(battle = %self.code, error = %e, "run_code failed");
                out.push((
                    Recipient::Player(user.clone()),
                    ServerEvent::error(format!("code execution unavailable: {e}")),
                ));
            }
        }
        Ok(out)
    }

    /// Judges a submission, persists it, scores it, and handles the
    /// first-solver / all-finished progression rules.
    pub async fn submit_code(
        &mut self,
        user: &Username,
        code: String,
        language: String,
        is_timeout: bool,
    ) -> Result<Outbox, RoomError> {
        let mut battle = self.store.battle(&self.code).await?;
        if !battle.has_player(user) {
            return Err(RoomError::Forbidden("not a player in this battle".into()));
        }
        if battle.status != BattleStatus::InProgress {
            return Err(RoomError::Conflict("battle is not in progress".into()));
        }
        let idx = battle.current_challenge_index;
        let challenge_id = *battle.challenges.get(idx).ok_or_else(|| {
            RoomError::Conflict("All challenges have been completed. Battle is ending.".into())
        })?;
        let challenge = self.store.challenge(challenge_id).await?;

        let report = self
            .judge
            .run_test_cases(&code, &language, &challenge.test_cases)
            .await
            .map_err(|e| RoomError::Upstream(e.to_string()))?;
        let status = derive_status(&report, is_timeout);

        self.store
            .record_submission(SubmissionRecord {
                user: user.clone(),
                challenge_id,
                code,
                language,
                status,
                test_results: report.details.clone(),
                submitted_at: SystemTime::now(),
            })
            .await?;

        // Score: 10 per passing test, plus a speed bonus only for a
        // fully-correct solution.
        let mut score = report.passed as i64 * 10;
        if status == SubmissionStatus::Accepted {
            score += (10.0 - (report.avg_time() * 100.0).floor()).max(0.0) as i64;
        }
        *battle.scores.entry(user.clone()).or_insert(0) += score;
        self.store.update_battle(&battle).await?;

        self.submissions.insert(
            user.clone(),
            SubmissionSummary {
                user: user.clone(),
                passed: report.passed,
                runtime: report.total_time(),
                submitted_at: Instant::now(),
            },
        );

        tracing::info!(
            battle = %self.code,
            %user,
            ?status,
            passed = report.passed,
            total = report.total,
            score,
            "submission judged"
        );

        let mut out: Outbox = vec![
            (
                Recipient::Player(user.clone()),
                ServerEvent::SubmissionResult {
                    status,
                    passed: report.passed,
                    total: report.total,
                    details: report.details,
                },
            ),
            (
                Recipient::AllExcept(user.clone()),
                ServerEvent::OpponentSubmission {
                    user: user.clone(),
                    passed: report.passed,
                    total: report.total,
                    scores: battle.scores.clone(),
                },
            ),
            (
                Recipient::All,
                ServerEvent::BattleUpdate {
                    scores: battle.scores.clone(),
                },
            ),
        ];

        if status == SubmissionStatus::Accepted && !battle.question_winners.contains_key(&idx) {
            // First fully-correct solution: record it (set-once) and
            // give the loser a grace window before moving on.
            battle.question_winners.insert(idx, user.clone());
            self.store.update_battle(&battle).await?;
            out.push((
                Recipient::All,
                ServerEvent::QuestionWinner {
                    user: user.clone(),
                    challenge_index: idx,
                    scores: battle.scores.clone(),
                },
            ));
            self.grace.schedule(Duration::from_secs(GRACE_SECS), idx);
        }

        // Once every player holds a terminal submission, the round is
        // over regardless of the grace period.
        if self.all_players_finished(&battle, challenge_id).await? {
            if !battle.question_winners.contains_key(&idx) {
                // Nobody reached accepted first; the ladder decides.
                if let Some(winner) = ladder_winner(self.submissions.values()) {
                    let winner_user = winner.user.clone();
                    battle.question_winners.insert(idx, winner_user.clone());
                    self.store.update_battle(&battle).await?;
                    out.push((
                        Recipient::All,
                        ServerEvent::QuestionWinner {
                            user: winner_user,
                            challenge_index: idx,
                            scores: battle.scores.clone(),
                        },
                    ));
                }
            }
            out.extend(self.advance().await?);
        }

        Ok(out)
    }

    /// The first-solver grace elapsed. `token` is the challenge index at
    /// scheduling time; if the battle has already advanced (both players
    /// finished early), the wake-up is stale and dropped.
    pub async fn handle_grace_elapsed(&mut self, token: usize) -> Result<Outbox, RoomError> {
        let battle = self.store.battle(&self.code).await?;
        if battle.status != BattleStatus::InProgress || battle.current_challenge_index != token
        {
            return Ok(Vec::new());
        }
        self.advance().await
    }

    /// Player-initiated end: compute results now.
    pub async fn end_battle(&mut self, user: &Username) -> Result<Outbox, RoomError> {
        let battle = self.store.battle(&self.code).await?;
        if !battle.has_player(user) {
            return Err(RoomError::Forbidden("not a player in this battle".into()));
        }
        self.finish().await
    }

    /// Moves to the next challenge, or completes the battle.
    async fn advance(&mut self) -> Result<Outbox, RoomError> {
        self.grace.cancel();
        self.submissions.clear();

        let mut battle = self.store.battle(&self.code).await?;
        battle.current_challenge_index += 1;
        self.store.update_battle(&battle).await?;

        if battle.current_challenge_index < battle.challenges.len() {
            tracing::debug!(
                battle = %self.code,
                index = battle.current_challenge_index,
                "advancing to next challenge"
            );
            let snapshot = self.snapshot_of(&battle).await?;
            Ok(vec![(
                Recipient::All,
                ServerEvent::NextChallenge { battle: snapshot },
            )])
        } else {
            self.finish().await
        }
    }

    /// Completes the battle: winner by cumulative score ('tie' on equal
    /// scores), progress/streak bookkeeping exactly once per player.
    /// Idempotent — a second completion is a no-op.
    async fn finish(&mut self) -> Result<Outbox, RoomError> {
        let mut battle = self.store.battle(&self.code).await?;
        if battle.status == BattleStatus::Completed {
            return Ok(Vec::new());
        }

        let p1_score = battle.scores.get(&battle.player1).copied().unwrap_or(0);
        let p2_score = battle
            .player2
            .as_ref()
            .and_then(|p| battle.scores.get(p))
            .copied()
            .unwrap_or(0);

        let winner = if p1_score > p2_score {
            BattleWinner::Player(battle.player1.clone())
        } else if p2_score > p1_score {
            match &battle.player2 {
                Some(p2) => BattleWinner::Player(p2.clone()),
                None => BattleWinner::Tie,
            }
        } else {
            BattleWinner::Tie
        };

        battle.status = BattleStatus::Completed;
        battle.completed_at = Some(SystemTime::now());
        battle.winner = Some(winner.clone());
        self.store.update_battle(&battle).await?;
        self.grace.cancel();

        for player in battle.players() {
            let score = battle.scores.get(&player).copied().unwrap_or(0);
            self.store.update_user_progress(&player, score).await?;
            self.store.update_streak(&player).await?;
        }

        tracing::info!(battle = %self.code, winner = ?winner, "battle ended");
        Ok(vec![(
            Recipient::All,
            ServerEvent::BattleEnded {
                results: BattleResults {
                    winner,
                    leaderboard: ranked_leaderboard(&battle.scores),
                    scores: battle.scores.clone(),
                },
            },
        )])
    }

    async fn all_players_finished(
        &self,
        battle: &BattleRecord,
        challenge_id: u64,
    ) -> Result<bool, RoomError> {
        for player in battle.players() {
            if !self
                .store
                .has_terminal_submission(&player, challenge_id)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Derives the submission status from the judge report, by priority:
/// all-pass → accepted; any compilation error → compilation_error; any
/// timeout → time_limit; else wrong_answer. A client timeout flag forces
/// time_limit unless the code passed anyway.
pub(crate) fn derive_status(report: &JudgeReport, is_timeout: bool) -> SubmissionStatus {
    let status = if report.passed == report.total {
        SubmissionStatus::Accepted
    } else if any_error_prefix(report, "Compilation error") {
        SubmissionStatus::CompilationError
    } else if any_error_prefix(report, "Time limit") {
        SubmissionStatus::TimeLimit
    } else {
        SubmissionStatus::WrongAnswer
    };
    if is_timeout && status != SubmissionStatus::Accepted {
        SubmissionStatus::TimeLimit
    } else {
        status
    }
}

fn any_error_prefix(report: &JudgeReport, prefix: &str) -> bool {
    report
        .details
        .iter()
        .any(|d| d.error.as_deref().is_some_and(|e| e.starts_with(prefix)))
}

/// The tie-break ladder: pass count, then runtime (within epsilon), then
/// earlier submission, then username for full determinism. Returns the
/// summary that wins the round.
pub(crate) fn ladder_winner<'a>(
    submissions: impl Iterator<Item = &'a SubmissionSummary>,
) -> Option<&'a SubmissionSummary> {
    submissions.min_by(|a, b| ladder_cmp(a, b))
}

/// `Less` means `a` ranks ahead of `b`.
fn ladder_cmp(a: &SubmissionSummary, b: &SubmissionSummary) -> Ordering {
    match b.passed.cmp(&a.passed) {
        Ordering::Equal => {}
        other => return other,
    }
    if (a.runtime - b.runtime).abs() > RUNTIME_EPSILON {
        return a.runtime.partial_cmp(&b.runtime).unwrap_or(Ordering::Equal);
    }
    match a.submitted_at.cmp(&b.submitted_at) {
        Ordering::Equal => {}
        other => return other,
    }
    a.user.cmp(&b.user)
}

/// Score-descending ranked leaderboard with alphabetical tie-break.
fn ranked_leaderboard(
    scores: &std::collections::BTreeMap<Username, i64>,
) -> Vec<RankedScore> {
    let mut entries: Vec<(&Username, i64)> = scores.iter().map(|(u, s)| (u, *s)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .enumerate()
        .map(|(i, (user, score))| RankedScore {
            rank: i + 1,
            user: user.clone(),
            score,
        })
        .collect()
}

/// Pulls the stdin block out of a `Input: … Output: …` sample.
fn extract_sample_input(sample_io: &str) -> String {
    match sample_io.split_once("Input:") {
        Some((_, rest)) => rest
            .split("Output:")
            .next()
            .unwrap_or("")
            .trim()
            .to_string(),
        None => String::new(),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quizarena_protocol::TestResult;
    use std::collections::BTreeMap;

    fn report(passed: usize, total: usize, errors: &[&str]) -> JudgeReport {
        let mut details: Vec<TestResult> = (0..passed)
            .map(|_| TestResult {
                input: String::new(),
                expected: String::new(),
                output: String::new(),
                passed: true,
                error: None,
                time: 0.1,
            })
            .collect();
        for error in errors {
            details.push(TestResult {
                input: String::new(),
                expected: String::new(),
                output: String::new(),
                passed: false,
                error: Some((*error).to_string()),
                time: 0.1,
            });
        }
        JudgeReport {
            passed,
            total,
            details,
        }
    }

    fn summary(name: &str, passed: usize, runtime: f64, at_ms: u64) -> SubmissionSummary {
        SubmissionSummary {
            user: Username::new(name),
            passed,
            runtime,
            submitted_at: Instant::now() + Duration::from_millis(at_ms),
        }
    }

    #[test]
    fn test_derive_status_all_pass_is_accepted() {
        assert_eq!(
            derive_status(&report(3, 3, &[]), false),
            SubmissionStatus::Accepted
        );
    }

    #[test]
    fn test_derive_status_compilation_error_beats_wrong_answer() {
        let r = report(0, 2, &["Compilation error: missing semicolon", "Wrong answer"]);
        assert_eq!(derive_status(&r, false), SubmissionStatus::CompilationError);
    }

    #[test]
    fn test_derive_status_time_limit_beats_wrong_answer() {
        let r = report(1, 3, &["Time limit exceeded", "Wrong answer"]);
        assert_eq!(derive_status(&r, false), SubmissionStatus::TimeLimit);
    }

    #[test]
    fn test_derive_status_partial_pass_is_wrong_answer() {
        let r = report(2, 3, &["Wrong answer"]);
        assert_eq!(derive_status(&r, false), SubmissionStatus::WrongAnswer);
    }

    #[test]
    fn test_derive_status_timeout_flag_forces_time_limit() {
        let r = report(2, 3, &["Wrong answer"]);
        assert_eq!(derive_status(&r, true), SubmissionStatus::TimeLimit);
    }

    #[test]
    fn test_derive_status_timeout_flag_does_not_override_accepted() {
        let r = report(3, 3, &[]);
        assert_eq!(derive_status(&r, true), SubmissionStatus::Accepted);
    }

    #[test]
    fn test_ladder_higher_pass_count_wins() {
        let subs = vec![summary("alice", 3, 0.5, 0), summary("bob", 5, 0.9, 100)];
        assert_eq!(ladder_winner(subs.iter()).unwrap().user.as_str(), "bob");
    }

    #[test]
    fn test_ladder_equal_passes_lower_runtime_wins() {
        // P1 passes 5/5 in 0.20s at t=100; P2 passes 5/5 in 0.15s at
        // t=101. P2 wins on runtime despite submitting later.
        let p1 = summary("p1", 5, 0.20, 100);
        let p2 = summary("p2", 5, 0.15, 101);
        let subs = vec![p1, p2];
        assert_eq!(ladder_winner(subs.iter()).unwrap().user.as_str(), "p2");
    }

    #[test]
    fn test_ladder_runtime_within_epsilon_earlier_submission_wins() {
        let p1 = summary("p1", 5, 0.2000, 100);
        let p2 = summary("p2", 5, 0.2005, 50); // runtime "equal", earlier
        let subs = vec![p1, p2];
        assert_eq!(ladder_winner(subs.iter()).unwrap().user.as_str(), "p2");
    }

    #[test]
    fn test_ladder_full_tie_is_alphabetical() {
        let now = Instant::now();
        let mut p1 = summary("zed", 5, 0.2, 0);
        let mut p2 = summary("amy", 5, 0.2, 0);
        p1.submitted_at = now;
        p2.submitted_at = now;
        let subs = vec![p1, p2];
        assert_eq!(ladder_winner(subs.iter()).unwrap().user.as_str(), "amy");
    }

    #[test]
    fn test_ladder_empty_has_no_winner() {
        assert!(ladder_winner(std::iter::empty()).is_none());
    }

    #[test]
    fn test_ranked_leaderboard_orders_and_ranks() {
        let scores = BTreeMap::from([
            (Username::new("alice"), 40),
            (Username::new("bob"), 55),
            (Username::new("carol"), 40),
        ]);
        let board = ranked_leaderboard(&scores);
        assert_eq!(board[0].user.as_str(), "bob");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].user.as_str(), "alice", "ties are alphabetical");
        assert_eq!(board[1].rank, 2);
        assert_eq!(board[2].user.as_str(), "carol");
        assert_eq!(board[2].rank, 3);
    }

    #[test]
    fn test_extract_sample_input_parses_io_block() {
        assert_eq!(extract_sample_input("Input: hello world Output: 3"), "hello world");
        assert_eq!(extract_sample_input("Input: 5\n Output: 25"), "5");
        assert_eq!(extract_sample_input("no markers here"), "");
    }
}
