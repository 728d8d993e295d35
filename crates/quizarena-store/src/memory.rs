//! In-memory reference implementation of [`RoomStore`].
//!
//! Backs development servers and the test suites. A single mutex guards
//! all tables; no method awaits while holding it, so the store never
//! deadlocks against the actors calling it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use rand::Rng;
use tokio::sync::Mutex;

use quizarena_protocol::{
    BattleCode, BattleStatus, Difficulty, RoomCode, RoomStatus, RoundState, SubmissionStatus,
    Username,
};

use crate::records::{
    BattleRecord, ChallengeRecord, NewBattle, NewQuiz, NewRoom, PlayerRecord, QuizRecord,
    RoomRecord, SubmissionRecord,
};
use crate::{RoomStore, StoreError};

/// Alphabet for share codes: uppercase letters and digits.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;

/// Per-user progress accumulator, mirroring the external gamification
/// tables closely enough for tests to assert call counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEntry {
    pub total_score: i64,
    pub completions: u32,
    pub streak: u32,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomCode, RoomRecord>,
    /// Join-ordered players per room.
    players: HashMap<RoomCode, Vec<PlayerRecord>>,
    quizzes: HashMap<u64, QuizRecord>,
    challenges: BTreeMap<u64, ChallengeRecord>,
    battles: HashMap<BattleCode, BattleRecord>,
    submissions: Vec<SubmissionRecord>,
    progress: HashMap<Username, ProgressEntry>,
    next_quiz_id: u64,
}

/// An in-memory [`RoomStore`]. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a challenge (development/tests; challenge CRUD is external).
    pub async fn add_challenge(&self, challenge: ChallengeRecord) {
        let mut inner = self.inner.lock().await;
        inner.challenges.insert(challenge.id, challenge);
    }

    /// Progress snapshot for assertions in tests.
    pub async fn progress_of(&self, user: &Username) -> Option<ProgressEntry> {
        self.inner.lock().await.progress.get(user).cloned()
    }

    /// All recorded submissions for a user/challenge pair, oldest first.
    pub async fn submissions_of(
        &self,
        user: &Username,
        challenge_id: u64,
    ) -> Vec<SubmissionRecord> {
        self.inner
            .lock()
            .await
            .submissions
            .iter()
            .filter(|s| s.user == *user && s.challenge_id == challenge_id)
            .cloned()
            .collect()
    }
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

impl Inner {
    /// Rejection-samples a room code not currently in use. Collisions
    /// across concurrent creations are impossible because the caller
    /// holds the table lock for the check and the insert.
    fn fresh_room_code(&self) -> RoomCode {
        loop {
            let code = RoomCode::new(random_code());
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    fn fresh_battle_code(&self) -> BattleCode {
        loop {
            let code = BattleCode::new(random_code());
            if !self.battles.contains_key(&code) {
                return code;
            }
        }
    }
}

#[async_trait::async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, new: NewRoom) -> Result<RoomRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let code = inner.fresh_room_code();
        let room = RoomRecord {
            code: code.clone(),
            name: new.name,
            host: new.host,
            topic: new.topic,
            difficulty: new.difficulty,
            num_questions: new.num_questions,
            max_players: new.max_players,
            status: RoomStatus::Waiting,
            round_state: RoundState::Waiting,
            timer_duration: new.difficulty.timer_duration(),
            current_question_index: 0,
            quiz: None,
            created_at: SystemTime::now(),
            started_at: None,
            round_started_at: None,
        };
        inner.rooms.insert(code.clone(), room.clone());
        inner.players.insert(code, Vec::new());
        Ok(room)
    }

    async fn room(&self, code: &RoomCode) -> Result<RoomRecord, StoreError> {
        self.inner
            .lock()
            .await
            .rooms
            .get(code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {code}")))
    }

    async fn update_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.rooms.get_mut(&room.code) {
            Some(existing) => {
                *existing = room.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("room {}", room.code))),
        }
    }

    async fn delete_room(&self, code: &RoomCode) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.players.remove(code);
        inner
            .rooms
            .remove(code)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("room {code}")))
    }

    async fn players(&self, code: &RoomCode) -> Result<Vec<PlayerRecord>, StoreError> {
        self.inner
            .lock()
            .await
            .players
            .get(code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {code}")))
    }

    async fn player(
        &self,
        code: &RoomCode,
        user: &Username,
    ) -> Result<PlayerRecord, StoreError> {
        self.inner
            .lock()
            .await
            .players
            .get(code)
            .and_then(|list| list.iter().find(|p| p.user == *user))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("player {user} in room {code}")))
    }

    async fn join_player(
        &self,
        code: &RoomCode,
        user: &Username,
    ) -> Result<(PlayerRecord, bool), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.rooms.contains_key(code) {
            return Err(StoreError::NotFound(format!("room {code}")));
        }
        let list = inner.players.entry(code.clone()).or_default();
        if let Some(existing) = list.iter().find(|p| p.user == *user) {
            return Ok((existing.clone(), false));
        }
        let player = PlayerRecord {
            user: user.clone(),
            room: code.clone(),
            score: 0,
            is_ready: false,
            current_answer: None,
            answer_time_used: 0,
            answer_timestamp: None,
            joined_at: SystemTime::now(),
        };
        list.push(player.clone());
        Ok((player, true))
    }

    async fn update_player(&self, player: &PlayerRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let list = inner
            .players
            .get_mut(&player.room)
            .ok_or_else(|| StoreError::NotFound(format!("room {}", player.room)))?;
        match list.iter_mut().find(|p| p.user == player.user) {
            Some(existing) => {
                *existing = player.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "player {} in room {}",
                player.user, player.room
            ))),
        }
    }

    async fn remove_player(&self, code: &RoomCode, user: &Username) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let list = inner
            .players
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(format!("room {code}")))?;
        let before = list.len();
        list.retain(|p| p.user != *user);
        if list.len() == before {
            return Err(StoreError::NotFound(format!(
                "player {user} in room {code}"
            )));
        }
        Ok(())
    }

    async fn create_quiz(&self, new: NewQuiz) -> Result<QuizRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_quiz_id += 1;
        let quiz = QuizRecord {
            id: inner.next_quiz_id,
            title: new.title,
            questions: new.questions,
        };
        inner.quizzes.insert(quiz.id, quiz.clone());
        Ok(quiz)
    }

    async fn quiz(&self, id: u64) -> Result<QuizRecord, StoreError> {
        self.inner
            .lock()
            .await
            .quizzes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("quiz {id}")))
    }

    async fn challenge(&self, id: u64) -> Result<ChallengeRecord, StoreError> {
        self.inner
            .lock()
            .await
            .challenges
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("challenge {id}")))
    }

    async fn challenges_by_difficulty(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<ChallengeRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<ChallengeRecord> = inner
            .challenges
            .values()
            .filter(|c| c.difficulty == difficulty)
            .cloned()
            .collect();
        if matching.len() < count {
            return Err(StoreError::Conflict(format!(
                "only {} {difficulty} challenges available, wanted {count}",
                matching.len()
            )));
        }
        use rand::seq::SliceRandom;
        matching.shuffle(&mut rand::rng());
        matching.truncate(count);
        Ok(matching)
    }

    async fn create_battle(&self, new: NewBattle) -> Result<BattleRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let code = inner.fresh_battle_code();
        let battle = BattleRecord {
            code: code.clone(),
            player1: new.player1,
            player2: None,
            status: BattleStatus::Waiting,
            level: new.level,
            num_questions: new.num_questions,
            challenges: new.challenges,
            current_challenge_index: 0,
            scores: BTreeMap::new(),
            question_winners: BTreeMap::new(),
            player1_ready: false,
            player2_ready: false,
            winner: None,
            started_at: None,
            completed_at: None,
        };
        inner.battles.insert(code, battle.clone());
        Ok(battle)
    }

    async fn battle(&self, code: &BattleCode) -> Result<BattleRecord, StoreError> {
        self.inner
            .lock()
            .await
            .battles
            .get(code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("battle {code}")))
    }

    async fn update_battle(&self, battle: &BattleRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.battles.get_mut(&battle.code) {
            Some(existing) => {
                *existing = battle.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("battle {}", battle.code))),
        }
    }

    async fn find_open_battle(
        &self,
        challenge_id: u64,
        exclude: &Username,
    ) -> Result<Option<BattleRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .battles
            .values()
            .find(|b| {
                b.status == BattleStatus::Waiting
                    && b.player2.is_none()
                    && b.player1 != *exclude
                    && b.challenges.contains(&challenge_id)
            })
            .cloned())
    }

    async fn find_waiting_battle_of(
        &self,
        user: &Username,
        challenge_id: u64,
    ) -> Result<Option<BattleRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .battles
            .values()
            .find(|b| {
                b.status == BattleStatus::Waiting
                    && b.player1 == *user
                    && b.challenges.contains(&challenge_id)
            })
            .cloned())
    }

    async fn record_submission(&self, submission: SubmissionRecord) -> Result<(), StoreError> {
        self.inner.lock().await.submissions.push(submission);
        Ok(())
    }

    async fn has_terminal_submission(
        &self,
        user: &Username,
        challenge_id: u64,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.submissions.iter().any(|s| {
            s.user == *user
                && s.challenge_id == challenge_id
                && matches!(
                    s.status,
                    SubmissionStatus::Accepted | SubmissionStatus::TimeLimit
                )
        }))
    }

    async fn update_user_progress(
        &self,
        user: &Username,
        score: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.progress.entry(user.clone()).or_default();
        entry.total_score += score;
        entry.completions += 1;
        Ok(())
    }

    async fn update_streak(&self, user: &Username) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.progress.entry(user.clone()).or_default();
        entry.streak += 1;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
