//! Room registry: the owned map of live room/battle actors.
//!
//! One registry per server process, injected into the gateway — never
//! ambient global state. Actor handles are inserted when a room first
//! gets a connection and removed by the reaper task when the actor
//! stops (room emptied). Durable records outlive the actors; a room
//! whose actor was torn down respawns on the next join.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use quizarena_judge::JudgeClient;
use quizarena_protocol::{
    BattleCode, BattleSnapshot, Difficulty, RoomCode, RoomSnapshot, Username,
};
use quizarena_store::{NewBattle, QuestionSource, RoomStore};
use quizarena_transport::ConnectionId;

use crate::battle::{BattleHandle, spawn_battle};
use crate::room::{EventSender, RoomHandle, spawn_quiz_room};
use crate::RoomError;

/// Battles accept between 1 and 10 challenges.
const MAX_BATTLE_QUESTIONS: usize = 10;

/// Notification from a stopping actor to the reaper.
pub(crate) enum Teardown {
    Room(RoomCode),
    Battle(BattleCode),
}

type RoomMap = Arc<Mutex<HashMap<RoomCode, RoomHandle>>>;
type BattleMap = Arc<Mutex<HashMap<BattleCode, BattleHandle>>>;

/// Creates, tracks, and routes connections to room and battle actors.
pub struct RoomRegistry<S, Q, J> {
    store: Arc<S>,
    source: Arc<Q>,
    judge: Arc<J>,
    rooms: RoomMap,
    battles: BattleMap,
    reaper_tx: mpsc::UnboundedSender<Teardown>,
}

impl<S: RoomStore, Q: QuestionSource, J: JudgeClient> RoomRegistry<S, Q, J> {
    pub fn new(store: Arc<S>, source: Arc<Q>, judge: Arc<J>) -> Self {
        let rooms: RoomMap = Arc::new(Mutex::new(HashMap::new()));
        let battles: BattleMap = Arc::new(Mutex::new(HashMap::new()));
        let (reaper_tx, mut reaper_rx) = mpsc::unbounded_channel();

        // Reaper: removes handles of stopped actors so the maps only
        // ever hold live rooms.
        let reaper_rooms = Arc::clone(&rooms);
        let reaper_battles = Arc::clone(&battles);
        tokio::spawn(async move {
            while let Some(teardown) = reaper_rx.recv().await {
                match teardown {
                    Teardown::Room(code) => {
                        reaper_rooms.lock().await.remove(&code);
                        tracing::debug!(room = %code, "room handle reaped");
                    }
                    Teardown::Battle(code) => {
                        reaper_battles.lock().await.remove(&code);
                        tracing::debug!(battle = %code, "battle handle reaped");
                    }
                }
            }
        });

        Self {
            store,
            source,
            judge,
            rooms,
            battles,
            reaper_tx,
        }
    }

    /// Number of live room actors (quiz rooms).
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Number of live battle actors.
    pub async fn battle_count(&self) -> usize {
        self.battles.lock().await.len()
    }

    /// Joins a quiz room by code, spawning its actor if this is the
    /// first connection. The room record must already exist.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
    ) -> Result<(RoomHandle, RoomSnapshot), RoomError> {
        // Validate before spawning so bad codes don't create actors.
        self.store
            .room(code)
            .await
            .map_err(|_| RoomError::NotFound("Room not found or inactive".into()))?;

        let handle = self.room_handle(code).await;
        match handle.join(conn, user.clone(), sender.clone()).await {
            Ok(snapshot) => Ok((handle, snapshot)),
            // The actor may have stopped between lookup and join
            // (emptied in the gap). Respawn once and retry.
            Err(RoomError::Unavailable(_)) => {
                self.rooms.lock().await.remove(code);
                let handle = self.room_handle(code).await;
                let snapshot = handle.join(conn, user, sender).await?;
                Ok((handle, snapshot))
            }
            Err(e) => Err(e),
        }
    }

    async fn room_handle(&self, code: &RoomCode) -> RoomHandle {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(code.clone())
            .or_insert_with(|| {
                spawn_quiz_room(
                    code.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.source),
                    self.reaper_tx.clone(),
                )
            })
            .clone()
    }

    /// Creates a battle with randomly selected challenges and joins the
    /// creator.
    pub async fn create_battle(
        &self,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
        num_questions: usize,
        level: Difficulty,
    ) -> Result<(BattleHandle, BattleSnapshot), RoomError> {
        if num_questions == 0 || num_questions > MAX_BATTLE_QUESTIONS {
            return Err(RoomError::InvalidInput(format!(
                "Number of questions must be between 1 and {MAX_BATTLE_QUESTIONS}"
            )));
        }

        let challenges = self
            .store
            .challenges_by_difficulty(level, num_questions)
            .await?;

        let battle = self
            .store
            .create_battle(NewBattle {
                player1: user.clone(),
                level,
                num_questions,
                challenges: challenges.iter().map(|c| c.id).collect(),
            })
            .await?;

        tracing::info!(battle = %battle.code, host = %user, "battle created");
        let handle = self.battle_handle(&battle.code).await;
        let snapshot = handle.join(conn, user, sender).await?;
        Ok((handle, snapshot))
    }

    /// Matchmaking by challenge: join someone's open battle, return to
    /// your own waiting battle, or create a fresh one.
    pub async fn join_battle(
        &self,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
        challenge_id: u64,
    ) -> Result<(BattleHandle, BattleSnapshot), RoomError> {
        // The challenge must exist regardless of which path we take.
        let challenge = self.store.challenge(challenge_id).await?;

        let code = if let Some(open) = self.store.find_open_battle(challenge_id, &user).await? {
            open.code
        } else if let Some(own) = self
            .store
            .find_waiting_battle_of(&user, challenge_id)
            .await?
        {
            own.code
        } else {
            let battle = self
                .store
                .create_battle(NewBattle {
                    player1: user.clone(),
                    level: challenge.difficulty,
                    num_questions: 1,
                    challenges: vec![challenge_id],
                })
                .await?;
            battle.code
        };

        let handle = self.battle_handle(&code).await;
        let snapshot = handle.join(conn, user, sender).await?;
        Ok((handle, snapshot))
    }

    /// Joins a battle by its share code.
    pub async fn join_battle_by_code(
        &self,
        code: &BattleCode,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
    ) -> Result<(BattleHandle, BattleSnapshot), RoomError> {
        self.store
            .battle(code)
            .await
            .map_err(|_| RoomError::NotFound("Battle not found".into()))?;

        let handle = self.battle_handle(code).await;
        match handle.join(conn, user.clone(), sender.clone()).await {
            Ok(snapshot) => Ok((handle, snapshot)),
            Err(RoomError::Unavailable(_)) => {
                self.battles.lock().await.remove(code);
                let handle = self.battle_handle(code).await;
                let snapshot = handle.join(conn, user, sender).await?;
                Ok((handle, snapshot))
            }
            Err(e) => Err(e),
        }
    }

    async fn battle_handle(&self, code: &BattleCode) -> BattleHandle {
        let mut battles = self.battles.lock().await;
        battles
            .entry(code.clone())
            .or_insert_with(|| {
                spawn_battle(
                    code.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.judge),
                    self.reaper_tx.clone(),
                )
            })
            .clone()
    }
}
