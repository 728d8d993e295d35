//! Battle actor: an isolated Tokio task that owns one code battle.
//!
//! Same shape as the quiz room actor — ordered command channel, all
//! mutation on one task — with the first-solver grace delay as the only
//! timer branch. Judge calls are awaited inside the actor; they are the
//! battle's single suspending operation and are never cancelled
//! mid-flight (a disconnect during judging just broadcasts to whoever is
//! still listening).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use quizarena_judge::JudgeClient;
use quizarena_protocol::{
    BattleCode, BattleSnapshot, ClientMessage, Recipient, ServerEvent, Username,
};
use quizarena_store::RoomStore;
use quizarena_transport::ConnectionId;

use crate::battle_engine::BattleEngine;
use crate::registry::Teardown;
use crate::room::EventSender;
use crate::RoomError;

const COMMAND_QUEUE: usize = 64;

struct Member {
    conn: ConnectionId,
    user: Username,
    sender: EventSender,
}

pub(crate) enum BattleCommand {
    Join {
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
        reply: oneshot::Sender<Result<BattleSnapshot, RoomError>>,
    },
    Leave {
        conn: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Detach { conn: ConnectionId },
    Message {
        conn: ConnectionId,
        user: Username,
        msg: ClientMessage,
    },
}

/// Handle to a running battle actor. Cheap to clone.
#[derive(Clone)]
pub struct BattleHandle {
    code: BattleCode,
    sender: mpsc::Sender<BattleCommand>,
}

impl BattleHandle {
    pub fn code(&self) -> &BattleCode {
        &self.code
    }

    pub async fn join(
        &self,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
    ) -> Result<BattleSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(BattleCommand::Join {
                conn,
                user,
                sender,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))?
    }

    pub async fn leave(&self, conn: ConnectionId) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(BattleCommand::Leave {
                conn,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))?
    }

    pub async fn detach(&self, conn: ConnectionId) {
        let _ = self.sender.send(BattleCommand::Detach { conn }).await;
    }

    pub async fn send_message(
        &self,
        conn: ConnectionId,
        user: Username,
        msg: ClientMessage,
    ) -> Result<(), RoomError> {
        self.sender
            .send(BattleCommand::Message { conn, user, msg })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))
    }
}

struct BattleActor<S, J> {
    code: BattleCode,
    engine: BattleEngine<S, J>,
    members: Vec<Member>,
    receiver: mpsc::Receiver<BattleCommand>,
    reaper: mpsc::UnboundedSender<Teardown>,
}

impl<S: RoomStore, J: JudgeClient> BattleActor<S, J> {
    async fn run(mut self) {
        tracing::info!(battle = %self.code, "battle actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                    if self.members.is_empty() {
                        break;
                    }
                }
                token = self.engine.grace.elapsed() => {
                    match self.engine.handle_grace_elapsed(token).await {
                        Ok(out) => self.dispatch(out),
                        Err(e) => tracing::warn!(
                            battle = %self.code, error = %e, "auto-advance aborted"
                        ),
                    }
                }
            }
        }

        let _ = self.reaper.send(Teardown::Battle(self.code.clone()));
        tracing::info!(battle = %self.code, "battle actor stopped");
    }

    async fn handle_command(&mut self, cmd: BattleCommand) {
        match cmd {
            BattleCommand::Join {
                conn,
                user,
                sender,
                reply,
            } => {
                let result = self.handle_join(conn, user, sender).await;
                let _ = reply.send(result);
            }
            BattleCommand::Leave { conn, reply } => {
                let result = self.handle_leave(conn).await;
                let _ = reply.send(result);
            }
            BattleCommand::Detach { conn } => {
                self.members.retain(|m| m.conn != conn);
            }
            BattleCommand::Message { conn, user, msg } => {
                self.handle_message(conn, user, msg).await;
            }
        }
    }

    async fn handle_join(
        &mut self,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
    ) -> Result<BattleSnapshot, RoomError> {
        if self.members.iter().any(|m| m.conn == conn) {
            return Err(RoomError::AlreadyInRoom(user));
        }
        let (snapshot, roster_changed) = self.engine.add_player(&user).await?;
        self.members.push(Member {
            conn,
            user: user.clone(),
            sender,
        });

        if roster_changed {
            self.dispatch(vec![(
                Recipient::AllExcept(user.clone()),
                ServerEvent::PlayerJoined {
                    user,
                    room: None,
                    battle: Some(snapshot.clone()),
                },
            )]);
        }
        Ok(snapshot)
    }

    /// Explicit leave: detach and tell the opponent. Battle records are
    /// durable — the player can rejoin by code while the battle waits.
    async fn handle_leave(&mut self, conn: ConnectionId) -> Result<(), RoomError> {
        let Some(pos) = self.members.iter().position(|m| m.conn == conn) else {
            return Ok(());
        };
        let user = self.members[pos].user.clone();
        self.members.remove(pos);

        let snapshot = self.engine.snapshot().await.ok();
        self.dispatch(vec![(
            Recipient::All,
            ServerEvent::PlayerLeft {
                user,
                room: None,
                battle: snapshot,
            },
        )]);
        Ok(())
    }

    async fn handle_message(&mut self, conn: ConnectionId, user: Username, msg: ClientMessage) {
        if !self.members.iter().any(|m| m.conn == conn) {
            tracing::warn!(battle = %self.code, %conn, "message from non-member, ignoring");
            return;
        }

        let result = match msg {
            ClientMessage::SetReady { ready } => self.engine.set_ready(&user, ready).await,
            ClientMessage::StartBattle => self.engine.start_battle(&user).await,
            ClientMessage::EndBattle => self.engine.end_battle(&user).await,
            ClientMessage::RunCode { code, language } => {
                self.engine.run_code(&user, code, language).await
            }
            ClientMessage::SubmitCode {
                code,
                language,
                is_timeout,
            } => {
                self.engine
                    .submit_code(&user, code, language, is_timeout)
                    .await
            }
            // Social relays carry no game state; they fan out as-is.
            ClientMessage::Typing => Ok(vec![(
                Recipient::All,
                ServerEvent::Typing { user: user.clone() },
            )]),
            ClientMessage::StopTyping => Ok(vec![(
                Recipient::All,
                ServerEvent::StopTyping { user: user.clone() },
            )]),
            ClientMessage::TabSwitchWarning => Ok(vec![(
                Recipient::All,
                ServerEvent::TabWarning { user: user.clone() },
            )]),
            other => {
                tracing::debug!(
                    battle = %self.code,
                    %user,
                    msg = ?other,
                    "non-battle message in battle, ignoring"
                );
                Ok(Vec::new())
            }
        };

        match result {
            Ok(out) => self.dispatch(out),
            Err(e) => self.send_to_conn(conn, ServerEvent::error(e.to_string())),
        }
    }

    fn dispatch(&self, out: Vec<(Recipient, ServerEvent)>) {
        for (recipient, event) in out {
            match recipient {
                Recipient::All => {
                    for member in &self.members {
                        self.send(member, event.clone());
                    }
                }
                Recipient::Player(ref user) => {
                    for member in self.members.iter().filter(|m| m.user == *user) {
                        self.send(member, event.clone());
                    }
                }
                Recipient::AllExcept(ref user) => {
                    for member in self.members.iter().filter(|m| m.user != *user) {
                        self.send(member, event.clone());
                    }
                }
            }
        }
    }

    fn send_to_conn(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(member) = self.members.iter().find(|m| m.conn == conn) {
            self.send(member, event);
        }
    }

    fn send(&self, member: &Member, event: ServerEvent) {
        match member.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    battle = %self.code,
                    conn = %member.conn,
                    "outbound queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Spawns a battle actor and returns its handle.
pub(crate) fn spawn_battle<S: RoomStore, J: JudgeClient>(
    code: BattleCode,
    store: Arc<S>,
    judge: Arc<J>,
    reaper: mpsc::UnboundedSender<Teardown>,
) -> BattleHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let actor = BattleActor {
        code: code.clone(),
        engine: BattleEngine::new(code.clone(), store, judge),
        members: Vec::new(),
        receiver: rx,
        reaper,
    };
    tokio::spawn(actor.run());
    BattleHandle { code, sender: tx }
}
