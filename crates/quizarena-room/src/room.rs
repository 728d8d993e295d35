//! Quiz room actor: an isolated Tokio task that owns one room.
//!
//! Each live room runs in its own task, processing commands from an
//! ordered channel. All round state mutation happens on this task, so
//! concurrent submissions serialize without locks, and broadcast order
//! is the order the actor emitted events.
//!
//! The select loop has three wake sources: inbound commands, the round
//! countdown, and the review delay. The timer branches pend while idle,
//! so an inactive room costs nothing.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use quizarena_protocol::{ClientMessage, Recipient, RoomCode, RoomSnapshot, ServerEvent, Username};
use quizarena_store::{QuestionSource, RoomStore};
use quizarena_transport::ConnectionId;

use crate::match_engine::MatchEngine;
use crate::registry::Teardown;
use crate::RoomError;

/// Capacity of each connection's outbound event queue. A connection
/// that can't drain this many events has its own events dropped — the
/// room's broadcast never blocks on a slow consumer.
pub const OUTBOUND_QUEUE: usize = 256;

/// Default command channel size for room actors.
const COMMAND_QUEUE: usize = 64;

/// Sender half of a connection's outbound event queue.
pub type EventSender = mpsc::Sender<ServerEvent>;

/// One connection attached to the room. Kept in join order; broadcasts
/// iterate this list, which gives the per-room ordering guarantee.
struct Member {
    conn: ConnectionId,
    user: Username,
    sender: EventSender,
}

/// Commands sent to a quiz room actor.
pub(crate) enum RoomCommand {
    /// Attach a connection as a player.
    Join {
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
        reply: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },
    /// Explicit leave: roster removal, host reassignment, teardown when
    /// the room empties.
    Leave {
        conn: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// Connection dropped: detach only. Player records survive so the
    /// player can reconnect into a running match.
    Detach { conn: ConnectionId },
    /// An inbound game message from a member connection.
    Message {
        conn: ConnectionId,
        user: Username,
        msg: ClientMessage,
    },
}

/// Handle to a running quiz room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub async fn join(
        &self,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
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
            .send(RoomCommand::Leave {
                conn,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))?
    }

    /// Fire-and-forget detach for dropped connections.
    pub async fn detach(&self, conn: ConnectionId) {
        let _ = self.sender.send(RoomCommand::Detach { conn }).await;
    }

    pub async fn send_message(
        &self,
        conn: ConnectionId,
        user: Username,
        msg: ClientMessage,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Message { conn, user, msg })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.to_string()))
    }
}

/// The room actor. Runs inside a Tokio task until the room empties.
struct RoomActor<S, Q> {
    code: RoomCode,
    store: Arc<S>,
    engine: MatchEngine<S, Q>,
    members: Vec<Member>,
    receiver: mpsc::Receiver<RoomCommand>,
    reaper: mpsc::UnboundedSender<Teardown>,
}

impl<S: RoomStore, Q: QuestionSource> RoomActor<S, Q> {
    async fn run(mut self) {
        tracing::info!(room = %self.code, "room actor started");

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
                remaining = self.engine.countdown.tick() => {
                    match self.engine.handle_tick(remaining).await {
                        Ok(out) => self.dispatch(out),
                        Err(e) => tracing::warn!(
                            room = %self.code, error = %e, "tick aborted"
                        ),
                    }
                }
                token = self.engine.review.elapsed() => {
                    match self.engine.handle_review_elapsed(token).await {
                        Ok(out) => self.dispatch(out),
                        Err(e) => tracing::warn!(
                            room = %self.code, error = %e, "advance aborted"
                        ),
                    }
                }
            }
        }

        let _ = self.reaper.send(Teardown::Room(self.code.clone()));
        tracing::info!(room = %self.code, "room actor stopped");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                conn,
                user,
                sender,
                reply,
            } => {
                let result = self.handle_join(conn, user, sender).await;
                let _ = reply.send(result);
            }
            RoomCommand::Leave { conn, reply } => {
                let result = self.handle_leave(conn).await;
                let _ = reply.send(result);
            }
            RoomCommand::Detach { conn } => {
                self.members.retain(|m| m.conn != conn);
                tracing::debug!(room = %self.code, %conn, "connection detached");
            }
            RoomCommand::Message { conn, user, msg } => {
                self.handle_message(conn, user, msg).await;
            }
        }
    }

    async fn handle_join(
        &mut self,
        conn: ConnectionId,
        user: Username,
        sender: EventSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let room = self
            .store
            .room(&self.code)
            .await
            .map_err(|_| RoomError::NotFound("Room not found or inactive".into()))?;

        if self.members.iter().any(|m| m.conn == conn || m.user == user) {
            return Err(RoomError::AlreadyInRoom(user));
        }

        let players = self.store.players(&self.code).await?;
        let already_member = players.iter().any(|p| p.user == user);
        if !already_member && players.len() >= room.max_players {
            return Err(RoomError::Full(self.code.to_string()));
        }

        self.store.join_player(&self.code, &user).await?;
        self.members.push(Member {
            conn,
            user: user.clone(),
            sender,
        });

        tracing::info!(
            room = %self.code,
            %user,
            connections = self.members.len(),
            "player joined"
        );

        let snapshot = self.engine.snapshot().await?;
        self.dispatch(vec![(
            Recipient::AllExcept(user.clone()),
            ServerEvent::PlayerJoined {
                user,
                room: Some(snapshot.clone()),
                battle: None,
            },
        )]);
        Ok(snapshot)
    }

    /// Explicit leave. Idempotent: unknown connections are a no-op.
    async fn handle_leave(&mut self, conn: ConnectionId) -> Result<(), RoomError> {
        let Some(pos) = self.members.iter().position(|m| m.conn == conn) else {
            return Ok(());
        };
        let user = self.members[pos].user.clone();
        self.members.remove(pos);

        let mut room = self.store.room(&self.code).await?;
        let players = self.store.players(&self.code).await?;

        // Host reassignment: any remaining player inherits the room.
        if players.len() > 1 && room.host == user {
            if let Some(new_host) = players.iter().find(|p| p.user != user) {
                room.host = new_host.user.clone();
                self.store.update_room(&room).await?;
                tracing::info!(room = %self.code, new_host = %room.host, "host reassigned");
            }
        }

        self.store.remove_player(&self.code, &user).await?;

        let remaining = self.store.players(&self.code).await?;
        if remaining.is_empty() {
            // Last player left: the room is destroyed, not just idled.
            if let Err(e) = self.store.delete_room(&self.code).await {
                tracing::warn!(room = %self.code, error = %e, "room delete failed");
            }
            tracing::info!(room = %self.code, "room emptied and deleted");
        } else {
            let snapshot = self.engine.snapshot().await?;
            self.dispatch(vec![(
                Recipient::All,
                ServerEvent::PlayerLeft {
                    user,
                    room: Some(snapshot),
                    battle: None,
                },
            )]);
        }
        Ok(())
    }

    async fn handle_message(&mut self, conn: ConnectionId, user: Username, msg: ClientMessage) {
        if !self.members.iter().any(|m| m.conn == conn) {
            tracing::warn!(room = %self.code, %conn, "message from non-member, ignoring");
            return;
        }

        let connected = self.connected_players();
        let result = match msg {
            ClientMessage::ToggleReady => self.engine.toggle_ready(&user).await,
            ClientMessage::StartGame => self.engine.start_game(&user).await,
            ClientMessage::SubmitAnswer {
                question_index,
                answer,
            } => {
                self.engine
                    .submit_answer(&user, question_index, answer, connected)
                    .await
            }
            ClientMessage::TimeUp => self.engine.time_up().await,
            other => {
                tracing::debug!(
                    room = %self.code,
                    %user,
                    msg = ?other,
                    "non-quiz message in quiz room, ignoring"
                );
                Ok(Vec::new())
            }
        };

        match result {
            Ok(out) => self.dispatch(out),
            // Engine errors abort the single transition; only the
            // initiating connection hears about it.
            Err(e) => self.send_to_conn(conn, ServerEvent::error(e.to_string())),
        }
    }

    /// Distinct usernames currently connected — the denominator for the
    /// "all answered" early end.
    fn connected_players(&self) -> usize {
        let mut users: Vec<&Username> = self.members.iter().map(|m| &m.user).collect();
        users.sort();
        users.dedup();
        users.len()
    }

    /// Delivers events to the addressed members, in join order.
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

    /// Non-blocking send. A full queue drops the event for that
    /// connection only; a closed queue means the connection is gone.
    fn send(&self, member: &Member, event: ServerEvent) {
        match member.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    room = %self.code,
                    conn = %member.conn,
                    "outbound queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Spawns a quiz room actor and returns its handle.
pub(crate) fn spawn_quiz_room<S: RoomStore, Q: QuestionSource>(
    code: RoomCode,
    store: Arc<S>,
    source: Arc<Q>,
    reaper: mpsc::UnboundedSender<Teardown>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let actor = RoomActor {
        code: code.clone(),
        store: Arc::clone(&store),
        engine: MatchEngine::new(code.clone(), store, source),
        members: Vec::new(),
        receiver: rx,
        reaper,
    };
    tokio::spawn(actor.run());
    RoomHandle { code, sender: tx }
}
