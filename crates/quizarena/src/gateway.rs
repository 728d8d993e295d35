//! Connection gateway: the thin adapter between the wire and the room
//! actors.
//!
//! Per connection, two tasks run: this inbound handler and an outbound
//! pump. Room actors write events into a bounded per-connection queue;
//! the pump drains it onto the socket. If a connection can't keep up,
//! its queue fills and *its* events are dropped — the room's broadcast
//! loop never blocks on a slow consumer.
//!
//! Error policy (per connection): malformed frames and rejected actions
//! produce an `error` event to this connection only; unknown message
//! types are logged and ignored; nothing recoverable ever closes the
//! socket.

use std::sync::Arc;

use tokio::sync::mpsc;

use quizarena_protocol::{
    ClientMessage, Codec, Inbound, JsonCodec, ServerEvent, Username, decode_inbound,
};
use quizarena_room::{BattleHandle, OUTBOUND_QUEUE, RoomHandle, RoomRegistry};
use quizarena_store::{QuestionSource, RoomStore};
use quizarena_judge::JudgeClient;
use quizarena_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::auth::Authenticator;
use crate::QuizArenaError;

/// Shared server state passed to each connection handler.
pub(crate) struct ServerState<S, Q, J, A> {
    pub(crate) registry: RoomRegistry<S, Q, J>,
    pub(crate) store: Arc<S>,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
}

/// Which room actor this connection is attached to, if any. Caching the
/// handle here means in-room messages skip the registry entirely.
enum Attachment {
    None,
    Quiz(RoomHandle),
    Battle(BattleHandle),
}

/// Handles one connection from accept to close.
pub(crate) async fn handle_connection<S, Q, J, A>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, Q, J, A>>,
) -> Result<(), QuizArenaError>
where
    S: RoomStore,
    Q: QuestionSource,
    J: JudgeClient,
    A: Authenticator,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // Outbound pump: events from room actors (and this handler) to the
    // socket. Bounded; room actors drop rather than wait.
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE);
    let pump_conn = conn.clone();
    let pump_codec = state.codec;
    let pump = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let frame = match pump_codec.encode(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "event encode failed, skipping");
                    continue;
                }
            };
            if pump_conn.send(&frame).await.is_err() {
                break;
            }
        }
    });

    let mut user: Option<Username> = None;
    let mut attachment = Attachment::None;

    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let msg = match decode_inbound(&frame) {
            Ok(Inbound::Message(msg)) => msg,
            Ok(Inbound::Unknown(tag)) => {
                tracing::debug!(%conn_id, %tag, "unknown message type, ignoring");
                continue;
            }
            Err(_) => {
                send(&event_tx, ServerEvent::error("Invalid JSON")).await;
                continue;
            }
        };

        // Authentication is the one message an anonymous sender may use.
        if let ClientMessage::Authenticate { token } = &msg {
            match state.auth.authenticate(token).await {
                Ok(authenticated) => {
                    tracing::info!(%conn_id, user = %authenticated, "authenticated");
                    send(
                        &event_tx,
                        ServerEvent::Authenticated {
                            user: authenticated.clone(),
                        },
                    )
                    .await;
                    user = Some(authenticated);
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "authentication failed");
                    send(&event_tx, ServerEvent::error("Authentication failed")).await;
                }
            }
            continue;
        }

        let Some(current_user) = user.clone() else {
            send(&event_tx, ServerEvent::error("Authentication required")).await;
            continue;
        };

        handle_message(
            &state,
            conn_id,
            &current_user,
            msg,
            &event_tx,
            &mut attachment,
        )
        .await;
    }

    // Connection gone: detach from whatever room we were in. This is
    // not a leave — the player record survives for reconnection.
    match &attachment {
        Attachment::Quiz(handle) => handle.detach(conn_id).await,
        Attachment::Battle(handle) => handle.detach(conn_id).await,
        Attachment::None => {}
    }
    drop(event_tx);
    let _ = pump.await;
    Ok(())
}

/// Routes one authenticated message.
async fn handle_message<S, Q, J, A>(
    state: &Arc<ServerState<S, Q, J, A>>,
    conn_id: ConnectionId,
    user: &Username,
    msg: ClientMessage,
    event_tx: &mpsc::Sender<ServerEvent>,
    attachment: &mut Attachment,
) where
    S: RoomStore,
    Q: QuestionSource,
    J: JudgeClient,
    A: Authenticator,
{
    match msg {
        // -- Joining --
        ClientMessage::JoinRoom { room_code } => {
            if !matches!(attachment, Attachment::None) {
                send(event_tx, ServerEvent::error("Already in a room")).await;
                return;
            }
            // Share codes are case-insensitive on the way in.
            let room_code = quizarena_protocol::RoomCode::new(room_code.0);
            match state
                .registry
                .join_room(&room_code, conn_id, user.clone(), event_tx.clone())
                .await
            {
                Ok((handle, snapshot)) => {
                    *attachment = Attachment::Quiz(handle);
                    send(event_tx, ServerEvent::RoomState { room: snapshot }).await;
                }
                Err(e) => send(event_tx, ServerEvent::error(e.to_string())).await,
            }
        }

        ClientMessage::CreateBattle {
            num_questions,
            level,
        } => {
            if !matches!(attachment, Attachment::None) {
                send(event_tx, ServerEvent::error("Already in a room")).await;
                return;
            }
            match state
                .registry
                .create_battle(conn_id, user.clone(), event_tx.clone(), num_questions, level)
                .await
            {
                Ok((handle, snapshot)) => {
                    *attachment = Attachment::Battle(handle);
                    send(event_tx, ServerEvent::BattleJoined { battle: snapshot }).await;
                }
                Err(e) => send(event_tx, ServerEvent::error(e.to_string())).await,
            }
        }

        ClientMessage::JoinBattle { challenge_id } => {
            if !matches!(attachment, Attachment::None) {
                send(event_tx, ServerEvent::error("Already in a room")).await;
                return;
            }
            match state
                .registry
                .join_battle(conn_id, user.clone(), event_tx.clone(), challenge_id)
                .await
            {
                Ok((handle, snapshot)) => {
                    *attachment = Attachment::Battle(handle);
                    send(event_tx, ServerEvent::BattleJoined { battle: snapshot }).await;
                }
                Err(e) => send(event_tx, ServerEvent::error(e.to_string())).await,
            }
        }

        ClientMessage::JoinBattleByCode { battle_code } => {
            if !matches!(attachment, Attachment::None) {
                send(event_tx, ServerEvent::error("Already in a room")).await;
                return;
            }
            let battle_code = quizarena_protocol::BattleCode::new(battle_code.0);
            match state
                .registry
                .join_battle_by_code(&battle_code, conn_id, user.clone(), event_tx.clone())
                .await
            {
                Ok((handle, snapshot)) => {
                    *attachment = Attachment::Battle(handle);
                    send(event_tx, ServerEvent::BattleJoined { battle: snapshot }).await;
                }
                Err(e) => send(event_tx, ServerEvent::error(e.to_string())).await,
            }
        }

        // -- Lobby-level reads --
        ClientMessage::LoadChallenge { challenge_id } => {
            match state.store.challenge(challenge_id).await {
                Ok(challenge) => {
                    send(
                        event_tx,
                        ServerEvent::ChallengeLoaded {
                            challenge: challenge.view(),
                        },
                    )
                    .await;
                }
                Err(_) => send(event_tx, ServerEvent::error("Challenge not found")).await,
            }
        }

        // -- Leaving --
        ClientMessage::LeaveRoom => match attachment {
            Attachment::Quiz(handle) => {
                if let Err(e) = handle.leave(conn_id).await {
                    send(event_tx, ServerEvent::error(e.to_string())).await;
                }
                *attachment = Attachment::None;
            }
            _ => send(event_tx, ServerEvent::error("Not in a room")).await,
        },

        ClientMessage::LeaveBattle => match attachment {
            Attachment::Battle(handle) => {
                if let Err(e) = handle.leave(conn_id).await {
                    send(event_tx, ServerEvent::error(e.to_string())).await;
                }
                *attachment = Attachment::None;
            }
            _ => send(event_tx, ServerEvent::error("Not in a battle")).await,
        },

        // -- In-room messages: forwarded to the cached actor handle --
        other => match attachment {
            Attachment::Quiz(handle) => {
                if let Err(e) = handle.send_message(conn_id, user.clone(), other).await {
                    send(event_tx, ServerEvent::error(e.to_string())).await;
                }
            }
            Attachment::Battle(handle) => {
                if let Err(e) = handle.send_message(conn_id, user.clone(), other).await {
                    send(event_tx, ServerEvent::error(e.to_string())).await;
                }
            }
            Attachment::None => {
                send(event_tx, ServerEvent::error("Not in a room")).await;
            }
        },
    }
}

/// Queues an event for this connection. Unlike room broadcasts, the
/// gateway's own replies wait for queue space.
async fn send(event_tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    let _ = event_tx.send(event).await;
}
