//! Session Gateway: turns inbound client intents into room mutations and
//! fans the resulting state out to the room's participants.
//!
//! Create/join reply to the caller only; play/pause/seek/rate broadcasts
//! skip the actor (their player already reflects the change and the
//! reconciler's guard window covers the echo); everything else goes to
//! the whole room. Failures are sent to the acting connection alone.

use axum::extract::ws::{Message as AxumWsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::comments::CommentsCache;
use crate::error::RoomError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::Registry;
use crate::youtube;

pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;
pub type ClientSenders = Arc<RwLock<HashMap<Uuid, ClientSender>>>;

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// When set, `video:load` and `video:rate` require host privilege.
    /// Play/pause/seek are open to every participant either way.
    pub host_controls: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub senders: ClientSenders,
    pub config: ServerConfig,
    pub http: reqwest::Client,
    pub comments: Arc<CommentsCache>,
}

pub async fn ws_endpoint(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    tracing::info!("Client {} connected", client_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.senders.write().await.insert(client_id, tx.clone());

    // Outbound pump: serialize and push room events to this client
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!("Failed to serialize message: {}", err);
                    continue;
                }
            };
            if ws_sender.send(AxumWsMessage::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(AxumWsMessage::Text(text)) => {
                if let Err(err) = handle_message(&text, client_id, &state).await {
                    tracing::error!("Error handling message from {}: {}", client_id, err);
                    let _ = tx.send(ServerMessage::Error {
                        message: err.to_string(),
                    });
                }
            }
            Ok(AxumWsMessage::Close(_)) => {
                tracing::info!("Client {} closing connection", client_id);
                break;
            }
            Err(err) => {
                tracing::error!("WebSocket error for {}: {}", client_id, err);
                break;
            }
            _ => {}
        }
    }

    state.senders.write().await.remove(&client_id);
    process_leave(&state, client_id).await;
    send_task.abort();
    tracing::info!("Client {} disconnected", client_id);
}

async fn handle_message(text: &str, client_id: Uuid, state: &AppState) -> anyhow::Result<()> {
    let msg: ClientMessage = serde_json::from_str(text)?;

    match msg {
        ClientMessage::CreateRoom { user_name } => {
            let (code, _host) = state.registry.create_room(client_id, &user_name);
            send_to(
                state,
                client_id,
                ServerMessage::RoomCreated {
                    room_id: code.clone(),
                    user_id: client_id,
                },
            )
            .await;
            send_room_state(state, client_id, &code).await;
        }

        ClientMessage::JoinRoom { room_id, user_name } => {
            match state.registry.join_room(client_id, &room_id, &user_name) {
                Err(err) => {
                    send_to(
                        state,
                        client_id,
                        ServerMessage::RoomJoined {
                            success: false,
                            error: Some(err.to_string()),
                            user_id: None,
                        },
                    )
                    .await;
                }
                Ok(outcome) => {
                    send_to(
                        state,
                        client_id,
                        ServerMessage::RoomJoined {
                            success: true,
                            error: None,
                            user_id: Some(client_id),
                        },
                    )
                    .await;
                    send_room_state(state, client_id, &outcome.room_code).await;
                    broadcast(
                        state,
                        &outcome.room_code,
                        ServerMessage::UserJoined {
                            user: outcome.participant,
                        },
                        Some(client_id),
                    )
                    .await;
                    broadcast(
                        state,
                        &outcome.room_code,
                        ServerMessage::Chat(outcome.system_message),
                        None,
                    )
                    .await;
                }
            }
        }

        ClientMessage::LeaveRoom => {
            process_leave(state, client_id).await;
        }

        ClientMessage::LoadVideo { url } => {
            let result = state.registry.with_participant_room(client_id, |room, actor| {
                if state.config.host_controls && room.host_id != actor.id {
                    return Err(RoomError::NotHost);
                }
                let video_id = room.load_video(&url, &actor.name)?;
                Ok((
                    room.code.clone(),
                    video_id,
                    room.video_state(),
                    room.chat_log.last().cloned(),
                ))
            });
            match result {
                // Connection is in no room: defensive no-op
                None => {}
                Some(Err(err)) => send_error(state, client_id, &err).await,
                Some(Ok((code, video_id, video_state, system_message))) => {
                    broadcast(
                        state,
                        &code,
                        ServerMessage::VideoLoad {
                            video_id,
                            video_url: url,
                        },
                        None,
                    )
                    .await;
                    broadcast(state, &code, ServerMessage::VideoStateUpdate(video_state), None)
                        .await;
                    if let Some(message) = system_message {
                        broadcast(state, &code, ServerMessage::Chat(message), None).await;
                    }
                }
            }
        }

        ClientMessage::Play { current_time } => {
            apply_clock_mutation(state, client_id, |room| room.apply_play(current_time)).await;
        }

        ClientMessage::Pause { current_time } => {
            apply_clock_mutation(state, client_id, |room| room.apply_pause(current_time)).await;
        }

        ClientMessage::Seek { current_time } => {
            apply_clock_mutation(state, client_id, |room| room.apply_seek(current_time)).await;
        }

        ClientMessage::SetRate { rate } => {
            let result = state.registry.with_participant_room(client_id, |room, actor| {
                if state.config.host_controls && room.host_id != actor.id {
                    return Err(RoomError::NotHost);
                }
                room.set_playback_rate(rate);
                Ok((room.code.clone(), room.video_state()))
            });
            match result {
                None => {}
                Some(Err(err)) => send_error(state, client_id, &err).await,
                Some(Ok((code, video_state))) => {
                    broadcast(
                        state,
                        &code,
                        ServerMessage::VideoStateUpdate(video_state),
                        Some(client_id),
                    )
                    .await;
                }
            }
        }

        ClientMessage::VideoEnded | ClientMessage::QueuePlayNext => {
            let advanced = state
                .registry
                .with_participant_room(client_id, |room, _| {
                    room.advance_queue().map(|item| {
                        (
                            room.code.clone(),
                            item,
                            room.video_state(),
                            room.queue.clone(),
                        )
                    })
                })
                .flatten();
            if let Some((code, item, video_state, queue)) = advanced {
                broadcast(
                    state,
                    &code,
                    ServerMessage::VideoLoad {
                        video_id: item.video_id,
                        video_url: item.video_url,
                    },
                    None,
                )
                .await;
                broadcast(state, &code, ServerMessage::VideoStateUpdate(video_state), None).await;
                broadcast(state, &code, ServerMessage::QueueUpdate { queue }, None).await;
            }
        }

        ClientMessage::QueueAdd { url } => {
            let result = state.registry.with_participant_room(client_id, |room, actor| {
                room.enqueue(&url, &actor.name)
                    .map(|item| (room.code.clone(), item, room.queue.clone()))
            });
            match result {
                None => {}
                Some(Err(err)) => send_error(state, client_id, &err).await,
                Some(Ok((code, item, queue))) => {
                    broadcast(state, &code, ServerMessage::QueueUpdate { queue }, None).await;
                    tokio::spawn(backfill_title(state.clone(), code, item.id, item.video_id));
                }
            }
        }

        ClientMessage::QueueRemove { item_id } => {
            let result = state.registry.with_participant_room(client_id, |room, _| {
                room.remove_queued(&item_id);
                (room.code.clone(), room.queue.clone())
            });
            if let Some((code, queue)) = result {
                broadcast(state, &code, ServerMessage::QueueUpdate { queue }, None).await;
            }
        }

        ClientMessage::QueueReorder { item_id, new_index } => {
            let result = state.registry.with_participant_room(client_id, |room, _| {
                room.reorder_queued(&item_id, new_index);
                (room.code.clone(), room.queue.clone())
            });
            if let Some((code, queue)) = result {
                broadcast(state, &code, ServerMessage::QueueUpdate { queue }, None).await;
            }
        }

        ClientMessage::QueuePlay { item_id } => {
            let result = state
                .registry
                .with_participant_room(client_id, |room, _| {
                    room.play_queued_now(&item_id).map(|item| {
                        (
                            room.code.clone(),
                            item,
                            room.video_state(),
                            room.queue.clone(),
                        )
                    })
                })
                .flatten();
            if let Some((code, item, video_state, queue)) = result {
                broadcast(
                    state,
                    &code,
                    ServerMessage::VideoLoad {
                        video_id: item.video_id,
                        video_url: item.video_url,
                    },
                    None,
                )
                .await;
                broadcast(state, &code, ServerMessage::VideoStateUpdate(video_state), None).await;
                broadcast(state, &code, ServerMessage::QueueUpdate { queue }, None).await;
            }
        }

        ClientMessage::Chat { text } => {
            let result = state
                .registry
                .with_participant_room(client_id, |room, _| {
                    room.append_chat(client_id, text)
                        .map(|message| (room.code.clone(), message))
                })
                .flatten();
            if let Some((code, message)) = result {
                broadcast(state, &code, ServerMessage::Chat(message), None).await;
            }
        }
    }

    Ok(())
}

/// Play/pause/seek: any participant may drive the clock; the new state
/// is pushed to everyone but the actor.
async fn apply_clock_mutation(
    state: &AppState,
    client_id: Uuid,
    mutate: impl FnOnce(&mut crate::room::Room),
) {
    let result = state.registry.with_participant_room(client_id, |room, _| {
        mutate(room);
        (room.code.clone(), room.video_state())
    });
    if let Some((code, video_state)) = result {
        broadcast(
            state,
            &code,
            ServerMessage::VideoStateUpdate(video_state),
            Some(client_id),
        )
        .await;
    }
}

/// Shared by `room:leave` and socket close
async fn process_leave(state: &AppState, client_id: Uuid) {
    let Some(outcome) = state.registry.leave_room(client_id) else {
        return;
    };
    if outcome.destroyed {
        return;
    }

    broadcast(
        state,
        &outcome.room_code,
        ServerMessage::UserLeft {
            user_id: outcome.participant.id,
            user_name: outcome.participant.name.clone(),
        },
        None,
    )
    .await;
    if let Some(message) = outcome.system_message {
        broadcast(state, &outcome.room_code, ServerMessage::Chat(message), None).await;
    }
    if let Some(host_id) = outcome.new_host_id {
        broadcast(
            state,
            &outcome.room_code,
            ServerMessage::HostChanged { host_id },
            None,
        )
        .await;
    }
}

/// Resolve the queued item's real title and republish the queue. The
/// placeholder stays if the lookup fails or the item is already gone.
async fn backfill_title(state: AppState, code: String, item_id: String, video_id: String) {
    let title = youtube::lookup_title(&state.http, &video_id).await;
    if title == video_id {
        return;
    }
    let updated = state
        .registry
        .with_room(&code, |room| {
            room.set_queued_title(&item_id, title)
                .then(|| room.queue.clone())
        })
        .flatten();
    if let Some(queue) = updated {
        broadcast(&state, &code, ServerMessage::QueueUpdate { queue }, None).await;
    }
}

async fn send_room_state(state: &AppState, client_id: Uuid, code: &str) {
    let snapshot = state.registry.with_room(code, |room| ServerMessage::RoomState {
        room_id: room.code.clone(),
        users: room.users(),
        host_id: room.host_id,
        video_state: room.video_state(),
        messages: room.chat_log.clone(),
        queue: room.queue.clone(),
    });
    if let Some(msg) = snapshot {
        send_to(state, client_id, msg).await;
    }
}

async fn send_error(state: &AppState, client_id: Uuid, err: &RoomError) {
    send_to(
        state,
        client_id,
        ServerMessage::Error {
            message: err.to_string(),
        },
    )
    .await;
}

async fn send_to(state: &AppState, client_id: Uuid, msg: ServerMessage) {
    if let Some(tx) = state.senders.read().await.get(&client_id) {
        let _ = tx.send(msg);
    }
}

async fn broadcast(state: &AppState, code: &str, msg: ServerMessage, exclude: Option<Uuid>) {
    let members = state
        .registry
        .with_room(code, |room| room.participants.keys().copied().collect::<Vec<_>>())
        .unwrap_or_default();

    let senders = state.senders.read().await;
    for member_id in members {
        if Some(member_id) == exclude {
            continue;
        }
        if let Some(tx) = senders.get(&member_id) {
            let _ = tx.send(msg.clone());
        }
    }
}
