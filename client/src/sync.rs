//! WebSocket transport to the room server.
//!
//! Intents are fire-and-forget except create/join, whose acknowledgements
//! (`room:created` / `room:joined`) arrive through the message callback;
//! call [`SyncClient::set_session`] when they do.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use uuid::Uuid;

use crate::protocol::{ClientMessage, ServerMessage};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(12);

pub struct SyncClient {
    inner: Arc<SyncState>,
}

struct SyncState {
    tx: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    room_id: Mutex<Option<String>>,
    user_id: Mutex<Option<Uuid>>,
}

impl Default for SyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SyncState {
                tx: Mutex::new(None),
                room_id: Mutex::new(None),
                user_id: Mutex::new(None),
            }),
        }
    }

    /// Connect to the server. `on_message` is invoked for every inbound
    /// event. The returned receiver resolves when the socket closes.
    pub async fn connect<F>(&self, server_url: &str, on_message: F) -> Result<oneshot::Receiver<()>>
    where
        F: Fn(ServerMessage) + Send + Sync + 'static,
    {
        let (ws_stream, _) = connect_async(server_url)
            .await
            .context("Failed to connect to server")?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        *self.inner.tx.lock() = Some(tx.clone());

        let (disconnect_tx, disconnect_rx) = oneshot::channel();
        let disconnect_signal = Arc::new(Mutex::new(Some(disconnect_tx)));

        // Sender task
        let send_inner = Arc::clone(&self.inner);
        let send_signal = Arc::clone(&disconnect_signal);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if ws_sender.send(msg).await.is_err() {
                    break;
                }
            }
            *send_inner.tx.lock() = None;
            if let Some(tx) = send_signal.lock().take() {
                let _ = tx.send(());
            }
        });

        // Receiver task
        let handler = Arc::new(on_message);
        let recv_inner = Arc::clone(&self.inner);
        let recv_signal = Arc::clone(&disconnect_signal);
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerMessage>(&text)
                    {
                        Ok(parsed) => handler(parsed),
                        Err(err) => tracing::warn!("Unparseable server message: {}", err),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Err(_) => break,
                    _ => {}
                }
            }
            *recv_inner.tx.lock() = None;
            if let Some(tx) = recv_signal.lock().take() {
                let _ = tx.send(());
            }
        });

        // Keep-alive pings
        let ping_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                sleep(KEEPALIVE_INTERVAL).await;
                let Some(tx) = ping_inner.tx.lock().clone() else {
                    break;
                };
                if tx.send(WsMessage::Ping(Vec::new().into())).is_err() {
                    break;
                }
            }
        });

        Ok(disconnect_rx)
    }

    pub fn create_room(&self, user_name: String) -> Result<()> {
        self.send(ClientMessage::CreateRoom { user_name })
    }

    pub fn join_room(&self, room_id: String, user_name: String) -> Result<()> {
        self.send(ClientMessage::JoinRoom { room_id, user_name })
    }

    pub fn leave_room(&self) -> Result<()> {
        self.clear_session();
        self.send(ClientMessage::LeaveRoom)
    }

    pub fn load_video(&self, url: String) -> Result<()> {
        self.send(ClientMessage::LoadVideo { url })
    }

    pub fn play(&self, current_time: f64) -> Result<()> {
        self.send(ClientMessage::Play { current_time })
    }

    pub fn pause(&self, current_time: f64) -> Result<()> {
        self.send(ClientMessage::Pause { current_time })
    }

    pub fn seek(&self, current_time: f64) -> Result<()> {
        self.send(ClientMessage::Seek { current_time })
    }

    pub fn set_rate(&self, rate: f64) -> Result<()> {
        self.send(ClientMessage::SetRate { rate })
    }

    pub fn video_ended(&self) -> Result<()> {
        self.send(ClientMessage::VideoEnded)
    }

    pub fn queue_add(&self, url: String) -> Result<()> {
        self.send(ClientMessage::QueueAdd { url })
    }

    pub fn queue_remove(&self, item_id: String) -> Result<()> {
        self.send(ClientMessage::QueueRemove { item_id })
    }

    pub fn queue_reorder(&self, item_id: String, new_index: usize) -> Result<()> {
        self.send(ClientMessage::QueueReorder { item_id, new_index })
    }

    pub fn queue_play(&self, item_id: String) -> Result<()> {
        self.send(ClientMessage::QueuePlay { item_id })
    }

    pub fn queue_play_next(&self) -> Result<()> {
        self.send(ClientMessage::QueuePlayNext)
    }

    pub fn send_chat(&self, text: String) -> Result<()> {
        self.send(ClientMessage::Chat { text })
    }

    /// Record identity from a create/join acknowledgement
    pub fn set_session(&self, room_id: String, user_id: Uuid) {
        *self.inner.room_id.lock() = Some(room_id);
        *self.inner.user_id.lock() = Some(user_id);
    }

    pub fn clear_session(&self) {
        *self.inner.room_id.lock() = None;
        *self.inner.user_id.lock() = None;
    }

    pub fn room_id(&self) -> Option<String> {
        self.inner.room_id.lock().clone()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        *self.inner.user_id.lock()
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&msg).context("Failed to serialize message")?;
        let tx = self
            .inner
            .tx
            .lock()
            .clone()
            .context("Not connected to server")?;
        tx.send(WsMessage::Text(json.into()))
            .context("Failed to queue message to socket")?;
        Ok(())
    }
}
