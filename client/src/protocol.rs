//! Wire types exchanged with the server (must match the server protocol).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client -> server intents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    #[serde(rename = "room:create")]
    CreateRoom { user_name: String },
    #[serde(rename = "room:join")]
    JoinRoom { room_id: String, user_name: String },
    #[serde(rename = "room:leave")]
    LeaveRoom,
    #[serde(rename = "video:load")]
    LoadVideo { url: String },
    #[serde(rename = "video:play")]
    Play { current_time: f64 },
    #[serde(rename = "video:pause")]
    Pause { current_time: f64 },
    #[serde(rename = "video:seek")]
    Seek { current_time: f64 },
    #[serde(rename = "video:rate")]
    SetRate { rate: f64 },
    #[serde(rename = "video:ended")]
    VideoEnded,
    #[serde(rename = "queue:add")]
    QueueAdd { url: String },
    #[serde(rename = "queue:remove")]
    QueueRemove { item_id: String },
    #[serde(rename = "queue:reorder")]
    QueueReorder { item_id: String, new_index: usize },
    #[serde(rename = "queue:play")]
    QueuePlay { item_id: String },
    #[serde(rename = "queue:play-next")]
    QueuePlayNext,
    #[serde(rename = "chat:message")]
    Chat { text: String },
}

/// Server -> client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "room:created")]
    RoomCreated { room_id: String, user_id: Uuid },
    #[serde(rename = "room:joined")]
    RoomJoined {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
    },
    #[serde(rename = "room:state")]
    RoomState {
        room_id: String,
        users: Vec<Participant>,
        host_id: Uuid,
        video_state: VideoState,
        messages: Vec<ChatMessage>,
        queue: Vec<QueueItem>,
    },
    #[serde(rename = "room:user-joined")]
    UserJoined { user: Participant },
    #[serde(rename = "room:user-left")]
    UserLeft { user_id: Uuid, user_name: String },
    #[serde(rename = "room:host-changed")]
    HostChanged { host_id: Uuid },
    #[serde(rename = "video:state-update")]
    VideoStateUpdate(VideoState),
    #[serde(rename = "video:load")]
    VideoLoad { video_id: String, video_url: String },
    #[serde(rename = "queue:update")]
    QueueUpdate { queue: Vec<QueueItem> },
    #[serde(rename = "chat:message")]
    Chat(ChatMessage),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Authoritative playback clock snapshot. `timestamp` is the server
/// wall-clock instant (epoch millis) at which `current_time` was
/// accurate; `seq` orders broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub video_id: String,
    pub video_url: String,
    pub is_playing: bool,
    pub current_time: f64,
    pub playback_rate: f64,
    pub timestamp: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "roomId")]
    pub room_code: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub avatar: String,
    pub text: String,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub video_id: String,
    pub video_url: String,
    pub title: String,
    pub added_by: String,
    pub added_at: u64,
}
