//! Room session state: participants, chat log, and the playback clock.
//!
//! A `Room` is only ever mutated by the gateway's intent handlers, which
//! run one at a time per room (the registry hands out exclusive access).
//! Every clock mutation stamps `last_sync_ms` and bumps `seq`, so clients
//! can extrapolate the live position and discard stale broadcasts.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RoomError;
use crate::protocol::VideoState;
use crate::queue::{AdvanceGuard, QueueItem};
use crate::youtube;

/// Chat log keeps only the most recent messages
pub const CHAT_LOG_CAP: usize = 200;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}

/// A connected user inside a room. The id is the transport connection id.
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

impl ChatMessage {
    fn system(text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: "system".to_string(),
            user_name: "System".to_string(),
            avatar: "🤖".to_string(),
            text,
            timestamp: now_millis(),
            kind: MessageKind::System,
        }
    }
}

/// Authoritative playback clock. `position_secs` was accurate at
/// `last_sync_ms`; while playing, the live position is extrapolated.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    pub video_id: String,
    pub video_url: String,
    pub is_playing: bool,
    pub position_secs: f64,
    pub last_sync_ms: u64,
    pub playback_rate: f64,
    pub seq: u64,
}

impl PlaybackClock {
    fn new() -> Self {
        Self {
            video_id: String::new(),
            video_url: String::new(),
            is_playing: false,
            position_secs: 0.0,
            last_sync_ms: now_millis(),
            playback_rate: 1.0,
            seq: 0,
        }
    }
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub host_id: Uuid,
    pub participants: HashMap<Uuid, Participant>,
    pub playback: PlaybackClock,
    pub queue: Vec<QueueItem>,
    pub chat_log: Vec<ChatMessage>,
    pub advance_guard: AdvanceGuard,
    pub created_at_ms: u64,
}

impl Room {
    pub fn new(code: String, host: Participant) -> Self {
        let host_id = host.id;
        let mut participants = HashMap::new();
        participants.insert(host_id, host);
        Self {
            code,
            host_id,
            participants,
            playback: PlaybackClock::new(),
            queue: Vec::new(),
            chat_log: Vec::new(),
            advance_guard: AdvanceGuard::default(),
            created_at_ms: now_millis(),
        }
    }

    /// Stamp the clock and advance the broadcast sequence counter
    fn touch(&mut self) {
        self.playback.last_sync_ms = now_millis();
        self.playback.seq += 1;
    }

    /// Parse and load a new video. Resets the clock to a paused start.
    pub fn load_video(&mut self, raw_url: &str, requested_by: &str) -> Result<String, RoomError> {
        let video_id = youtube::extract_video_id(raw_url).ok_or(RoomError::InvalidVideoUrl)?;
        self.reset_clock_to(video_id.clone(), raw_url.to_string());
        self.push_system_message(format!("{requested_by} loaded a new video"));
        Ok(video_id)
    }

    /// Point the clock at a video and reset it (paused, position 0)
    pub(crate) fn reset_clock_to(&mut self, video_id: String, video_url: String) {
        self.playback.video_id = video_id;
        self.playback.video_url = video_url;
        self.playback.is_playing = false;
        self.playback.position_secs = 0.0;
        self.touch();
    }

    pub fn apply_play(&mut self, position_secs: f64) {
        self.playback.is_playing = true;
        self.playback.position_secs = position_secs;
        self.touch();
    }

    pub fn apply_pause(&mut self, position_secs: f64) {
        self.playback.is_playing = false;
        self.playback.position_secs = position_secs;
        self.touch();
    }

    pub fn apply_seek(&mut self, position_secs: f64) {
        self.playback.position_secs = position_secs;
        self.touch();
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback.playback_rate = rate;
        self.touch();
    }

    /// Append a chat message from a participant. Returns None if the
    /// sender is no longer present (raced with a disconnect).
    pub fn append_chat(&mut self, sender_id: Uuid, text: String) -> Option<ChatMessage> {
        let sender = self.participants.get(&sender_id)?;
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            user_id: sender.id.to_string(),
            user_name: sender.name.clone(),
            avatar: sender.avatar.clone(),
            text,
            timestamp: now_millis(),
            kind: MessageKind::Message,
        };
        self.push_message(message.clone());
        Some(message)
    }

    pub fn push_system_message(&mut self, text: String) -> ChatMessage {
        let message = ChatMessage::system(text);
        self.push_message(message.clone());
        message
    }

    fn push_message(&mut self, message: ChatMessage) {
        self.chat_log.push(message);
        if self.chat_log.len() > CHAT_LOG_CAP {
            let excess = self.chat_log.len() - CHAT_LOG_CAP;
            self.chat_log.drain(..excess);
        }
    }

    /// Pure projection of the playback clock for transmission
    pub fn video_state(&self) -> VideoState {
        VideoState {
            video_id: self.playback.video_id.clone(),
            video_url: self.playback.video_url.clone(),
            is_playing: self.playback.is_playing,
            current_time: self.playback.position_secs,
            playback_rate: self.playback.playback_rate,
            timestamp: self.playback.last_sync_ms,
            seq: self.playback.seq,
        }
    }

    pub fn users(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_room() -> Room {
        let host_id = Uuid::new_v4();
        let host = Participant {
            id: host_id,
            name: "Ana".to_string(),
            room_code: "AB2CD3".to_string(),
            avatar: "🎬".to_string(),
        };
        Room::new("AB2CD3".to_string(), host)
    }

    #[test]
    fn test_seq_strictly_increases_across_mutations() {
        let mut room = test_room();
        let mut seqs = vec![room.playback.seq];

        room.load_video("dQw4w9WgXcQ", "Ana").unwrap();
        seqs.push(room.playback.seq);
        room.apply_play(0.0);
        seqs.push(room.playback.seq);
        room.apply_seek(42.0);
        seqs.push(room.playback.seq);
        room.apply_pause(45.0);
        seqs.push(room.playback.seq);
        room.set_playback_rate(1.5);
        seqs.push(room.playback.seq);

        for pair in seqs.windows(2) {
            assert!(pair[1] > pair[0], "seq must be strictly increasing");
        }
    }

    #[test]
    fn test_load_video_resets_clock() {
        let mut room = test_room();
        room.apply_play(100.0);

        room.load_video("https://youtu.be/dQw4w9WgXcQ", "Ana").unwrap();
        assert_eq!(room.playback.video_id, "dQw4w9WgXcQ");
        assert!(!room.playback.is_playing);
        assert_eq!(room.playback.position_secs, 0.0);
        // Loader is named in a system message
        let last = room.chat_log.last().unwrap();
        assert_eq!(last.kind, MessageKind::System);
        assert!(last.text.contains("Ana"));
    }

    #[test]
    fn test_invalid_url_leaves_state_untouched() {
        let mut room = test_room();
        let seq_before = room.playback.seq;
        let err = room.load_video("https://example.com/video", "Ana").unwrap_err();
        assert_eq!(err, RoomError::InvalidVideoUrl);
        assert_eq!(room.playback.seq, seq_before);
        assert!(room.chat_log.is_empty());
    }

    #[test]
    fn test_chat_log_capped_at_200_oldest_evicted() {
        let mut room = test_room();
        let host_id = room.host_id;
        for i in 0..201 {
            room.append_chat(host_id, format!("msg {i}")).unwrap();
        }
        assert_eq!(room.chat_log.len(), CHAT_LOG_CAP);
        assert_eq!(room.chat_log.first().unwrap().text, "msg 1");
        assert_eq!(room.chat_log.last().unwrap().text, "msg 200");
    }

    #[test]
    fn test_chat_from_unknown_participant_is_none() {
        let mut room = test_room();
        assert!(room.append_chat(Uuid::new_v4(), "hello".to_string()).is_none());
        assert!(room.chat_log.is_empty());
    }

    #[test]
    fn test_video_state_projection_matches_clock() {
        let mut room = test_room();
        room.load_video("dQw4w9WgXcQ", "Ana").unwrap();
        room.apply_play(12.5);

        let state = room.video_state();
        assert_eq!(state.video_id, "dQw4w9WgXcQ");
        assert!(state.is_playing);
        assert_eq!(state.current_time, 12.5);
        assert_eq!(state.seq, room.playback.seq);
        assert_eq!(state.timestamp, room.playback.last_sync_ms);
    }
}
