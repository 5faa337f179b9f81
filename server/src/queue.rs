//! Shared video queue: a FIFO with manual reorder, capped at 50 items.
//!
//! Advancing the queue is the one operation racing across participants:
//! several clients report `video:ended` for the same video at nearly the
//! same time. `AdvanceGuard` admits only the first signal per cooldown
//! window so the queue pops exactly once.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RoomError;
use crate::room::{now_millis, Room};

pub const QUEUE_CAP: usize = 50;
const ADVANCE_COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub video_id: String,
    pub video_url: String,
    /// Defaults to the video id; backfilled with the real title later
    pub title: String,
    pub added_by: String,
    pub added_at: u64,
}

/// Short-lived mutual exclusion for queue advances. Not a general lock:
/// it only suppresses duplicate "video ended" triggers within a window.
#[derive(Debug)]
pub struct AdvanceGuard {
    acquired_at: Option<Instant>,
    cooldown: Duration,
}

impl Default for AdvanceGuard {
    fn default() -> Self {
        Self::new(ADVANCE_COOLDOWN)
    }
}

impl AdvanceGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            acquired_at: None,
            cooldown,
        }
    }

    /// True for the first caller; false for anyone else until the
    /// cooldown elapses.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        match self.acquired_at {
            Some(at) if now.duration_since(at) < self.cooldown => false,
            _ => {
                self.acquired_at = Some(now);
                true
            }
        }
    }
}

impl Room {
    /// Add a video to the queue. The item is created synchronously with
    /// the video id as a placeholder title; the caller backfills the real
    /// title asynchronously.
    pub fn enqueue(&mut self, raw_url: &str, added_by: &str) -> Result<QueueItem, RoomError> {
        if self.queue.len() >= QUEUE_CAP {
            return Err(RoomError::QueueFull(QUEUE_CAP));
        }
        let video_id =
            crate::youtube::extract_video_id(raw_url).ok_or(RoomError::InvalidVideoUrl)?;
        let item = QueueItem {
            id: Uuid::new_v4().to_string(),
            title: video_id.clone(),
            video_id,
            video_url: raw_url.to_string(),
            added_by: added_by.to_string(),
            added_at: now_millis(),
        };
        self.queue.push(item.clone());
        Ok(item)
    }

    /// Remove by id. Absent ids are a no-op, so retries are harmless.
    pub fn remove_queued(&mut self, item_id: &str) {
        self.queue.retain(|item| item.id != item_id);
    }

    /// Move an item to `new_index`, clamped into bounds after removal.
    /// No-op if the item is gone.
    pub fn reorder_queued(&mut self, item_id: &str, new_index: usize) {
        let Some(from) = self.queue.iter().position(|item| item.id == item_id) else {
            return;
        };
        let item = self.queue.remove(from);
        let to = new_index.min(self.queue.len());
        self.queue.insert(to, item);
    }

    /// Pop the front of the queue into the playback clock. Returns None
    /// when the queue is empty or another advance just happened (the
    /// guard swallows near-simultaneous "video ended" duplicates).
    pub fn advance_queue(&mut self) -> Option<QueueItem> {
        if self.queue.is_empty() {
            return None;
        }
        if !self.advance_guard.try_acquire() {
            return None;
        }
        let item = self.queue.remove(0);
        self.reset_clock_to(item.video_id.clone(), item.video_url.clone());
        Some(item)
    }

    /// Load an arbitrary queued item immediately, leaving the rest of
    /// the queue in place.
    pub fn play_queued_now(&mut self, item_id: &str) -> Option<QueueItem> {
        let index = self.queue.iter().position(|item| item.id == item_id)?;
        let item = self.queue.remove(index);
        self.reset_clock_to(item.video_id.clone(), item.video_url.clone());
        Some(item)
    }

    /// Backfill a resolved title. Returns false if the item has since
    /// been removed or played.
    pub fn set_queued_title(&mut self, item_id: &str, title: String) -> bool {
        match self.queue.iter_mut().find(|item| item.id == item_id) {
            Some(item) => {
                item.title = title;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::Participant;

    fn test_room() -> Room {
        let host_id = Uuid::new_v4();
        let host = Participant {
            id: host_id,
            name: "Ana".to_string(),
            room_code: "AB2CD3".to_string(),
            avatar: "🍿".to_string(),
        };
        Room::new("AB2CD3".to_string(), host)
    }

    #[test]
    fn test_enqueue_uses_video_id_as_placeholder_title() {
        let mut room = test_room();
        let item = room
            .enqueue("https://youtube.com/watch?v=dQw4w9WgXcQ", "Ana")
            .unwrap();
        assert_eq!(item.video_id, "dQw4w9WgXcQ");
        assert_eq!(item.title, "dQw4w9WgXcQ");
        assert_eq!(item.added_by, "Ana");
        assert_eq!(room.queue.len(), 1);
    }

    #[test]
    fn test_enqueue_rejects_51st_item_queue_unchanged() {
        let mut room = test_room();
        for _ in 0..QUEUE_CAP {
            room.enqueue("dQw4w9WgXcQ", "Ana").unwrap();
        }
        let before: Vec<String> = room.queue.iter().map(|i| i.id.clone()).collect();

        let err = room.enqueue("dQw4w9WgXcQ", "Ana").unwrap_err();
        assert_eq!(err, RoomError::QueueFull(QUEUE_CAP));
        assert_eq!(room.queue.len(), QUEUE_CAP);
        let after: Vec<String> = room.queue.iter().map(|i| i.id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_enqueue_rejects_bad_url() {
        let mut room = test_room();
        let err = room.enqueue("https://example.com/video", "Ana").unwrap_err();
        assert_eq!(err, RoomError::InvalidVideoUrl);
        assert!(room.queue.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut room = test_room();
        let item = room.enqueue("dQw4w9WgXcQ", "Ana").unwrap();
        room.remove_queued(&item.id);
        assert!(room.queue.is_empty());
        // Second removal of the same id is a quiet no-op
        room.remove_queued(&item.id);
        assert!(room.queue.is_empty());
    }

    #[test]
    fn test_reorder_clamps_index() {
        let mut room = test_room();
        let a = room.enqueue("aaaaaaaaaaa", "Ana").unwrap();
        let _b = room.enqueue("bbbbbbbbbbb", "Ana").unwrap();
        let _c = room.enqueue("ccccccccccc", "Ana").unwrap();

        room.reorder_queued(&a.id, 99);
        assert_eq!(room.queue.last().unwrap().id, a.id);

        room.reorder_queued(&a.id, 0);
        assert_eq!(room.queue.first().unwrap().id, a.id);

        // Unknown item is a no-op
        let order: Vec<String> = room.queue.iter().map(|i| i.id.clone()).collect();
        room.reorder_queued("nope", 1);
        let after: Vec<String> = room.queue.iter().map(|i| i.id.clone()).collect();
        assert_eq!(order, after);
    }

    #[test]
    fn test_advance_pops_front_and_resets_clock() {
        let mut room = test_room();
        let first = room.enqueue("aaaaaaaaaaa", "Ana").unwrap();
        room.enqueue("bbbbbbbbbbb", "Ana").unwrap();
        let seq_before = room.playback.seq;

        let popped = room.advance_queue().unwrap();
        assert_eq!(popped.id, first.id);
        assert_eq!(room.playback.video_id, "aaaaaaaaaaa");
        assert!(!room.playback.is_playing);
        assert_eq!(room.playback.position_secs, 0.0);
        assert!(room.playback.seq > seq_before);
        assert_eq!(room.queue.len(), 1);
    }

    #[test]
    fn test_concurrent_ended_signals_advance_once() {
        let mut room = test_room();
        room.enqueue("aaaaaaaaaaa", "Ana").unwrap();
        room.enqueue("bbbbbbbbbbb", "Ana").unwrap();

        assert!(room.advance_queue().is_some());
        // Second signal lands inside the cooldown window
        assert!(room.advance_queue().is_none());
        assert_eq!(room.queue.len(), 1);
        assert_eq!(room.playback.video_id, "aaaaaaaaaaa");
    }

    #[test]
    fn test_advance_allowed_after_cooldown() {
        let mut room = test_room();
        room.advance_guard = AdvanceGuard::new(Duration::from_millis(20));
        room.enqueue("aaaaaaaaaaa", "Ana").unwrap();
        room.enqueue("bbbbbbbbbbb", "Ana").unwrap();

        assert!(room.advance_queue().is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(room.advance_queue().is_some());
        assert!(room.queue.is_empty());
    }

    #[test]
    fn test_advance_on_empty_queue_is_none() {
        let mut room = test_room();
        assert!(room.advance_queue().is_none());
        // An empty-queue signal must not consume the guard
        room.enqueue("aaaaaaaaaaa", "Ana").unwrap();
        assert!(room.advance_queue().is_some());
    }

    #[test]
    fn test_play_now_takes_middle_item() {
        let mut room = test_room();
        let _a = room.enqueue("aaaaaaaaaaa", "Ana").unwrap();
        let b = room.enqueue("bbbbbbbbbbb", "Ana").unwrap();
        let _c = room.enqueue("ccccccccccc", "Ana").unwrap();

        let played = room.play_queued_now(&b.id).unwrap();
        assert_eq!(played.id, b.id);
        assert_eq!(room.playback.video_id, "bbbbbbbbbbb");
        assert_eq!(room.queue.len(), 2);
        assert!(room.play_queued_now("nope").is_none());
    }

    #[test]
    fn test_title_backfill() {
        let mut room = test_room();
        let item = room.enqueue("dQw4w9WgXcQ", "Ana").unwrap();
        assert!(room.set_queued_title(&item.id, "Never Gonna Give You Up".to_string()));
        assert_eq!(room.queue[0].title, "Never Gonna Give You Up");

        room.remove_queued(&item.id);
        assert!(!room.set_queued_title(&item.id, "gone".to_string()));
    }
}
