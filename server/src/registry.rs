//! In-memory room registry: code generation, lookup, and lifecycle.
//!
//! Constructed once at process start and injected into the gateway; no
//! process-wide statics. A reverse index resolves "which room does this
//! connection belong to" without scanning every room.

use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::error::RoomError;
use crate::room::{ChatMessage, Participant, Room};

const LOG_TAG: &str = "[WatchParty]";

/// Excludes 0/O, 1/I and other easily-confused glyphs
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_LEN: usize = 6;

const MAX_NAME_LEN: usize = 20;

const AVATARS: &[&str] = &[
    "🎬", "🍿", "🎮", "🎵", "🎨", "🚀", "⚡", "🔥", "💎", "🌟", "🎯", "🎪", "🎭", "🎸", "🎺", "🎻",
];

pub struct Registry {
    /// All live rooms: code -> Room
    rooms: DashMap<String, Room>,
    /// Reverse index: participant id -> room code
    members: DashMap<Uuid, String>,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub room_code: String,
    pub participant: Participant,
    pub system_message: ChatMessage,
}

pub struct LeaveOutcome {
    pub room_code: String,
    pub participant: Participant,
    /// Set when the departing participant was host and the room survives
    pub new_host_id: Option<Uuid>,
    /// True when the room emptied out and was destroyed
    pub destroyed: bool,
    /// Departure notice for the survivors (absent when destroyed)
    pub system_message: Option<ChatMessage>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            members: DashMap::new(),
        }
    }

    /// Create a room with the caller as sole participant and host.
    pub fn create_room(&self, host_id: Uuid, name: &str) -> (String, Participant) {
        let code = self.generate_room_code();
        let host = Participant {
            id: host_id,
            name: sanitize_name(name, host_id),
            room_code: code.clone(),
            avatar: random_avatar(),
        };
        self.rooms.insert(code.clone(), Room::new(code.clone(), host.clone()));
        self.members.insert(host_id, code.clone());
        tracing::info!("{LOG_TAG} Room {} created by {}", code, host.name);
        (code, host)
    }

    /// Join an existing room by code (case-insensitive). Appends the
    /// "{name} joined" system message to the room's chat log.
    pub fn join_room(
        &self,
        participant_id: Uuid,
        code: &str,
        name: &str,
    ) -> Result<JoinOutcome, RoomError> {
        let code = code.trim().to_uppercase();
        let mut room = self.rooms.get_mut(&code).ok_or(RoomError::RoomNotFound)?;

        let participant = Participant {
            id: participant_id,
            name: sanitize_name(name, participant_id),
            room_code: code.clone(),
            avatar: random_avatar(),
        };
        room.participants.insert(participant_id, participant.clone());
        let system_message =
            room.push_system_message(format!("{} joined the room", participant.name));
        drop(room);

        self.members.insert(participant_id, code.clone());
        tracing::info!("{LOG_TAG} {} joined room {}", participant.name, code);
        Ok(JoinOutcome {
            room_code: code,
            participant,
            system_message,
        })
    }

    /// Remove a participant from whatever room it is in. Destroys the
    /// room the instant it becomes empty; otherwise reassigns the host
    /// if the departed participant held it.
    pub fn leave_room(&self, participant_id: Uuid) -> Option<LeaveOutcome> {
        let (_, code) = self.members.remove(&participant_id)?;

        let mut room = self.rooms.get_mut(&code)?;
        let participant = room.participants.remove(&participant_id)?;

        if room.participants.is_empty() {
            drop(room);
            self.rooms.remove(&code);
            tracing::info!("{LOG_TAG} Room {} deleted (empty)", code);
            return Some(LeaveOutcome {
                room_code: code,
                participant,
                new_host_id: None,
                destroyed: true,
                system_message: None,
            });
        }

        let system_message =
            room.push_system_message(format!("{} left the room", participant.name));

        let mut new_host_id = None;
        if room.host_id == participant_id {
            // First remaining participant by iteration order
            if let Some(next_host) = room.participants.keys().next().copied() {
                room.host_id = next_host;
                new_host_id = Some(next_host);
                tracing::info!("{LOG_TAG} Host of {} passed to {}", code, next_host);
            }
        }

        drop(room);
        tracing::info!("{LOG_TAG} {} left room {}", participant.name, code);
        Some(LeaveOutcome {
            room_code: code,
            participant,
            new_host_id,
            destroyed: false,
            system_message: Some(system_message),
        })
    }

    /// Resolve the room a connection belongs to
    pub fn room_code_of(&self, participant_id: Uuid) -> Option<String> {
        self.members.get(&participant_id).map(|code| code.clone())
    }

    /// Run `f` with exclusive access to a room. Callers must not block
    /// or await while inside.
    pub fn with_room<T>(&self, code: &str, f: impl FnOnce(&mut Room) -> T) -> Option<T> {
        self.rooms.get_mut(code).map(|mut room| f(&mut room))
    }

    /// Exclusive access to the acting participant's room, plus their
    /// display name. None when the connection is in no room.
    pub fn with_participant_room<T>(
        &self,
        participant_id: Uuid,
        f: impl FnOnce(&mut Room, &Participant) -> T,
    ) -> Option<T> {
        let code = self.room_code_of(participant_id)?;
        let mut room = self.rooms.get_mut(&code)?;
        let participant = room.participants.get(&participant_id)?.clone();
        Some(f(&mut room, &participant))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn participant_count(&self) -> usize {
        self.members.len()
    }

    fn generate_room_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                break code;
            }
        }
    }
}

fn random_avatar() -> String {
    AVATARS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("🎬")
        .to_string()
}

fn sanitize_name(raw: &str, participant_id: Uuid) -> String {
    let mut cleaned = String::with_capacity(raw.len().min(MAX_NAME_LEN));
    for ch in raw.trim().chars() {
        if ch.is_control() {
            continue;
        }
        if cleaned.chars().count() >= MAX_NAME_LEN {
            break;
        }
        cleaned.push(ch);
    }
    if cleaned.is_empty() {
        let short = &participant_id.to_string()[..8];
        format!("Guest {short}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_shape() {
        let registry = Registry::new();
        let (code, _) = registry.create_room(Uuid::new_v4(), "Ana");
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(code
            .bytes()
            .all(|b| ROOM_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_create_then_join_case_insensitive() {
        let registry = Registry::new();
        let (code, host) = registry.create_room(Uuid::new_v4(), "Ana");
        assert_eq!(host.room_code, code);

        let joiner = Uuid::new_v4();
        let outcome = registry
            .join_room(joiner, &code.to_lowercase(), "Ben")
            .unwrap();
        assert_eq!(outcome.room_code, code);
        assert_eq!(outcome.participant.name, "Ben");
        assert!(outcome.system_message.text.contains("Ben joined"));
        assert_eq!(registry.room_code_of(joiner), Some(code));
    }

    #[test]
    fn test_join_unknown_code_fails() {
        let registry = Registry::new();
        let err = registry
            .join_room(Uuid::new_v4(), "ZZZZZZ", "Ben")
            .unwrap_err();
        assert_eq!(err, RoomError::RoomNotFound);
    }

    #[test]
    fn test_sole_participant_leaving_destroys_room() {
        let registry = Registry::new();
        let host_id = Uuid::new_v4();
        let (code, _) = registry.create_room(host_id, "Ana");

        let outcome = registry.leave_room(host_id).unwrap();
        assert!(outcome.destroyed);
        assert!(outcome.new_host_id.is_none());
        assert!(outcome.system_message.is_none());

        // The code is unresolvable thereafter
        let err = registry.join_room(Uuid::new_v4(), &code, "Ben").unwrap_err();
        assert_eq!(err, RoomError::RoomNotFound);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_host_departure_reassigns_to_remaining_participant() {
        let registry = Registry::new();
        let host_id = Uuid::new_v4();
        let (code, _) = registry.create_room(host_id, "Ana");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.join_room(a, &code, "Ben").unwrap();
        registry.join_room(b, &code, "Cam").unwrap();

        let outcome = registry.leave_room(host_id).unwrap();
        assert!(!outcome.destroyed);
        let new_host = outcome.new_host_id.expect("host must be reassigned");
        assert!(new_host == a || new_host == b);
        let host_in_room = registry
            .with_room(&code, |room| room.host_id)
            .unwrap();
        assert_eq!(host_in_room, new_host);
        assert!(outcome
            .system_message
            .as_ref()
            .unwrap()
            .text
            .contains("Ana left"));
    }

    #[test]
    fn test_non_host_departure_keeps_host() {
        let registry = Registry::new();
        let host_id = Uuid::new_v4();
        let (code, _) = registry.create_room(host_id, "Ana");
        let a = Uuid::new_v4();
        registry.join_room(a, &code, "Ben").unwrap();

        let outcome = registry.leave_room(a).unwrap();
        assert!(outcome.new_host_id.is_none());
        let host_in_room = registry.with_room(&code, |room| room.host_id).unwrap();
        assert_eq!(host_in_room, host_id);
    }

    #[test]
    fn test_leave_unknown_participant_is_none() {
        let registry = Registry::new();
        assert!(registry.leave_room(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_counts_track_population() {
        let registry = Registry::new();
        let host_id = Uuid::new_v4();
        let (code, _) = registry.create_room(host_id, "Ana");
        let a = Uuid::new_v4();
        registry.join_room(a, &code, "Ben").unwrap();
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.participant_count(), 2);

        registry.leave_room(a).unwrap();
        registry.leave_room(host_id).unwrap();
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.participant_count(), 0);
    }

    #[test]
    fn test_name_sanitization() {
        let id = Uuid::new_v4();
        assert_eq!(sanitize_name("  Ana  ", id), "Ana");
        assert_eq!(sanitize_name("a\u{0007}b", id), "ab");
        assert_eq!(
            sanitize_name("abcdefghijklmnopqrstuvwxyz", id).chars().count(),
            20
        );
        assert!(sanitize_name("", id).starts_with("Guest "));
    }
}
