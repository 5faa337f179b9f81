//! Authoritative watch-party room server.
//!
//! Rooms live entirely in memory: a registry of room sessions, each with
//! a playback clock, participant set, chat log, and video queue. The
//! WebSocket gateway routes client intents into room mutations and
//! broadcasts the resulting state; clients reconcile their local players
//! against the broadcast clock.

pub mod comments;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod room;
pub mod ws;
pub mod youtube;
