//! Room-level error taxonomy.
//!
//! Every variant is surfaced to the acting connection only; failures are
//! never broadcast to the rest of the room and never tear down a session.

/// Errors produced by registry and room mutators
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found. Check the code and try again.")]
    RoomNotFound,

    #[error("Invalid YouTube URL")]
    InvalidVideoUrl,

    #[error("Queue is full (max {0} items)")]
    QueueFull(usize),

    #[error("Only the host can do that")]
    NotHost,

    /// The connection is not a participant of any room. Handled as a
    /// silent no-op at the gateway, not sent to the client.
    #[error("Unknown participant")]
    UnknownParticipant,
}
