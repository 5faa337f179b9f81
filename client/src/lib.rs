//! Client half of the watch-party synchronization protocol.
//!
//! The server owns the authoritative playback clock; this crate keeps a
//! local player in step with it. [`Reconciler`] applies `video:state-update`
//! broadcasts to anything implementing [`PlayerControl`], correcting the
//! player only when it drifts past tolerance. [`SeekDetector`] and
//! [`IntentDebouncer`] shape local player activity into upstream intents.
//! [`SyncClient`] is the WebSocket transport.

pub mod protocol;
pub mod reconciler;
pub mod sync;

pub use reconciler::{
    Clock, IntentDebouncer, PlaybackIntent, PlayerControl, ReconcileOutcome, Reconciler,
    SeekDetector, SystemClock,
};
pub use sync::SyncClient;
