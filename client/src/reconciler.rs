//! Playback clock reconciliation.
//!
//! There is no global clock; the server's (position, timestamp, playing)
//! tuple is truth-at-a-point-in-time and the client extrapolates from it.
//! Corrections only fire past a drift tolerance so normal network jitter
//! never causes oscillating seeks. While a remote update is being applied
//! the reconciler holds a guard window that suppresses the player's own
//! event callbacks from echoing back upstream.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::VideoState;

/// Local/target disagreement beyond this forces a corrective seek
pub const DRIFT_TOLERANCE_SECS: f64 = 1.5;
/// Position jump beyond this between detector polls counts as a user seek
pub const SEEK_DETECT_TOLERANCE_SECS: f64 = 2.0;
/// How long after a remote update the player's own callbacks are swallowed
pub const GUARD_WINDOW_MS: u64 = 800;
/// Play/pause churn settles for this long before an intent goes upstream
pub const DEBOUNCE_MS: u64 = 150;
/// Recommended seek-detector polling interval
pub const SEEK_POLL_INTERVAL_MS: u64 = 1000;

const RATE_EPSILON: f64 = 1e-3;

/// Time source, injectable so guard and debounce windows are testable
pub trait Clock {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// The handful of operations the reconciler needs from a video player
pub trait PlayerControl {
    fn position(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn playback_rate(&self) -> f64;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position_secs: f64);
    fn set_rate(&mut self, rate: f64);
}

/// What a broadcast application actually did to the player
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Set when drift exceeded tolerance and a corrective seek fired.
    /// Feed this to [`SeekDetector::note_seek`] so the correction is not
    /// mistaken for a user seek.
    pub sought_to: Option<f64>,
    pub toggled_playback: bool,
    pub changed_rate: bool,
}

pub struct Reconciler<C: Clock = SystemClock> {
    clock: C,
    last_seq: u64,
    guard_until_ms: u64,
    drift_tolerance: f64,
    guard_window_ms: u64,
}

impl Reconciler<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Reconciler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Reconciler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            last_seq: 0,
            guard_until_ms: 0,
            drift_tolerance: DRIFT_TOLERANCE_SECS,
            guard_window_ms: GUARD_WINDOW_MS,
        }
    }

    /// True while the player's own callbacks should not be sent upstream
    pub fn in_guard_window(&self) -> bool {
        self.clock.now_millis() < self.guard_until_ms
    }

    pub fn last_applied_seq(&self) -> u64 {
        self.last_seq
    }

    /// Apply an authoritative state broadcast to the local player.
    /// Returns None when the broadcast is stale or a duplicate (its seq
    /// is not past the last one applied).
    pub fn apply(
        &mut self,
        state: &VideoState,
        player: &mut dyn PlayerControl,
    ) -> Option<ReconcileOutcome> {
        if state.seq <= self.last_seq {
            return None;
        }
        self.last_seq = state.seq;

        let now = self.clock.now_millis();
        let elapsed_secs = now.saturating_sub(state.timestamp) as f64 / 1000.0;
        let target = if state.is_playing {
            state.current_time + elapsed_secs
        } else {
            state.current_time
        };

        // Open the guard before touching the player so the callbacks our
        // own corrections trigger are swallowed.
        self.guard_until_ms = now + self.guard_window_ms;

        let mut outcome = ReconcileOutcome::default();

        if (player.position() - target).abs() > self.drift_tolerance {
            player.seek(target);
            outcome.sought_to = Some(target);
        }

        if state.is_playing != player.is_playing() {
            if state.is_playing {
                player.play();
            } else {
                player.pause();
            }
            outcome.toggled_playback = true;
        }

        if (player.playback_rate() - state.playback_rate).abs() > RATE_EPSILON {
            player.set_rate(state.playback_rate);
            outcome.changed_rate = true;
        }

        Some(outcome)
    }
}

/// Detects user-initiated seeks by polling the player position. The
/// player has no native "manual seek" signal, so a jump bigger than the
/// tolerance between consecutive polls is treated as one.
pub struct SeekDetector {
    last_position: Option<f64>,
    tolerance: f64,
}

impl Default for SeekDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SeekDetector {
    pub fn new() -> Self {
        Self {
            last_position: None,
            tolerance: SEEK_DETECT_TOLERANCE_SECS,
        }
    }

    /// Call on every poll tick with the current player position. Returns
    /// the position to report upstream when a user seek was detected.
    /// Pass `guarded = true` while the reconciler is applying a remote
    /// update; guarded polls are ignored entirely.
    pub fn poll(&mut self, position_secs: f64, guarded: bool) -> Option<f64> {
        if guarded {
            return None;
        }
        let previous = self.last_position.replace(position_secs);
        match previous {
            Some(prev) if (position_secs - prev).abs() > self.tolerance => Some(position_secs),
            _ => None,
        }
    }

    /// Record a corrective seek made by the reconciler so the next poll
    /// doesn't report it as user-initiated.
    pub fn note_seek(&mut self, position_secs: f64) {
        self.last_position = Some(position_secs);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackIntent {
    Play { position_secs: f64 },
    Pause { position_secs: f64 },
}

/// Holds a play/pause intent for a short window before releasing it
/// upstream. Rapid toggling collapses to the last intent recorded; an
/// opposite event simply replaces the pending one.
pub struct IntentDebouncer<C: Clock = SystemClock> {
    clock: C,
    window_ms: u64,
    pending: Option<(PlaybackIntent, u64)>,
}

impl IntentDebouncer<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for IntentDebouncer<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> IntentDebouncer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            window_ms: DEBOUNCE_MS,
            pending: None,
        }
    }

    pub fn record(&mut self, intent: PlaybackIntent) {
        let deadline = self.clock.now_millis() + self.window_ms;
        self.pending = Some((intent, deadline));
    }

    /// Release the pending intent once its window has elapsed
    pub fn poll(&mut self) -> Option<PlaybackIntent> {
        let (intent, deadline) = self.pending?;
        if self.clock.now_millis() >= deadline {
            self.pending = None;
            Some(intent)
        } else {
            None
        }
    }

    /// Drop whatever is pending (e.g. when a remote update supersedes it)
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
