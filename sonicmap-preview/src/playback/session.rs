//! Preview sessions
//!
//! A session is one audible preview: a voice on the output with an envelope,
//! a randomly chosen window into the clip and a completion timer.

use crate::audio::automation::GainAutomation;
use crate::audio::mixer::Voice;
use crate::config::PreviewConfig;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Snapshot of a session, safe to hand out
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub key: String,
    /// Device time the voice starts
    pub started_at: f64,
    /// Device time the voice ends unless stopped earlier
    pub planned_end: f64,
    /// Position in the clip where playback starts
    pub offset_secs: f64,
    pub duration_secs: f64,
    pub target_gain: f32,
}

/// The current session as held by the controller.
pub(crate) struct PlaybackSession {
    pub info: SessionInfo,
    pub voice: Arc<Voice>,
    /// Cancels the natural-completion timer
    pub completion: CancellationToken,
}

/// Which part of a clip a session plays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackWindow {
    pub offset_secs: f64,
    pub duration_secs: f64,
}

/// Pick a random window into a clip of `clip_secs`.
///
/// The offset is uniform in `[0, max_start)` with
/// `max_start = max(0, min(clip - tail, window))`; the duration is
/// `min(max_play, clip - offset)`. Clips shorter than the tail reserve play
/// from the start.
pub fn plan_window<R: Rng>(clip_secs: f64, config: &PreviewConfig, rng: &mut R) -> PlaybackWindow {
    let clip_secs = if clip_secs.is_finite() { clip_secs.max(0.0) } else { 0.0 };
    let max_start = (clip_secs - config.offset_tail_secs)
        .min(config.offset_window_secs)
        .max(0.0);

    let offset_secs = if max_start > 0.0 {
        rng.gen_range(0.0..max_start)
    } else {
        0.0
    };

    PlaybackWindow {
        offset_secs,
        duration_secs: config.max_play_secs.min(clip_secs - offset_secs).max(0.0),
    }
}

/// Envelope for a session starting at `start` (device seconds).
///
/// Linear attack to `target_gain`, hold, linear release to zero at the end.
/// On short windows the attack is capped at half the duration and the
/// release never starts before the attack ends.
pub fn envelope(target_gain: f32, start: f64, duration: f64, config: &PreviewConfig) -> GainAutomation {
    let duration = duration.max(0.0);
    let fade_in = (config.fade_in_ms as f64 / 1000.0).min(duration / 2.0);
    let fade_out = config.fade_out_ms as f64 / 1000.0;

    let end = start + duration;
    let attack_end = start + fade_in;
    let release_start = (end - fade_out).max(attack_end);

    let mut gain = GainAutomation::new(0.0);
    gain.set_value_at_time(0.0, start);
    gain.linear_ramp_to_value_at_time(target_gain, attack_end);
    gain.set_value_at_time(target_gain, release_start);
    gain.linear_ramp_to_value_at_time(0.0, end);
    gain
}
