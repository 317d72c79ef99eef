//! Preview events
//!
//! Lifecycle notifications broadcast to whoever is listening (the UI shell,
//! the audition binary, tests). Sending never blocks and having no receivers
//! is fine.

use crate::playback::session::{SessionId, SessionInfo};
use tokio::sync::broadcast;

/// Why a session started fading before its natural end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeReason {
    /// A newer `play` replaced it
    Superseded,
    /// Explicit `stop()`
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    /// Output constructed on the first activation
    Activated { device: String, sample_rate: u32 },

    /// Output could not be constructed; the engine is now inert
    ActivationFailed { reason: String },

    /// A suspended output was resumed
    Resumed,

    /// Fetch or decode failed for this key
    LoadFailed { key: String },

    SessionStarted { info: SessionInfo },

    SessionFading { session: SessionId, reason: FadeReason },

    /// Session left the output (natural end or after its fade-out)
    SessionEnded { session: SessionId, key: String },

    TornDown,
}

/// Broadcast channel for `PreviewEvent`s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PreviewEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PreviewEvent) {
        // No receivers is OK
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
