//! # Sonic Map Preview Engine (sonicmap-preview)
//!
//! Hover-triggered audio previews for the Sonic Map explorer.
//!
//! **Purpose:** Play short, randomly offset snippets of remote clips in
//! response to rapid hover/selection events, with at most one current voice,
//! short crossfades, lazy loading with caching, and leak-free teardown.
//!
//! **Architecture:** symphonia + rubato decode into a resource cache; a single
//! shared output (cpal or headless) renders voices through gain automation;
//! the playback controller sequences sessions.

pub mod audio;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;

pub use cache::CacheState;
pub use config::{OutputBackend, PreviewConfig};
pub use engine::PreviewEngine;
pub use error::{Error, Result};
pub use events::{FadeReason, PreviewEvent};
pub use playback::{PlayOutcome, SessionId, SessionInfo};
