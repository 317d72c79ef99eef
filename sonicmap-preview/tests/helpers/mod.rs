//! Test helper modules for sonicmap-preview integration tests
//!
//! - audio_generator: in-memory WAV clips
//! - mock_fetcher: scriptable `ClipFetcher`
//! - an engine builder wired to a `HeadlessOutput`

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_fetcher;

pub use audio_generator::{sine_wav, TEST_SAMPLE_RATE};
pub use mock_fetcher::MockFetcher;

use sonicmap_common::{AudioResourceDescriptor, Catalog};
use sonicmap_preview::audio::{HeadlessOutput, OutputDevice, OutputFactory};
use sonicmap_preview::{OutputBackend, PreviewConfig, PreviewEngine, PreviewEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A catalog entry backed by a generated sine clip
pub struct TestClip {
    pub key: &'static str,
    pub seconds: f64,
    pub gain: f32,
}

pub const fn clip(key: &'static str, seconds: f64, gain: f32) -> TestClip {
    TestClip { key, seconds, gain }
}

pub fn locator(key: &str) -> String {
    format!("mock://previews/{}.wav", key)
}

pub fn test_config() -> PreviewConfig {
    PreviewConfig {
        output: OutputBackend::Headless,
        rng_seed: Some(7),
        ..PreviewConfig::default()
    }
}

pub struct TestEngine {
    pub engine: PreviewEngine,
    pub output: Arc<HeadlessOutput>,
    pub fetcher: Arc<MockFetcher>,
    outputs_built: Arc<AtomicUsize>,
}

impl TestEngine {
    /// Engine over a running headless output
    pub fn new(clips: &[TestClip]) -> Self {
        Self::build(clips, HeadlessOutput::new(TEST_SAMPLE_RATE))
    }

    /// Engine whose output starts suspended
    pub fn suspended(clips: &[TestClip]) -> Self {
        Self::build(clips, HeadlessOutput::suspended(TEST_SAMPLE_RATE))
    }

    fn build(clips: &[TestClip], output: HeadlessOutput) -> Self {
        let fetcher = Arc::new(MockFetcher::new());
        let mut catalog = Catalog::new();
        for clip in clips {
            let locator = locator(clip.key);
            fetcher.add_clip(&locator, sine_wav(clip.seconds, 440.0, 0.5));
            catalog
                .insert(AudioResourceDescriptor::new(clip.key, locator, clip.gain))
                .unwrap();
        }

        let output = Arc::new(output);
        let outputs_built = Arc::new(AtomicUsize::new(0));
        let factory: OutputFactory = {
            let output = Arc::clone(&output);
            let built = Arc::clone(&outputs_built);
            Arc::new(move || {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(output.clone() as Arc<dyn OutputDevice>)
            })
        };

        let engine = PreviewEngine::with_backends(
            catalog,
            test_config(),
            fetcher.clone(),
            factory,
        )
        .unwrap();

        Self {
            engine,
            output,
            fetcher,
            outputs_built,
        }
    }

    pub fn outputs_built(&self) -> usize {
        self.outputs_built.load(Ordering::SeqCst)
    }

    pub fn fetches(&self, key: &str) -> usize {
        self.fetcher.fetch_count(&locator(key))
    }

    /// Activate and warm the cache for `keys`
    pub async fn warm(&self, keys: &[&str]) {
        assert!(self.engine.activate());
        for key in keys {
            assert!(self.engine.preload(key).await, "preload {}", key);
        }
    }

    pub fn now(&self) -> f64 {
        self.output.current_time()
    }
}

/// Everything currently queued on an event receiver
pub fn drain_events(rx: &mut broadcast::Receiver<PreviewEvent>) -> Vec<PreviewEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_started(events: &[PreviewEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, PreviewEvent::SessionStarted { .. }))
        .count()
}
