//! Preview engine handle
//!
//! `PreviewEngine` is what the UI shell holds: a cheaply clonable handle over
//! one controller, one resource cache and one output. Nothing on it returns an
//! error to the shell; failures are logged and show up as `PlayOutcome`s and
//! `PreviewEvent`s.

use crate::audio::output::{output_factory, OutputDevice, OutputFactory};
use crate::cache::{CacheState, ClipFetcher, LocatorFetcher, ResourceCache};
use crate::config::PreviewConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, PreviewEvent};
use crate::playback::controller::{PlayOutcome, PlaybackController};
use crate::playback::device::DeviceOutputManager;
use crate::playback::session::SessionInfo;
use sonicmap_common::Catalog;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone)]
pub struct PreviewEngine {
    controller: Arc<PlaybackController>,
    runtime: Handle,
}

impl PreviewEngine {
    /// Engine with the configured output backend and the HTTP/file fetcher.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new(catalog: Catalog, config: PreviewConfig) -> Result<Self> {
        let fetcher = LocatorFetcher::new(config.fetch_timeout(), config.asset_root.clone())?;
        let factory = output_factory(&config);
        Self::with_backends(catalog, config, Arc::new(fetcher), factory)
    }

    /// Engine with an explicit fetcher and output factory.
    pub fn with_backends(
        catalog: Catalog,
        config: PreviewConfig,
        fetcher: Arc<dyn ClipFetcher>,
        output: OutputFactory,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::InvalidState(format!("Preview engine needs a tokio runtime: {}", e)))?;

        let events = EventBus::default();
        let device = DeviceOutputManager::new(output, events.clone());
        let cache = ResourceCache::new(fetcher);

        info!("Preview engine created with {} catalog entries", catalog.len());

        let controller = PlaybackController::new(catalog, config, device, cache, events, runtime.clone());
        Ok(Self {
            controller: Arc::new(controller),
            runtime,
        })
    }

    /// Build (first call) or resume the shared output. Call from a user
    /// gesture. Returns whether an output is usable.
    pub fn activate(&self) -> bool {
        self.controller.activate()
    }

    /// Preview `key`, replacing whatever is playing.
    pub async fn play(&self, key: &str) -> PlayOutcome {
        self.controller.play(key).await
    }

    /// Fire-and-forget `play`.
    pub fn spawn_play(&self, key: impl Into<String>) -> JoinHandle<PlayOutcome> {
        let controller = Arc::clone(&self.controller);
        let key = key.into();
        self.runtime.spawn(async move { controller.play(&key).await })
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    /// Release the output and cancel every timer. Further calls are no-ops.
    pub fn teardown(&self) {
        self.controller.teardown();
    }

    /// Fetch and decode `key` ahead of a hover. Returns whether it is cached.
    pub async fn preload(&self, key: &str) -> bool {
        self.controller.preload(key).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.controller.events().subscribe()
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.controller.current_session()
    }

    pub fn cache_state(&self, key: &str) -> CacheState {
        self.controller.cache().state(key)
    }

    /// Number of fetches the cache has started
    pub fn fetch_count(&self) -> u64 {
        self.controller.cache().fetch_count()
    }

    pub fn fading_count(&self) -> usize {
        self.controller.fading_count()
    }

    /// True once output construction has failed
    pub fn is_inert(&self) -> bool {
        self.controller.device().is_inert()
    }

    pub fn is_torn_down(&self) -> bool {
        self.controller.is_torn_down()
    }

    pub fn output(&self) -> Option<Arc<dyn OutputDevice>> {
        self.controller.device().output()
    }

    pub fn catalog(&self) -> &Catalog {
        self.controller.catalog()
    }

    pub fn config(&self) -> &PreviewConfig {
        self.controller.config()
    }
}
