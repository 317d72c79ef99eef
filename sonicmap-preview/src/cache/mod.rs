//! Resource cache
//!
//! Lazily fetches and decodes preview clips, one entry per catalog key.
//!
//! Entry lifecycle: `Unloaded → Loading → Loaded | Failed`. A `Failed` entry
//! goes back to `Unloaded` on the next request and is retried from scratch.
//! While an entry is `Loading`, further requests return `None` immediately
//! instead of starting a second fetch or waiting for the first.

pub mod fetcher;

use crate::audio::decode::{decode_clip, extension_hint};
use crate::audio::types::DecodedClip;
use crate::error::{Error, Result};
use sonicmap_common::AudioResourceDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub use fetcher::{ClipFetcher, LocatorFetcher};

/// Observable state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug)]
enum EntryState {
    Unloaded,
    Loading,
    Loaded(Arc<DecodedClip>),
    Failed,
}

#[derive(Debug)]
struct CacheEntry {
    key: String,
    state: EntryState,
}

impl CacheEntry {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            state: EntryState::Unloaded,
        }
    }

    fn cache_state(&self) -> CacheState {
        match self.state {
            EntryState::Unloaded => CacheState::Unloaded,
            EntryState::Loading => CacheState::Loading,
            EntryState::Loaded(_) => CacheState::Loaded,
            EntryState::Failed => CacheState::Failed,
        }
    }
}

pub struct ResourceCache {
    fetcher: Arc<dyn ClipFetcher>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    fetches: AtomicU64,
}

impl ResourceCache {
    pub fn new(fetcher: Arc<dyn ClipFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the clip for `descriptor`, resampled to `output_rate`.
    ///
    /// A clip already loaded is returned as is; the mixer converts any rate
    /// mismatch on the fly.
    ///
    /// Returns `None` when the clip is being loaded by another caller or the
    /// fetch/decode failed. Failures are logged, never returned.
    pub async fn load(
        &self,
        descriptor: &AudioResourceDescriptor,
        output_rate: u32,
    ) -> Option<Arc<DecodedClip>> {
        let key = descriptor.key.as_str();

        {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| CacheEntry::new(key));

            match &entry.state {
                EntryState::Loaded(clip) => {
                    debug!("Cache hit for '{}'", key);
                    return Some(Arc::clone(clip));
                }
                EntryState::Loading => {
                    debug!("'{}' is already loading; skipping duplicate fetch", key);
                    return None;
                }
                EntryState::Failed => {
                    debug!("Retrying previously failed clip '{}'", entry.key);
                }
                EntryState::Unloaded => {}
            }
            entry.state = EntryState::Loading;
        }

        let mut guard = LoadingGuard {
            cache: self,
            key,
            settled: false,
        };

        let result = self.fetch_and_decode(descriptor, output_rate).await;

        let mut entries = self.lock();
        guard.settled = true;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(key));

        match result {
            Ok(clip) => {
                info!(
                    "Loaded clip '{}' ({:.1}s at {}Hz)",
                    key,
                    clip.duration_secs(),
                    clip.sample_rate()
                );
                let clip = Arc::new(clip);
                entry.state = EntryState::Loaded(Arc::clone(&clip));
                Some(clip)
            }
            Err(e) => {
                warn!("Could not load audio for '{}': {}", key, e);
                entry.state = EntryState::Failed;
                None
            }
        }
    }

    async fn fetch_and_decode(
        &self,
        descriptor: &AudioResourceDescriptor,
        output_rate: u32,
    ) -> Result<DecodedClip> {
        let locator = descriptor.source_locator.as_str();

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = self.fetcher.fetch(locator).await?;

        let extension = extension_hint(locator).map(str::to_owned);

        tokio::task::spawn_blocking(move || decode_clip(bytes, extension.as_deref(), output_rate))
            .await
            .map_err(|e| Error::Decode(format!("Decode task failed: {}", e)))?
    }

    pub fn state(&self, key: &str) -> CacheState {
        self.lock()
            .get(key)
            .map(CacheEntry::cache_state)
            .unwrap_or(CacheState::Unloaded)
    }

    /// Decoded clip for `key`, if loaded
    pub fn get(&self, key: &str) -> Option<Arc<DecodedClip>> {
        match self.lock().get(key).map(|entry| &entry.state) {
            Some(EntryState::Loaded(clip)) => Some(Arc::clone(clip)),
            _ => None,
        }
    }

    /// Number of fetches started since creation
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn loaded_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| matches!(entry.state, EntryState::Loaded(_)))
            .count()
    }
}

/// Puts an entry back to `Unloaded` if a load future is dropped mid-flight.
struct LoadingGuard<'a> {
    cache: &'a ResourceCache,
    key: &'a str,
    settled: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(entry) = self.cache.lock().get_mut(self.key) {
            if matches!(entry.state, EntryState::Loading) {
                entry.state = EntryState::Unloaded;
            }
        }
    }
}
