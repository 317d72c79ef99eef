//! Scriptable clip fetcher
//!
//! Serves registered bytes by locator, counts fetches, and can be told to
//! fail or stall for a given locator.

use futures::future::BoxFuture;
use sonicmap_preview::cache::ClipFetcher;
use sonicmap_preview::Error;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockFetcher {
    clips: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_clip(&self, locator: &str, bytes: Vec<u8>) {
        self.clips.lock().unwrap().insert(locator.to_string(), bytes);
    }

    pub fn set_failing(&self, locator: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(locator.to_string());
        } else {
            set.remove(locator);
        }
    }

    /// Every fetch of `locator` takes `delay` before answering
    pub fn set_delay(&self, locator: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(locator.to_string(), delay);
    }

    pub fn fetch_count(&self, locator: &str) -> usize {
        self.fetches.lock().unwrap().get(locator).copied().unwrap_or(0)
    }
}

impl ClipFetcher for MockFetcher {
    fn fetch<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, sonicmap_preview::Result<Vec<u8>>> {
        Box::pin(async move {
            *self.fetches.lock().unwrap().entry(locator.to_string()).or_insert(0) += 1;

            let delay = self.delays.lock().unwrap().get(locator).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if self.failing.lock().unwrap().contains(locator) {
                return Err(Error::Fetch {
                    locator: locator.to_string(),
                    message: "HTTP 503".to_string(),
                });
            }

            self.clips
                .lock()
                .unwrap()
                .get(locator)
                .cloned()
                .ok_or_else(|| Error::Fetch {
                    locator: locator.to_string(),
                    message: "HTTP 404".to_string(),
                })
        })
    }
}
