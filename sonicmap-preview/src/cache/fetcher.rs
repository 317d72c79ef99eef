//! Clip fetching
//!
//! Resolves a catalog locator to raw bytes. Remote clips come over HTTP(S)
//! with reqwest; `file://` URLs and bare paths are read from disk.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Source of raw clip bytes.
pub trait ClipFetcher: Send + Sync {
    fn fetch<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Fetcher for the locators a catalog may contain.
pub struct LocatorFetcher {
    client: reqwest::Client,
    asset_root: Option<PathBuf>,
}

impl LocatorFetcher {
    pub fn new(timeout: Duration, asset_root: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, asset_root })
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {}", status)));
        }

        let bytes = response.bytes().await.map_err(|e| Error::fetch(url, e))?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn fetch_file(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve_path(locator);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::fetch(locator, format!("{}: {}", path.display(), e)))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(bytes)
    }

    /// Map a non-HTTP locator to a filesystem path.
    pub fn resolve_path(&self, locator: &str) -> PathBuf {
        let raw = locator.strip_prefix("file://").unwrap_or(locator);
        let path = Path::new(raw);
        match &self.asset_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn is_http(locator: &str) -> bool {
    let lower = locator.get(..8).unwrap_or(locator).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl ClipFetcher for LocatorFetcher {
    fn fetch<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            if is_http(locator) {
                self.fetch_http(locator).await
            } else {
                self.fetch_file(locator).await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fetcher(root: Option<PathBuf>) -> LocatorFetcher {
        LocatorFetcher::new(Duration::from_secs(5), root).unwrap()
    }

    #[test]
    fn test_http_detection() {
        assert!(is_http("https://p.scdn.co/mp3-preview/abc"));
        assert!(is_http("HTTP://example.com/a.mp3"));
        assert!(!is_http("file:///tmp/a.mp3"));
        assert!(!is_http("a.mp3"));
    }

    #[test]
    fn test_resolve_relative_against_asset_root() {
        let f = fetcher(Some(PathBuf::from("/srv/previews")));
        assert_eq!(f.resolve_path("jazz.mp3"), PathBuf::from("/srv/previews/jazz.mp3"));
        assert_eq!(f.resolve_path("file:///tmp/blues.mp3"), PathBuf::from("/tmp/blues.mp3"));
    }

    #[tokio::test]
    async fn test_fetch_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF").unwrap();

        let locator = file.path().to_string_lossy().to_string();
        let bytes = fetcher(None).fetch(&locator).await.unwrap();
        assert_eq!(bytes, b"RIFF");
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_fetch_error() {
        let result = fetcher(None).fetch("/nonexistent/clip.mp3").await;
        assert!(matches!(result, Err(Error::Fetch { .. })));
    }
}
