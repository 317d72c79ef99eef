//! Preview engine configuration
//!
//! Every field has a compiled default, so an empty or missing TOML file yields
//! the stock hover-preview behavior.

use serde::{Deserialize, Serialize};
use sonicmap_common::config::{load_or_default, resolve_config_path};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SONICMAP_PREVIEW_CONFIG";

/// File name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "preview.toml";

/// Which output backend the engine constructs on activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// Real audio device via cpal
    #[default]
    Cpal,
    /// No device; clock driven by the runtime timer (CI, tests, servers)
    Headless,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Same-key requests closer than this are ignored
    pub debounce_ms: u64,

    /// Fade applied to the current voice when a new request replaces it
    pub supersede_fade_ms: u64,

    /// Fade applied on an explicit stop
    pub stop_fade_ms: u64,

    /// Envelope attack
    pub fade_in_ms: u64,

    /// Envelope release before the planned end
    pub fade_out_ms: u64,

    /// Upper bound on one preview
    pub max_play_secs: f64,

    /// Random start offsets are drawn from the first `offset_window_secs` of a clip
    pub offset_window_secs: f64,

    /// Offsets never start within the last `offset_tail_secs` of a clip
    pub offset_tail_secs: f64,

    /// HTTP fetch timeout
    pub fetch_timeout_secs: u64,

    pub output: OutputBackend,

    /// Preferred cpal device name (falls back to the default device)
    pub device_name: Option<String>,

    /// Base directory for relative clip locators
    pub asset_root: Option<PathBuf>,

    /// Seed for offset selection; random when unset
    pub rng_seed: Option<u64>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            supersede_fade_ms: 100,
            stop_fade_ms: 150,
            fade_in_ms: 150,
            fade_out_ms: 300,
            max_play_secs: 6.0,
            offset_window_secs: 20.0,
            offset_tail_secs: 5.0,
            fetch_timeout_secs: 15,
            output: OutputBackend::Cpal,
            device_name: None,
            asset_root: None,
            rng_seed: None,
        }
    }
}

impl PreviewConfig {
    /// Resolve and load the config file (CLI > env > platform dir > defaults).
    pub fn load(cli_path: Option<&Path>) -> Self {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        load_or_default(path.as_deref())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn supersede_fade(&self) -> Duration {
        Duration::from_millis(self.supersede_fade_ms)
    }

    pub fn stop_fade(&self) -> Duration {
        Duration::from_millis(self.stop_fade_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
