//! Configuration file resolution and loading
//!
//! Config file lookup follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/sonicmap/<file_name>`)
//! 4. None: compiled defaults are used
//!
//! A missing or malformed file never aborts startup; it logs a warning and
//! falls back to defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "sonicmap";

/// Resolve which config file to read, if any.
///
/// A CLI argument or environment variable is returned even if the file does
/// not exist, so the caller can report it. The platform default is only
/// returned when present.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path(file_name).filter(|path| path.exists())
}

/// Platform config location for `file_name`
///
/// - Linux: `~/.config/sonicmap/<file_name>`
/// - macOS: `~/Library/Application Support/sonicmap/<file_name>`
/// - Windows: `%APPDATA%\sonicmap\<file_name>`
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(file_name))
}

/// Parse a TOML file into `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("config file {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Load `T` from the resolved path, falling back to `T::default()`.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> T {
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return T::default();
    };

    match load_toml(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - using compiled defaults", e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        level: u32,
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(
            Some(Path::new("/tmp/explicit.toml")),
            "SONICMAP_TEST_UNSET_VAR",
            "preview.toml",
        );
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    fn test_load_toml_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"jazz\"\nlevel = 3").unwrap();

        let sample: Sample = load_toml(file.path()).unwrap();
        assert_eq!(sample, Sample { name: "jazz".to_string(), level: 3 });
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let sample: Sample = load_or_default(Some(Path::new("/nonexistent/sonicmap.toml")));
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_malformed_file_falls_back_to_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "level = \"not a number\"").unwrap();

        assert!(matches!(load_toml::<Sample>(file.path()), Err(Error::Config(_))));
        let sample: Sample = load_or_default(Some(file.path()));
        assert_eq!(sample, Sample::default());
    }
}
