//! Config path resolution tests
//!
//! Tests that manipulate SONICMAP_PREVIEW_CONFIG are marked with #[serial]
//! so they never race on the process environment.

use serial_test::serial;
use sonicmap_common::config::{default_config_path, resolve_config_path, APP_DIR};
use std::env;
use std::path::{Path, PathBuf};

const ENV_VAR: &str = "SONICMAP_PREVIEW_CONFIG";

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let path = resolve_config_path(None, ENV_VAR, "preview.toml");
    assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_beats_env_var() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), ENV_VAR, "preview.toml");
    assert_eq!(path, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(ENV_VAR, "   ");

    let path = resolve_config_path(None, ENV_VAR, "sonicmap-test-does-not-exist.toml");
    assert_eq!(path, None);

    env::remove_var(ENV_VAR);
}

#[test]
fn test_default_path_is_under_app_dir() {
    if let Some(path) = default_config_path("preview.toml") {
        assert!(path.ends_with(Path::new(APP_DIR).join("preview.toml")));
    }
}
