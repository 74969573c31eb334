//! Configuration and wiring behavior of the CLI surface.
//!
//! Environment-variable tests share a mutex so overrides never bleed
//! between tests running in parallel.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

use clap::Parser;
use tempfile::tempdir;

use tabletalk_cli::{build_registry, Cli};
use tabletalk_core::config::{AppConfig, LoadOptions};

fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct EnvVar {
    key: &'static str,
    prior: Option<String>,
}

impl EnvVar {
    fn set(key: &'static str, value: &str) -> Self {
        let prior = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self { key, prior }
    }
}

impl Drop for EnvVar {
    fn drop(&mut self) {
        match &self.prior {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
fn data_path_env_var_overrides_default() {
    let _guard = env_lock();
    let _data = EnvVar::set("DATA_PATH", "/tmp/env_data.csv");

    let config = AppConfig::load(LoadOptions::default()).unwrap();
    assert_eq!(config.dataset.path, PathBuf::from("/tmp/env_data.csv"));
}

#[test]
fn agent_state_path_env_var_redirects_latest_state() {
    let _guard = env_lock();
    let _state = EnvVar::set("AGENT_STATE_PATH", "/tmp/custom_state.json");

    let config = AppConfig::load(LoadOptions::default()).unwrap();
    assert_eq!(config.state.one_shot_latest_path(), PathBuf::from("/tmp/custom_state.json"));
}

#[test]
fn claude_api_key_is_accepted_as_fallback() {
    let _guard = env_lock();
    std::env::remove_var("ANTHROPIC_API_KEY");
    let _key = EnvVar::set("CLAUDE_API_KEY", "sk-test");

    let config = AppConfig::load(LoadOptions::default()).unwrap();
    assert!(config.reasoning.api_key.is_some());
}

#[test]
fn cli_flag_beats_env_var_for_dataset() {
    let _guard = env_lock();
    let _data = EnvVar::set("DATA_PATH", "/tmp/env_data.csv");

    let cli = Cli::parse_from(["tabletalk", "--data-path", "/tmp/flag_data.csv"]);
    let config = cli.load_config().unwrap();
    assert_eq!(config.dataset.path, PathBuf::from("/tmp/flag_data.csv"));
}

#[test]
fn config_file_values_are_interpolated_and_applied() {
    let _guard = env_lock();
    let _var = EnvVar::set("RUNTIME_TEST_DATA_DIR", "/srv/data");

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("tabletalk.toml");
    std::fs::write(
        &config_path,
        "[dataset]\npath = \"${RUNTIME_TEST_DATA_DIR}/sales.csv\"\n\n[reasoning]\nmax_turns = 5\n",
    )
    .unwrap();

    let cli = Cli::parse_from(["tabletalk", "--config", config_path.to_str().unwrap()]);
    let config = cli.load_config().unwrap();
    assert_eq!(config.dataset.path, PathBuf::from("/srv/data/sales.csv"));
    assert_eq!(config.reasoning.max_turns, 5);
}

#[test]
fn explicit_missing_config_file_is_an_error() {
    let _guard = env_lock();
    let cli = Cli::parse_from(["tabletalk", "--config", "/nonexistent/tabletalk.toml"]);
    assert!(cli.load_config().is_err());
}

#[test]
fn registry_carries_the_four_analysis_tools() {
    let _guard = env_lock();
    let config = AppConfig::load(LoadOptions::default()).unwrap();
    let registry = build_registry(&config);

    assert_eq!(
        registry.names(),
        vec!["calculate_total", "filter_by_value", "get_top_n", "validate_data"]
    );
}
