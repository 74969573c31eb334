use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub state: StateConfig,
    pub reasoning: ReasoningConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct StateConfig {
    pub dir: PathBuf,
    /// Override for the one-shot latest-state file (`AGENT_STATE_PATH`).
    pub one_shot_latest: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ReasoningConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_turns: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub data_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed parsing config `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("config references `${{{var}}}` but the variable is unset")]
    MissingEnvInterpolation { var: String },
    #[error("config contains an unclosed `${{...}}` expression")]
    UnterminatedInterpolation,
    #[error("env var {key} holds `{value}`, which is not a valid number")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig { path: PathBuf::from("data/sample_data.csv") },
            state: StateConfig { dir: PathBuf::from("state"), one_shot_latest: None },
            reasoning: ReasoningConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                max_turns: 3,
                timeout_secs: 120,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
                dir: PathBuf::from("logs"),
            },
        }
    }
}

impl StateConfig {
    pub fn session_id_path(&self) -> PathBuf {
        self.dir.join("interactive").join("session_id.txt")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("interactive").join("history").join("session_ids.txt")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.dir.join("interactive").join("transcripts")
    }

    pub fn one_shot_dir(&self) -> PathBuf {
        self.dir.join("one-shot")
    }

    pub fn one_shot_latest_path(&self) -> PathBuf {
        self.one_shot_latest
            .clone()
            .unwrap_or_else(|| self.one_shot_dir().join("agent_state_latest.json"))
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "compact" {
            Ok(Self::Compact)
        } else if normalized == "pretty" {
            Ok(Self::Pretty)
        } else if normalized == "json" {
            Ok(Self::Json)
        } else {
            Err(ConfigError::Validation(format!(
                "log format must be compact, pretty, or json (got `{normalized}`)"
            )))
        }
    }
}

impl AppConfig {
    /// Builds the effective configuration in layers: defaults, then the
    /// optional TOML file, then environment variables, then programmatic
    /// overrides, validated once at the end.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match locate_config_file(options.config_path.as_deref()) {
            Some(path) => config.apply_patch(load_patch_file(&path)?),
            None if options.require_file => {
                let wanted =
                    options.config_path.unwrap_or_else(|| PathBuf::from("tabletalk.toml"));
                return Err(ConfigError::MissingConfigFile(wanted));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(dataset) = patch.dataset {
            if let Some(path) = dataset.path {
                self.dataset.path = path;
            }
        }

        if let Some(state) = patch.state {
            if let Some(dir) = state.dir {
                self.state.dir = dir;
            }
            if let Some(one_shot_latest) = state.one_shot_latest {
                self.state.one_shot_latest = Some(one_shot_latest);
            }
        }

        if let Some(reasoning) = patch.reasoning {
            if let Some(api_key_value) = reasoning.api_key {
                self.reasoning.api_key = Some(api_key_value.into());
            }
            if let Some(base_url) = reasoning.base_url {
                self.reasoning.base_url = base_url;
            }
            if let Some(model) = reasoning.model {
                self.reasoning.model = model;
            }
            if let Some(max_turns) = reasoning.max_turns {
                self.reasoning.max_turns = max_turns;
            }
            if let Some(timeout_secs) = reasoning.timeout_secs {
                self.reasoning.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
            if let Some(dir) = logging.dir {
                self.logging.dir = dir;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DATA_PATH") {
            self.dataset.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("AGENT_STATE_PATH") {
            self.state.one_shot_latest = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("TABLETALK_STATE_DIR") {
            self.state.dir = PathBuf::from(value);
        }

        let api_key = read_env("ANTHROPIC_API_KEY").or_else(|| read_env("CLAUDE_API_KEY"));
        if let Some(value) = api_key {
            self.reasoning.api_key = Some(value.into());
        }
        if let Some(value) = read_env("TABLETALK_BASE_URL") {
            self.reasoning.base_url = value;
        }
        if let Some(value) = read_env("TABLETALK_MODEL") {
            self.reasoning.model = value;
        }
        if let Some(value) = read_env("TABLETALK_MAX_TURNS") {
            self.reasoning.max_turns = parse_u32("TABLETALK_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("TABLETALK_TIMEOUT_SECS") {
            self.reasoning.timeout_secs = parse_u64("TABLETALK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TABLETALK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("TABLETALK_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        if let Some(value) = read_env("TABLETALK_LOG_DIR") {
            self.logging.dir = PathBuf::from(value);
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_path) = overrides.data_path {
            self.dataset.path = data_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reasoning.max_turns == 0 {
            return Err(ConfigError::Validation(
                "reasoning.max_turns must be greater than zero".to_string(),
            ));
        }
        if self.reasoning.timeout_secs == 0 || self.reasoning.timeout_secs > 600 {
            return Err(ConfigError::Validation(
                "reasoning.timeout_secs must be in range 1..=600".to_string(),
            ));
        }
        if self.reasoning.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("reasoning.base_url must not be empty".to_string()));
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            return Err(ConfigError::Validation(format!(
                "unsupported log level `{}` (expected trace|debug|info|warn|error)",
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    dataset: Option<DatasetPatch>,
    state: Option<StatePatch>,
    reasoning: Option<ReasoningPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct StatePatch {
    dir: Option<PathBuf>,
    one_shot_latest: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ReasoningPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_turns: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
    dir: Option<PathBuf>,
}

fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(_) => None,
        None => ["tabletalk.toml", "config/tabletalk.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists()),
    }
}

fn load_patch_file(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_refs(&raw)?;
    toml::from_str(&expanded)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Substitutes every `${VAR}` in the raw TOML text with the variable's
/// value. Unset variables and unclosed expressions are hard errors so a
/// bad config never half-applies.
fn expand_env_refs(raw: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        expanded.push_str(&value);
        rest = &after[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}
