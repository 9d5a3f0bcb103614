use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub game: GameConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// Chat-completion endpoint, e.g. `http://127.0.0.1:5000/v1/chat/completions`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    /// Retry budget for transport failures only; parse failures never retry.
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub seed: u64,
    pub starting_funds: Decimal,
    pub travel_cost_multiplier: Decimal,
    pub n_locations: usize,
    pub year_length: u32,
    pub unparseable_budget: u32,
    pub max_turns: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "http://127.0.0.1:5000/v1/chat/completions".to_string(),
                model: "local".to_string(),
                api_key: None,
                timeout_secs: 30,
                max_retries: 2,
            },
            game: GameConfig {
                seed: 134,
                starting_funds: Decimal::from(10),
                travel_cost_multiplier: Decimal::from(2),
                n_locations: 12,
                year_length: 100,
                unparseable_budget: 2,
                max_turns: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub llm_max_retries: Option<u32>,
    pub seed: Option<u64>,
    pub max_turns: Option<u32>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// TOML patch shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    #[serde(default)]
    llm: LlmPatch,
    #[serde(default)]
    game: GamePatch,
    #[serde(default)]
    logging: LoggingPatch,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GamePatch {
    seed: Option<u64>,
    starting_funds: Option<f64>,
    travel_cost_multiplier: Option<f64>,
    n_locations: Option<usize>,
    year_length: Option<u32>,
    unparseable_budget: Option<u32>,
    max_turns: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<String>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let maybe_path = resolve_config_path(options.config_path.as_deref());
        match maybe_path {
            Some(path) if path.exists() => {
                let patch = read_patch(&path)?;
                config.apply_patch(patch)?;
            }
            Some(path) if options.require_file => {
                return Err(ConfigError::MissingConfigFile(path));
            }
            _ => {}
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(base_url) = patch.llm.base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = patch.llm.model {
            self.llm.model = model;
        }
        if let Some(api_key) = patch.llm.api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(timeout) = patch.llm.timeout_secs {
            self.llm.timeout_secs = timeout;
        }
        if let Some(retries) = patch.llm.max_retries {
            self.llm.max_retries = retries;
        }

        if let Some(seed) = patch.game.seed {
            self.game.seed = seed;
        }
        if let Some(funds) = patch.game.starting_funds {
            self.game.starting_funds =
                Decimal::from_f64_retain(funds).unwrap_or(self.game.starting_funds).round_dp(2);
        }
        if let Some(multiplier) = patch.game.travel_cost_multiplier {
            self.game.travel_cost_multiplier = Decimal::from_f64_retain(multiplier)
                .unwrap_or(self.game.travel_cost_multiplier)
                .round_dp(2);
        }
        if let Some(n) = patch.game.n_locations {
            self.game.n_locations = n;
        }
        if let Some(year_length) = patch.game.year_length {
            self.game.year_length = year_length;
        }
        if let Some(budget) = patch.game.unparseable_budget {
            self.game.unparseable_budget = budget;
        }
        if let Some(cap) = patch.game.max_turns {
            self.game.max_turns = Some(cap);
        }

        if let Some(level) = patch.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = patch.logging.format {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("HAGGLE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Ok(value) = env::var("HAGGLE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Ok(value) = env::var("HAGGLE_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Ok(value) = env::var("HAGGLE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("HAGGLE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Ok(value) = env::var("HAGGLE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("HAGGLE_LLM_MAX_RETRIES", &value)?;
        }
        if let Ok(value) = env::var("HAGGLE_SEED") {
            self.game.seed = parse_env("HAGGLE_SEED", &value)?;
        }
        if let Ok(value) = env::var("HAGGLE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Ok(value) = env::var("HAGGLE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(timeout) = overrides.llm_timeout_secs {
            self.llm.timeout_secs = timeout;
        }
        if let Some(retries) = overrides.llm_max_retries {
            self.llm.max_retries = retries;
        }
        if let Some(seed) = overrides.seed {
            self.game.seed = seed;
        }
        if let Some(cap) = overrides.max_turns {
            self.game.max_turns = Some(cap);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("llm.base_url must not be empty".to_string()));
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "llm.base_url must be an http(s) URL, got `{}`",
                self.llm.base_url
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation("llm.timeout_secs must be positive".to_string()));
        }
        if self.game.starting_funds <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "game.starting_funds must be positive".to_string(),
            ));
        }
        if self.game.n_locations < 2 {
            return Err(ConfigError::Validation(
                "game.n_locations must be at least 2".to_string(),
            ));
        }
        if self.game.unparseable_budget == 0 {
            return Err(ConfigError::Validation(
                "game.unparseable_budget must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective configuration for inspection, with secrets redacted.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "llm": {
                "base_url": self.llm.base_url,
                "model": self.llm.model,
                "api_key": self.llm.api_key.as_ref().map(|_| "***redacted***"),
                "timeout_secs": self.llm.timeout_secs,
                "max_retries": self.llm.max_retries,
            },
            "game": {
                "seed": self.game.seed,
                "starting_funds": self.game.starting_funds.to_string(),
                "travel_cost_multiplier": self.game.travel_cost_multiplier.to_string(),
                "n_locations": self.game.n_locations,
                "year_length": self.game.year_length,
                "unparseable_budget": self.game.unparseable_budget,
                "max_turns": self.game.max_turns,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = env::var("HAGGLE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from("haggle.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::load(LoadOptions::default()).expect("defaults are valid");
        assert_eq!(config.game.seed, 134);
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.game.unparseable_budget, 2);
        assert!(config.game.max_turns.is_none());
    }

    #[test]
    fn file_patch_applies_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        write!(
            file,
            "[llm]\nbase_url = \"http://models.internal:8000/v1/chat/completions\"\n\
             [game]\nseed = 7\nstarting_funds = 25.5\n[logging]\nformat = \"json\"\n"
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            ..LoadOptions::default()
        })
        .expect("patched config loads");

        assert_eq!(config.llm.base_url, "http://models.internal:8000/v1/chat/completions");
        assert_eq!(config.game.seed, 7);
        assert_eq!(config.game.starting_funds, Decimal::new(2_550, 2));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn programmatic_overrides_beat_file_values() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        write!(file, "[game]\nseed = 7\n").expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            overrides: ConfigOverrides { seed: Some(99), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        })
        .expect("config loads");

        assert_eq!(config.game.seed, 99);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/haggle.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("required file is missing");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn non_http_base_url_fails_validation() {
        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_base_url: Some("ftp://nowhere".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect_err("ftp urls are rejected");

        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn redacted_summary_never_leaks_the_api_key() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-very-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config loads");

        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("sk-very-secret"));
        assert!(summary.contains("***redacted***"));
    }
}
