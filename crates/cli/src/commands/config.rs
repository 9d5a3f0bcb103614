use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use haggle_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    let lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
        render_line("llm.base_url", &config.llm.base_url, source("llm.base_url", "HAGGLE_LLM_BASE_URL")),
        render_line("llm.model", &config.llm.model, source("llm.model", "HAGGLE_LLM_MODEL")),
        render_line("llm.api_key", api_key, source("llm.api_key", "HAGGLE_LLM_API_KEY")),
        render_line(
            "llm.timeout_secs",
            &config.llm.timeout_secs.to_string(),
            source("llm.timeout_secs", "HAGGLE_LLM_TIMEOUT_SECS"),
        ),
        render_line(
            "llm.max_retries",
            &config.llm.max_retries.to_string(),
            source("llm.max_retries", "HAGGLE_LLM_MAX_RETRIES"),
        ),
        render_line("game.seed", &config.game.seed.to_string(), source("game.seed", "HAGGLE_SEED")),
        render_line(
            "game.starting_funds",
            &config.game.starting_funds.to_string(),
            source("game.starting_funds", ""),
        ),
        render_line(
            "game.travel_cost_multiplier",
            &config.game.travel_cost_multiplier.to_string(),
            source("game.travel_cost_multiplier", ""),
        ),
        render_line(
            "game.n_locations",
            &config.game.n_locations.to_string(),
            source("game.n_locations", ""),
        ),
        render_line(
            "game.year_length",
            &config.game.year_length.to_string(),
            source("game.year_length", ""),
        ),
        render_line(
            "game.unparseable_budget",
            &config.game.unparseable_budget.to_string(),
            source("game.unparseable_budget", ""),
        ),
        render_line(
            "game.max_turns",
            &config
                .game
                .max_turns
                .map(|cap| cap.to_string())
                .unwrap_or_else(|| "<unbounded>".to_string()),
            source("game.max_turns", ""),
        ),
        render_line("logging.level", &config.logging.level, source("logging.level", "HAGGLE_LOG_LEVEL")),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", "HAGGLE_LOG_FORMAT"),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("HAGGLE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let root = PathBuf::from("haggle.toml");
    root.exists().then_some(root)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if !env_key.is_empty() && env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
