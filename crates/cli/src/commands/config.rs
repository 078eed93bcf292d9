use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use grantwise_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILES};
use secrecy::ExposeSecret;
use toml::Value;

struct Setting {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    render(&config)
}

/// Effective values, one line each, with the source that supplied them.
pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = match &config.llm.api_key {
        Some(key) => redact_secret(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let phrase_seed = config
        .conversation
        .phrase_seed
        .map(|seed| seed.to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    let settings = [
        Setting {
            key_path: "llm.api_key",
            value: api_key,
            env_keys: &["GRANTWISE_LLM_API_KEY", "GEMINI_API_KEY"],
        },
        Setting {
            key_path: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["GRANTWISE_LLM_BASE_URL"],
        },
        Setting {
            key_path: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["GRANTWISE_LLM_MODEL"],
        },
        Setting {
            key_path: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["GRANTWISE_LLM_TIMEOUT_SECS"],
        },
        Setting {
            key_path: "llm.max_retries",
            value: config.llm.max_retries.to_string(),
            env_keys: &["GRANTWISE_LLM_MAX_RETRIES"],
        },
        Setting {
            key_path: "llm.temperature",
            value: config.llm.temperature.to_string(),
            env_keys: &["GRANTWISE_LLM_TEMPERATURE"],
        },
        Setting {
            key_path: "conversation.history_window",
            value: config.conversation.history_window.to_string(),
            env_keys: &["GRANTWISE_CONVERSATION_HISTORY_WINDOW"],
        },
        Setting {
            key_path: "conversation.phrase_seed",
            value: phrase_seed,
            env_keys: &["GRANTWISE_CONVERSATION_PHRASE_SEED"],
        },
        Setting {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["GRANTWISE_LOGGING_LEVEL", "GRANTWISE_LOG_LEVEL"],
        },
        Setting {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["GRANTWISE_LOGGING_FORMAT", "GRANTWISE_LOG_FORMAT"],
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(settings.iter().map(|setting| {
        render_line(
            setting.key_path,
            &setting.value,
            field_source(
                setting.key_path,
                setting.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        )
    }));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

/// Keeps only the last four characters of keys long enough for that to stay anonymous.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars = trimmed.chars().collect::<Vec<_>>();
    if chars.len() >= 16 {
        let tail = chars[chars.len() - 4..].iter().collect::<String>();
        return format!("***{tail}");
    }

    "<redacted>".to_string()
}
