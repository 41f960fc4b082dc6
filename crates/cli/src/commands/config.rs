use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kathir_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

struct EffectiveField {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: impl ToString) -> EffectiveField {
    EffectiveField { key, env_keys, value: value.to_string() }
}

fn effective_fields(config: &AppConfig) -> Vec<EffectiveField> {
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        field("database.url", &["KATHIR_DATABASE_URL"], &config.database.url),
        field(
            "database.max_connections",
            &["KATHIR_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections,
        ),
        field("database.timeout_secs", &["KATHIR_DATABASE_TIMEOUT_SECS"], config.database.timeout_secs),
        field("llm.provider", &["KATHIR_LLM_PROVIDER"], config.llm.provider.as_str()),
        field("llm.api_key", &["KATHIR_LLM_API_KEY", "OPENROUTER_API_KEY"], api_key),
        field(
            "llm.base_url",
            &["KATHIR_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        field("llm.tool_model", &["KATHIR_LLM_TOOL_MODEL"], &config.llm.tool_model),
        field("llm.response_model", &["KATHIR_LLM_RESPONSE_MODEL"], &config.llm.response_model),
        field("llm.tool_temperature", &["KATHIR_LLM_TOOL_TEMPERATURE"], config.llm.tool_temperature),
        field(
            "llm.response_temperature",
            &["KATHIR_LLM_RESPONSE_TEMPERATURE"],
            config.llm.response_temperature,
        ),
        field("llm.max_output_tokens", &["KATHIR_LLM_MAX_OUTPUT_TOKENS"], config.llm.max_output_tokens),
        field("llm.timeout_secs", &["KATHIR_LLM_TIMEOUT_SECS"], config.llm.timeout_secs),
        field("agent.assistant_name", &[], &config.agent.assistant_name),
        field("agent.currency", &["KATHIR_AGENT_CURRENCY"], &config.agent.currency),
        field("agent.history_limit", &["KATHIR_AGENT_HISTORY_LIMIT"], config.agent.history_limit),
        field("agent.search_limit", &[], config.agent.search_limit),
        field("agent.order_limit", &[], config.agent.order_limit),
        field(
            "agent.bind_sessions_to_user",
            &["KATHIR_AGENT_BIND_SESSIONS_TO_USER"],
            config.agent.bind_sessions_to_user,
        ),
        field("server.bind_address", &["KATHIR_SERVER_BIND_ADDRESS"], &config.server.bind_address),
        field("server.port", &["KATHIR_SERVER_PORT"], config.server.port),
        field(
            "server.graceful_shutdown_secs",
            &["KATHIR_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs,
        ),
        field("logging.level", &["KATHIR_LOGGING_LEVEL", "KATHIR_LOG_LEVEL"], &config.logging.level),
        field(
            "logging.format",
            &["KATHIR_LOGGING_FORMAT", "KATHIR_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["kathir.toml", "config/kathir.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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
