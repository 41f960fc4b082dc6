use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Completion provider settings. Phase 1 (tool selection) and phase 2 (reply synthesis)
/// each get their own model and sampling temperature.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub tool_model: String,
    pub response_model: String,
    pub tool_temperature: f32,
    pub response_temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub assistant_name: String,
    pub currency: String,
    pub history_limit: u32,
    pub search_limit: u32,
    pub order_limit: u32,
    pub bind_sessions_to_user: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenRouter,
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenRouter | Self::OpenAi)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_tool_model: Option<String>,
    pub llm_response_model: Option<String>,
    pub server_port: Option<u16>,
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
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://kathir.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenRouter,
                api_key: None,
                base_url: None,
                tool_model: "nvidia/nemotron-3-nano-30b-a3b:free".to_string(),
                response_model: "openai/gpt-oss-120b:free".to_string(),
                tool_temperature: 0.3,
                response_temperature: 0.7,
                max_output_tokens: 500,
                timeout_secs: 60,
            },
            agent: AgentConfig {
                assistant_name: "Kathir AI".to_string(),
                currency: "EGP".to_string(),
                history_limit: 20,
                search_limit: 10,
                order_limit: 5,
                bind_sessions_to_user: false,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    /// Explicit base URL, or the provider's public endpoint.
    pub fn endpoint(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.provider.default_base_url())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openrouter" | "open_router" => Ok(Self::OpenRouter),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openrouter|openai|ollama)"
            ))),
        }
    }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.apply_patch(read_patch(&path)?),
            None if options.require_file => {
                let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kathir.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        let ConfigPatch { database, llm, agent, server, logging } = patch;

        if let Some(database) = database {
            set(&mut self.database.url, database.url);
            set(&mut self.database.max_connections, database.max_connections);
            set(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = llm {
            set(&mut self.llm.provider, llm.provider);
            set_some(&mut self.llm.api_key, llm.api_key.map(secret_value));
            set_some(&mut self.llm.base_url, llm.base_url);
            set(&mut self.llm.tool_model, llm.tool_model);
            set(&mut self.llm.response_model, llm.response_model);
            set(&mut self.llm.tool_temperature, llm.tool_temperature);
            set(&mut self.llm.response_temperature, llm.response_temperature);
            set(&mut self.llm.max_output_tokens, llm.max_output_tokens);
            set(&mut self.llm.timeout_secs, llm.timeout_secs);
        }

        if let Some(agent) = agent {
            set(&mut self.agent.assistant_name, agent.assistant_name);
            set(&mut self.agent.currency, agent.currency);
            set(&mut self.agent.history_limit, agent.history_limit);
            set(&mut self.agent.search_limit, agent.search_limit);
            set(&mut self.agent.order_limit, agent.order_limit);
            set(&mut self.agent.bind_sessions_to_user, agent.bind_sessions_to_user);
        }

        if let Some(server) = server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.port, server.port);
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    /// `KATHIR_*` variables; `OPENROUTER_API_KEY` and the `KATHIR_LOG_*` spellings are
    /// accepted as fallbacks.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        set(&mut self.database.url, read_env("KATHIR_DATABASE_URL"));
        set(&mut self.database.max_connections, env_parsed("KATHIR_DATABASE_MAX_CONNECTIONS")?);
        set(&mut self.database.timeout_secs, env_parsed("KATHIR_DATABASE_TIMEOUT_SECS")?);

        set(&mut self.llm.provider, env_parsed("KATHIR_LLM_PROVIDER")?);
        let api_key = read_env("KATHIR_LLM_API_KEY").or_else(|| read_env("OPENROUTER_API_KEY"));
        set_some(&mut self.llm.api_key, api_key.map(secret_value));
        set_some(&mut self.llm.base_url, read_env("KATHIR_LLM_BASE_URL"));
        set(&mut self.llm.tool_model, read_env("KATHIR_LLM_TOOL_MODEL"));
        set(&mut self.llm.response_model, read_env("KATHIR_LLM_RESPONSE_MODEL"));
        set(&mut self.llm.tool_temperature, env_parsed("KATHIR_LLM_TOOL_TEMPERATURE")?);
        set(&mut self.llm.response_temperature, env_parsed("KATHIR_LLM_RESPONSE_TEMPERATURE")?);
        set(&mut self.llm.max_output_tokens, env_parsed("KATHIR_LLM_MAX_OUTPUT_TOKENS")?);
        set(&mut self.llm.timeout_secs, env_parsed("KATHIR_LLM_TIMEOUT_SECS")?);

        set(&mut self.agent.currency, read_env("KATHIR_AGENT_CURRENCY"));
        set(&mut self.agent.history_limit, env_parsed("KATHIR_AGENT_HISTORY_LIMIT")?);
        set(
            &mut self.agent.bind_sessions_to_user,
            env_parsed("KATHIR_AGENT_BIND_SESSIONS_TO_USER")?,
        );

        set(&mut self.server.bind_address, read_env("KATHIR_SERVER_BIND_ADDRESS"));
        set(&mut self.server.port, env_parsed("KATHIR_SERVER_PORT")?);
        set(
            &mut self.server.graceful_shutdown_secs,
            env_parsed("KATHIR_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        set(
            &mut self.logging.level,
            read_env("KATHIR_LOGGING_LEVEL").or_else(|| read_env("KATHIR_LOG_LEVEL")),
        );
        if let Some(format) =
            read_env("KATHIR_LOGGING_FORMAT").or_else(|| read_env("KATHIR_LOG_FORMAT"))
        {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        set(&mut self.database.url, overrides.database_url);
        set(&mut self.logging.level, overrides.log_level);
        set(&mut self.llm.provider, overrides.llm_provider);
        set_some(&mut self.llm.api_key, overrides.llm_api_key.map(secret_value));
        set_some(&mut self.llm.base_url, overrides.llm_base_url);
        set(&mut self.llm.tool_model, overrides.llm_tool_model);
        set(&mut self.llm.response_model, overrides.llm_response_model);
        set(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kathir.toml"), PathBuf::from("config/kathir.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Expands `${VAR}` references. Unset variables are an error, not an empty string.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after_open[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after_open[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn ensure_range<T: PartialOrd + std::fmt::Display>(
    key: &str,
    value: T,
    min: T,
    max: T,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(validation(format!("{key} must be in range {min}..={max}")));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        ));
    }

    if database.max_connections == 0 {
        return Err(validation("database.max_connections must be greater than zero"));
    }
    ensure_range("database.timeout_secs", database.timeout_secs, 1, 300)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    ensure_range("llm.timeout_secs", llm.timeout_secs, 1, 300)?;
    ensure_range("llm.tool_temperature", llm.tool_temperature, 0.0, 2.0)?;
    ensure_range("llm.response_temperature", llm.response_temperature, 0.0, 2.0)?;

    if llm.max_output_tokens == 0 {
        return Err(validation("llm.max_output_tokens must be greater than zero"));
    }

    if llm.tool_model.trim().is_empty() || llm.response_model.trim().is_empty() {
        return Err(validation("llm.tool_model and llm.response_model must both be set"));
    }

    let has_key =
        llm.api_key.as_ref().is_some_and(|value| !value.expose_secret().trim().is_empty());
    if llm.provider.requires_api_key() && !has_key {
        return Err(validation(
            "llm.api_key is required for openrouter/openai providers (set KATHIR_LLM_API_KEY)",
        ));
    }

    match &llm.base_url {
        Some(base_url) if !base_url.starts_with("http://") && !base_url.starts_with("https://") => {
            Err(validation("llm.base_url must start with http:// or https://"))
        }
        _ => Ok(()),
    }
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    ensure_range("agent.history_limit", agent.history_limit, 1, 200)?;
    ensure_range("agent.search_limit", agent.search_limit, 1, 50)?;
    ensure_range("agent.order_limit", agent.order_limit, 1, 20)?;

    if agent.currency.trim().is_empty() {
        return Err(validation("agent.currency must not be empty"));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(validation("server.port must be greater than zero"));
    }
    if server.graceful_shutdown_secs == 0 {
        return Err(validation("server.graceful_shutdown_secs must be greater than zero"));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    match logging.level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validation("logging.level must be one of trace|debug|info|warn|error")),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    tool_model: Option<String>,
    response_model: Option<String>,
    tool_temperature: Option<f32>,
    response_temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    assistant_name: Option<String>,
    currency: Option<String>,
    history_limit: Option<u32>,
    search_limit: Option<u32>,
    order_limit: Option<u32>,
    bind_sessions_to_user: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    const TOUCHED_VARS: &[&str] = &[
        "KATHIR_DATABASE_URL",
        "KATHIR_LLM_PROVIDER",
        "KATHIR_LLM_API_KEY",
        "OPENROUTER_API_KEY",
        "KATHIR_LLM_RESPONSE_MODEL",
        "KATHIR_LLM_TOOL_TEMPERATURE",
        "KATHIR_SERVER_PORT",
        "KATHIR_LOGGING_LEVEL",
        "KATHIR_LOGGING_FORMAT",
        "KATHIR_LOG_LEVEL",
        "KATHIR_LOG_FORMAT",
        "KATHIR_TEST_SECRET",
    ];

    /// Serializes env access and restores every touched variable on drop.
    struct ScopedEnv {
        saved: Vec<(&'static str, Option<String>)>,
        _guard: MutexGuard<'static, ()>,
    }

    impl ScopedEnv {
        fn with(vars: &[(&str, &str)]) -> Self {
            static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
            let guard = LOCK
                .get_or_init(|| Mutex::new(()))
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            let saved = TOUCHED_VARS.iter().map(|key| (*key, env::var(key).ok())).collect();
            for key in TOUCHED_VARS {
                env::remove_var(key);
            }
            for (key, value) in vars {
                env::set_var(key, value);
            }
            Self { saved, _guard: guard }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("kathir.toml");
        fs::write(&path, body).expect("config file should be writable");
        path
    }

    #[test]
    fn file_values_are_interpolated_from_the_environment() {
        let _env = ScopedEnv::with(&[("KATHIR_TEST_SECRET", "sk-or-from-env")]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            "[llm]\napi_key = \"${KATHIR_TEST_SECRET}\"\ntool_model = \"tool-model-from-file\"\n",
        );

        let config = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            .expect("config should load");

        assert_eq!(
            config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()).as_deref(),
            Some("sk-or-from-env")
        );
        assert_eq!(config.llm.tool_model, "tool-model-from-file");
    }

    #[test]
    fn interpolation_rejects_unset_and_unterminated_references() {
        let _env = ScopedEnv::with(&[]);

        assert!(matches!(
            interpolate_env_vars("key = \"${KATHIR_TEST_SECRET}\""),
            Err(ConfigError::MissingEnvInterpolation { var }) if var == "KATHIR_TEST_SECRET"
        ));
        assert!(matches!(
            interpolate_env_vars("key = \"${KATHIR_TEST_SECRET"),
            Err(ConfigError::UnterminatedInterpolation)
        ));
        assert_eq!(interpolate_env_vars("cost = \"$5\"").expect("plain dollar"), "cost = \"$5\"");
    }

    #[test]
    fn short_logging_env_names_are_accepted() {
        let _env = ScopedEnv::with(&[
            ("KATHIR_LLM_API_KEY", "sk-test"),
            ("KATHIR_LOG_LEVEL", "warn"),
            ("KATHIR_LOG_FORMAT", "pretty"),
        ]);

        let config = AppConfig::load(LoadOptions::default()).expect("config should load");

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn precedence_is_defaults_then_file_then_env_then_overrides() {
        let _env = ScopedEnv::with(&[
            ("KATHIR_DATABASE_URL", "sqlite://from-env.db"),
            ("KATHIR_LLM_RESPONSE_MODEL", "response-from-env"),
        ]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            r#"
[database]
url = "sqlite://from-file.db"

[llm]
api_key = "sk-from-file"
response_model = "response-from-file"

[agent]
history_limit = 12

[logging]
level = "warn"
"#,
        );

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            overrides: ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                log_level: Some("debug".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.llm.response_model, "response-from-env");
        assert_eq!(config.agent.history_limit, 12);
        assert_eq!(config.agent.search_limit, 10);
    }

    #[test]
    fn required_file_must_exist() {
        let _env = ScopedEnv::with(&[("KATHIR_LLM_API_KEY", "sk-test")]);

        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/kathir.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn hosted_provider_without_api_key_fails_fast() {
        let _env = ScopedEnv::with(&[]);

        match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) => assert!(message.contains("llm.api_key")),
            other => panic!("expected api key validation failure, got {other:?}"),
        }
    }

    #[test]
    fn openrouter_key_variable_is_a_fallback() {
        let _env = ScopedEnv::with(&[("OPENROUTER_API_KEY", "sk-or-fallback")]);

        let config = AppConfig::load(LoadOptions::default()).expect("config should load");

        assert_eq!(
            config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()).as_deref(),
            Some("sk-or-fallback")
        );
        assert_eq!(config.llm.endpoint(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn ollama_needs_no_api_key_and_uses_local_endpoint() {
        let _env = ScopedEnv::with(&[("KATHIR_LLM_PROVIDER", "ollama")]);

        let config = AppConfig::load(LoadOptions::default()).expect("config should load");

        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.endpoint(), "http://localhost:11434/v1");
    }

    #[test]
    fn malformed_numeric_env_values_are_reported_with_their_key() {
        let _env = ScopedEnv::with(&[
            ("KATHIR_LLM_PROVIDER", "ollama"),
            ("KATHIR_SERVER_PORT", "eighty"),
        ]);

        match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, value }) => {
                assert_eq!(key, "KATHIR_SERVER_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("expected invalid override, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let _env = ScopedEnv::with(&[
            ("KATHIR_LLM_API_KEY", "sk-test"),
            ("KATHIR_LLM_TOOL_TEMPERATURE", "3.5"),
        ]);

        match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) => {
                assert!(message.starts_with("llm.tool_temperature must be in range"), "{message}")
            }
            other => panic!("expected temperature validation failure, got {other:?}"),
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() {
        let _env = ScopedEnv::with(&[("KATHIR_LLM_API_KEY", "sk-or-secret-value")]);

        let config = AppConfig::load(LoadOptions::default()).expect("config should load");

        assert!(!format!("{config:?}").contains("sk-or-secret-value"));
        assert_eq!(config.logging.format, LogFormat::Compact);
    }
}
