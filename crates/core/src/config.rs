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
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub bank: BankConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Tunables for the turn pipeline: the processing deadline, the retry budget
/// for durable writes, and how much transcript the agents see.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub turn_deadline_secs: u64,
    pub write_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
    pub history_window: u32,
    pub metrics_rollup_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BankConfig {
    /// Display name used in disclosures and agent replies.
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    AsiOne,
    OpenAi,
    Ollama,
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
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub bank_name: Option<String>,
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
                url: "sqlite://teller.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::AsiOne,
                api_key: None,
                base_url: Some("https://api.asi1.ai/v1".to_string()),
                model: "asi1-mini".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            engine: EngineConfig {
                turn_deadline_secs: 30,
                write_retry_attempts: 3,
                retry_base_delay_ms: 200,
                retry_backoff_multiplier: 2,
                history_window: 15,
                metrics_rollup_interval_secs: 3_600,
            },
            bank: BankConfig { name: "First Community Bank".to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asi_one" | "asi-one" => Ok(Self::AsiOne),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected asi_one|openai|ollama)"
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
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("teller.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(api_key_value.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(turn_deadline_secs) = engine.turn_deadline_secs {
                self.engine.turn_deadline_secs = turn_deadline_secs;
            }
            if let Some(write_retry_attempts) = engine.write_retry_attempts {
                self.engine.write_retry_attempts = write_retry_attempts;
            }
            if let Some(retry_base_delay_ms) = engine.retry_base_delay_ms {
                self.engine.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_backoff_multiplier) = engine.retry_backoff_multiplier {
                self.engine.retry_backoff_multiplier = retry_backoff_multiplier;
            }
            if let Some(history_window) = engine.history_window {
                self.engine.history_window = history_window;
            }
            if let Some(metrics_rollup_interval_secs) = engine.metrics_rollup_interval_secs {
                self.engine.metrics_rollup_interval_secs = metrics_rollup_interval_secs;
            }
        }

        if let Some(bank) = patch.bank {
            if let Some(name) = bank.name {
                self.bank.name = name;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TELLER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TELLER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TELLER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TELLER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TELLER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TELLER_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TELLER_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("TELLER_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TELLER_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TELLER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TELLER_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TELLER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TELLER_SERVER_PORT") {
            self.server.port = parse_u16("TELLER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TELLER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TELLER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TELLER_ENGINE_TURN_DEADLINE_SECS") {
            self.engine.turn_deadline_secs = parse_u64("TELLER_ENGINE_TURN_DEADLINE_SECS", &value)?;
        }
        if let Some(value) = read_env("TELLER_ENGINE_WRITE_RETRY_ATTEMPTS") {
            self.engine.write_retry_attempts =
                parse_u32("TELLER_ENGINE_WRITE_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("TELLER_ENGINE_HISTORY_WINDOW") {
            self.engine.history_window = parse_u32("TELLER_ENGINE_HISTORY_WINDOW", &value)?;
        }

        if let Some(value) = read_env("TELLER_BANK_NAME") {
            self.bank.name = value;
        }

        let log_level = read_env("TELLER_LOGGING_LEVEL").or_else(|| read_env("TELLER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TELLER_LOGGING_FORMAT").or_else(|| read_env("TELLER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(llm_api_key.into());
        }
        if let Some(bank_name) = overrides.bank_name {
            self.bank.name = bank_name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_engine(&self.engine)?;
        validate_bank(&self.bank)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("teller.toml"), PathBuf::from("config/teller.toml")]
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

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::AsiOne | LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for asi_one/openai providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.turn_deadline_secs == 0 || engine.turn_deadline_secs > 300 {
        return Err(ConfigError::Validation(
            "engine.turn_deadline_secs must be in range 1..=300".to_string(),
        ));
    }

    if engine.write_retry_attempts == 0 {
        return Err(ConfigError::Validation(
            "engine.write_retry_attempts must be greater than zero".to_string(),
        ));
    }

    if engine.history_window == 0 {
        return Err(ConfigError::Validation(
            "engine.history_window must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_bank(bank: &BankConfig) -> Result<(), ConfigError> {
    if bank.name.trim().is_empty() {
        return Err(ConfigError::Validation("bank.name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    engine: Option<EnginePatch>,
    bank: Option<BankPatch>,
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
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    turn_deadline_secs: Option<u64>,
    write_retry_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_backoff_multiplier: Option<u32>,
    history_window: Option<u32>,
    metrics_rollup_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BankPatch {
    name: Option<String>,
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
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLER_LLM_API_KEY", "sk-test");
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.database.url.starts_with("sqlite://"), "default db should be sqlite")?;
            ensure(config.engine.turn_deadline_secs == 30, "default turn deadline is 30s")?;
            ensure(config.engine.write_retry_attempts == 3, "default retry budget is 3")?;
            Ok(())
        })();

        clear_vars(&["TELLER_LLM_API_KEY"]);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TELLER_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("teller.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_TELLER_API_KEY}"

[bank]
name = "Harborview Savings"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            ensure(config.bank.name == "Harborview Savings", "bank name should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_TELLER_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLER_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TELLER_LLM_API_KEY", "sk-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("teller.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["TELLER_DATABASE_URL", "TELLER_LLM_API_KEY"]);
        result
    }

    #[test]
    fn hosted_providers_require_an_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["TELLER_LLM_API_KEY"]);
        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
            "validation failure should mention llm.api_key",
        )
    }

    #[test]
    fn ollama_needs_no_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLER_LLM_PROVIDER", "ollama");
        env::set_var("TELLER_LLM_BASE_URL", "http://localhost:11434");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.llm.provider == LlmProvider::Ollama,
                "provider should be parsed from env",
            )
        })();

        clear_vars(&["TELLER_LLM_PROVIDER", "TELLER_LLM_BASE_URL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLER_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain the key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["TELLER_LLM_API_KEY"]);
        result
    }
}
