use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_EMAIL_API_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub email: EmailConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub enabled: bool,
    pub api_url: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: SecretString,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub approval_base_url: String,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub email_enabled: Option<bool>,
    pub email_service_id: Option<String>,
    pub email_template_id: Option<String>,
    pub email_public_key: Option<String>,
    pub approval_base_url: Option<String>,
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
                url: "sqlite://matreq.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            email: EmailConfig {
                enabled: false,
                api_url: DEFAULT_EMAIL_API_URL.to_string(),
                service_id: String::new(),
                template_id: String::new(),
                public_key: String::new().into(),
                access_token: None,
                timeout_secs: 10,
            },
            workflow: WorkflowConfig { approval_base_url: "http://localhost:8080".to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("matreq.toml"));
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

        if let Some(email) = patch.email {
            if let Some(enabled) = email.enabled {
                self.email.enabled = enabled;
            }
            if let Some(api_url) = email.api_url {
                self.email.api_url = api_url;
            }
            if let Some(service_id) = email.service_id {
                self.email.service_id = service_id;
            }
            if let Some(template_id) = email.template_id {
                self.email.template_id = template_id;
            }
            if let Some(public_key) = email.public_key {
                self.email.public_key = secret_value(public_key);
            }
            if let Some(access_token) = email.access_token {
                self.email.access_token = Some(secret_value(access_token));
            }
            if let Some(timeout_secs) = email.timeout_secs {
                self.email.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(approval_base_url) = workflow.approval_base_url {
                self.workflow.approval_base_url = approval_base_url;
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
        if let Some(value) = read_env("MATREQ_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MATREQ_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("MATREQ_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MATREQ_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MATREQ_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MATREQ_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MATREQ_SERVER_PORT") {
            self.server.port = parse_u16("MATREQ_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MATREQ_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MATREQ_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("MATREQ_EMAIL_ENABLED") {
            self.email.enabled = parse_bool("MATREQ_EMAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("MATREQ_EMAIL_API_URL") {
            self.email.api_url = value;
        }
        if let Some(value) = read_env("MATREQ_EMAIL_SERVICE_ID") {
            self.email.service_id = value;
        }
        if let Some(value) = read_env("MATREQ_EMAIL_TEMPLATE_ID") {
            self.email.template_id = value;
        }
        if let Some(value) = read_env("MATREQ_EMAIL_PUBLIC_KEY") {
            self.email.public_key = secret_value(value);
        }
        if let Some(value) = read_env("MATREQ_EMAIL_ACCESS_TOKEN") {
            self.email.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("MATREQ_EMAIL_TIMEOUT_SECS") {
            self.email.timeout_secs = parse_u64("MATREQ_EMAIL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MATREQ_WORKFLOW_APPROVAL_BASE_URL") {
            self.workflow.approval_base_url = value;
        }

        let log_level = read_env("MATREQ_LOGGING_LEVEL").or_else(|| read_env("MATREQ_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MATREQ_LOGGING_FORMAT").or_else(|| read_env("MATREQ_LOG_FORMAT"));
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
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.email_enabled {
            self.email.enabled = enabled;
        }
        if let Some(service_id) = overrides.email_service_id {
            self.email.service_id = service_id;
        }
        if let Some(template_id) = overrides.email_template_id {
            self.email.template_id = template_id;
        }
        if let Some(public_key) = overrides.email_public_key {
            self.email.public_key = secret_value(public_key);
        }
        if let Some(approval_base_url) = overrides.approval_base_url {
            self.workflow.approval_base_url = approval_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_email(&self.email)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("matreq.toml"), PathBuf::from("config/matreq.toml")]
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
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

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if email.timeout_secs == 0 || email.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "email.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if !email.enabled {
        return Ok(());
    }

    if !is_http_url(email.api_url.trim()) {
        return Err(ConfigError::Validation(
            "email.api_url must start with http:// or https://".to_string(),
        ));
    }
    if email.service_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.service_id is required when email.enabled is true".to_string(),
        ));
    }
    if email.template_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.template_id is required when email.enabled is true".to_string(),
        ));
    }
    if email.public_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.public_key is required when email.enabled is true".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if !is_http_url(workflow.approval_base_url.trim()) {
        return Err(ConfigError::Validation(
            "workflow.approval_base_url must start with http:// or https://".to_string(),
        ));
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    email: Option<EmailPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    enabled: Option<bool>,
    api_url: Option<String>,
    service_id: Option<String>,
    template_id: Option<String>,
    public_key: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    approval_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
