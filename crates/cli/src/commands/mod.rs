pub mod doctor;
pub mod migrate;
pub mod seed;

use matreq_core::config::AppConfig;
use matreq_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Failure raised while preparing a command: class, message and exit code.
pub(crate) type CommandFailure = (&'static str, String, u8);

pub(crate) fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(matreq_core::config::LoadOptions::default())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| ("runtime_init", format!("failed to initialize async runtime: {error}"), 3))
}

pub(crate) async fn migrated_pool(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;
    Ok(pool)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
