use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use matreq_core::audit::AuditSink;
use matreq_core::config::{AppConfig, ConfigError, EmailConfig};
use matreq_core::notify::{ApprovalLinks, Notifier};
use matreq_db::repositories::{
    SqlApprovalRepository, SqlMaterialRepository, SqlNotificationRepository, SqlRequestRepository,
    SqlUserRepository,
};
use matreq_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::{self, ApiState};
use crate::audit::TracingAuditSink;
use crate::email::{EmailJsNotifier, LogNotifier};
use crate::health::{self, NotifierMode};
use crate::lifecycle::LifecycleController;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api_state: ApiState,
}

impl Application {
    pub fn router(&self) -> Router {
        let notifier =
            if self.config.email.enabled { NotifierMode::Email } else { NotifierMode::LogOnly };
        api::router(self.api_state.clone()).merge(health::router(self.db_pool.clone(), notifier))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("email client could not be built: {0}")]
    EmailClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "database migrations applied"
    );

    let notifier = build_notifier(&config.email)?;
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let notifications = Arc::new(SqlNotificationRepository::new(db_pool.clone()));
    let lifecycle = LifecycleController::new(
        Arc::new(SqlRequestRepository::new(db_pool.clone())),
        Arc::new(SqlApprovalRepository::new(db_pool.clone())),
        notifications.clone(),
        notifier,
        audit.clone(),
        ApprovalLinks::new(config.workflow.approval_base_url.clone()),
        Duration::from_secs(config.email.timeout_secs),
    );
    let api_state = ApiState {
        lifecycle: Arc::new(lifecycle),
        materials: Arc::new(SqlMaterialRepository::new(db_pool.clone())),
        users: Arc::new(SqlUserRepository::new(db_pool.clone())),
        notifications,
        audit,
    };

    Ok(Application { config, db_pool, api_state })
}

fn build_notifier(email: &EmailConfig) -> Result<Arc<dyn Notifier>, BootstrapError> {
    if !email.enabled {
        info!(
            event_name = "system.bootstrap.email_disabled",
            correlation_id = "bootstrap",
            request_id = "unknown",
            "email delivery disabled; approval notices will be logged"
        );
        return Ok(Arc::new(LogNotifier));
    }

    let notifier = EmailJsNotifier::from_config(email).map_err(BootstrapError::EmailClient)?;
    Ok(Arc::new(notifier))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
    };
    use matreq_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use matreq_core::domain::notification::Notification;
    use matreq_core::domain::request::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn in_memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_email_is_enabled_without_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                email_enabled: Some(true),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("email.service_id"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_schema_and_serves_submissions() {
        let app = bootstrap(in_memory_options()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('material_request', 'request_line', 'approval_record', 'material')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema tables");
        assert_eq!(table_count, 4);

        let decision = app
            .router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/v1/requests/missing/approve")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(decision.status(), StatusCode::NOT_FOUND);

        let body = json!({
            "requester": "Sarah Wilson",
            "account_code": "HR-5100",
            "amount": 1200,
            "approver_email": "manager@company.com",
            "line_items": [{ "item": "A4 Paper", "quantity": 10 }]
        });
        let response = app
            .router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/v1/requests")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let created: Request = serde_json::from_slice(&bytes).expect("request json");
        assert_eq!(created.request_no.to_string(), "REQ-001");

        let health = app
            .router()
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(health.status(), StatusCode::OK);
        let bytes = to_bytes(health.into_body(), usize::MAX).await.expect("body");
        let report: Value = serde_json::from_slice(&bytes).expect("health json");
        assert_eq!(report["notifier"], "log_only");
        assert_eq!(report["migrations_applied"], report["migrations_bundled"]);

        let inbox = app
            .router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/v1/notifications?recipient=manager@company.com")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let bytes = to_bytes(inbox.into_body(), usize::MAX).await.expect("body");
        let notices: Vec<Notification> = serde_json::from_slice(&bytes).expect("notices json");
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].request_id.as_ref(), Some(&created.id));

        app.db_pool.close().await;
    }
}
