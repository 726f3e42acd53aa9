//! Readiness route: the database answers, every bundled migration is applied,
//! and the approver notifier mode is reported.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use matreq_db::{migrations, ping, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierMode {
    /// Notices go to the configured email HTTP API.
    Email,
    /// Email is disabled; notices are only written to the log.
    LogOnly,
}

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    notifier: NotifierMode,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub database: String,
    pub migrations_applied: usize,
    pub migrations_bundled: usize,
    pub notifier: NotifierMode,
    pub checked_at: DateTime<Utc>,
}

pub fn router(db_pool: DbPool, notifier: NotifierMode) -> Router {
    Router::new().route("/health", get(readiness)).with_state(HealthState { db_pool, notifier })
}

async fn readiness(State(state): State<HealthState>) -> (StatusCode, Json<Readiness>) {
    let bundled = migrations::bundled_count();
    let (database, applied) = match ping(&state.db_pool).await {
        Ok(()) => match migrations::applied_count(&state.db_pool).await {
            Ok(applied) => ("reachable".to_string(), applied),
            Err(error) => (format!("migration status unavailable: {error}"), 0),
        },
        Err(error) => (format!("unreachable: {error}"), 0),
    };

    let ready = applied >= bundled;
    let report = Readiness {
        ready,
        database,
        migrations_applied: applied,
        migrations_bundled: bundled,
        notifier: state.notifier,
        checked_at: Utc::now(),
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}
