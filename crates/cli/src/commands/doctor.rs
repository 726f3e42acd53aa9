use matreq_core::config::{AppConfig, LoadOptions};
use matreq_db::{connect_with_config, migrations, ping};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_email_readiness(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["email_readiness", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_email_readiness(config: &AppConfig) -> DoctorCheck {
    let email = &config.email;
    if !email.enabled {
        return DoctorCheck {
            name: "email_readiness",
            status: CheckStatus::Pass,
            details: "email delivery disabled; approval notices are logged only".to_string(),
        };
    }

    let token = if email.access_token.as_ref().is_some_and(|t| !t.expose_secret().is_empty()) {
        "with access token"
    } else {
        "without access token"
    };
    DoctorCheck {
        name: "email_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "sending via `{}` as service `{}` template `{}` ({token})",
            email.api_url, email.service_id, email.template_id
        ),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let outcome = match ping(&pool).await {
            Ok(()) => migrations::applied_count(&pool)
                .await
                .map_err(|error| format!("migration status query failed: {error}")),
            Err(error) => Err(format!("database query failed: {error}")),
        };
        pool.close().await;
        outcome
    });

    match result {
        Ok(applied) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}` ({applied} of {} migrations applied)",
                config.database.url,
                migrations::bundled_count()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_report_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Fail,
                    details: "bad url".to_string(),
                },
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Skipped,
                    details: "skipped".to_string(),
                },
            ],
        };

        let rendered = render_human(&report);
        assert!(rendered.contains("- [fail] config_validation: bad url"));
        assert!(rendered.contains("- [skip] database_connectivity: skipped"));
    }
}
