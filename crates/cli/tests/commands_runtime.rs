use std::env;
use std::sync::{Mutex, OnceLock};

use matreq_cli::commands::{doctor, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("MATREQ_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("MATREQ_DATABASE_URL", "postgres://localhost/matreq")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_demo_request_summary() {
    with_env(&[("MATREQ_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("3 materials and 2 requests"));
        assert!(message.contains(
            "  - REQ-001: req-seed-001 (Office supplies for new employees - awaiting approval)"
        ));
        assert!(message.contains(
            "  - REQ-002: req-seed-002 (Replacement laptops for finance team - approved)"
        ));
    });
}

#[test]
fn seed_is_idempotent_across_runs_on_one_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("seed.db").display());

    with_env(&[("MATREQ_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn doctor_reports_pass_with_defaults_in_memory() {
    with_env(&[("MATREQ_DATABASE_URL", "sqlite::memory:")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(3));
        assert_eq!(payload["checks"][1]["name"], "email_readiness");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("MATREQ_EMAIL_ENABLED", "true")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "MATREQ_DATABASE_URL",
        "MATREQ_DATABASE_MAX_CONNECTIONS",
        "MATREQ_DATABASE_TIMEOUT_SECS",
        "MATREQ_SERVER_BIND_ADDRESS",
        "MATREQ_SERVER_PORT",
        "MATREQ_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "MATREQ_EMAIL_ENABLED",
        "MATREQ_EMAIL_API_URL",
        "MATREQ_EMAIL_SERVICE_ID",
        "MATREQ_EMAIL_TEMPLATE_ID",
        "MATREQ_EMAIL_PUBLIC_KEY",
        "MATREQ_EMAIL_ACCESS_TOKEN",
        "MATREQ_EMAIL_TIMEOUT_SECS",
        "MATREQ_WORKFLOW_APPROVAL_BASE_URL",
        "MATREQ_LOGGING_LEVEL",
        "MATREQ_LOGGING_FORMAT",
        "MATREQ_LOG_LEVEL",
        "MATREQ_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
