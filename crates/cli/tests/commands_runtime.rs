use std::collections::BTreeMap;
use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use disputary_cli::commands::transition::TransitionArgs;
use disputary_cli::commands::{doctor, migrate, replay, seed, transition};
use disputary_core::domain::payload::{Payload, PayloadId};
use disputary_db::connect_with_settings;
use disputary_db::repositories::{PayloadRepository, SqlPayloadRepository};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("DISPUTARY_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_invalid_env() {
    with_env(&[("DISPUTARY_DATABASE_MAX_CONNECTIONS", "not-a-number")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_both_demo_merchants() {
    with_env(&[("DISPUTARY_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        let aurora_line = "  - MER-DEMO-001: REG-AURORA-001 \
                           (Three-analyst roster plus a manager and a deactivated analyst)";
        let baltic_line = "  - MER-DEMO-002: REG-BALTIC-001 \
                           (No staff at all, exercises unassigned ingestion)";
        assert!(message.contains(aurora_line), "missing Aurora line in: {message}");
        assert!(message.contains(baltic_line), "missing Baltic line in: {message}");
    });
}

#[test]
fn seed_is_idempotent_across_runs_on_the_same_database() {
    let (_dir, url) = temp_db("seed-idempotent");
    with_env(&[("DISPUTARY_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn doctor_passes_on_a_migrated_database() {
    let (_dir, url) = temp_db("doctor-pass");
    with_env(&[("DISPUTARY_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0, "expected migrate to succeed");

        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "pass", "report: {report}");
        assert_eq!(check_status(&report, "config_validation"), "pass");
        assert_eq!(check_status(&report, "webhook_secret_readiness"), "pass");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "migration_status"), "pass");
    });
}

#[test]
fn doctor_flags_an_unmigrated_database() {
    let (_dir, url) = temp_db("doctor-unmigrated");
    with_env(&[("DISPUTARY_DATABASE_URL", url.as_str())], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail", "report: {report}");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "migration_status"), "fail");
    });
}

#[test]
fn doctor_skips_downstream_checks_when_config_is_invalid() {
    with_env(&[("DISPUTARY_WEBHOOK_SECRET", "too-short")], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail", "report: {report}");
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "skipped");
        assert_eq!(check_status(&report, "migration_status"), "skipped");
    });
}

#[test]
fn replay_reruns_an_archived_payload_idempotently() {
    let (_dir, url) = temp_db("replay-archived");
    with_env(&[("DISPUTARY_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0, "expected migrate to succeed");
        assert_eq!(seed::run().exit_code, 0, "expected seed to succeed");

        let payload_id = archive_payload(&url, "REG-AURORA-001", "gw-replay-100");

        let first = replay::run(&payload_id);
        assert_eq!(first.exit_code, 0, "expected replay success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "replay");
        assert_eq!(first_payload["status"], "ok");

        let first_message = first_payload["message"].as_str().unwrap_or("").to_string();
        let dispute_id = extract_id(&first_message, "DSP-");
        assert!(first_message.contains("PENDING"), "unexpected message: {first_message}");

        // A second replay of the same archived payload must update the same
        // dispute, not create a sibling.
        let second = replay::run(&payload_id);
        assert_eq!(second.exit_code, 0, "expected replay to stay idempotent");
        let second_message =
            parse_payload(&second.output)["message"].as_str().unwrap_or("").to_string();
        assert_eq!(extract_id(&second_message, "DSP-"), dispute_id);
    });
}

#[test]
fn replay_reports_missing_payload() {
    let (_dir, url) = temp_db("replay-missing");
    with_env(&[("DISPUTARY_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0, "expected migrate to succeed");

        let result = replay::run("PAY-does-not-exist");
        assert_eq!(result.exit_code, 5, "expected missing payload failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "replay");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "payload_not_found");
    });
}

#[test]
fn transition_walks_reject_and_resubmit_flow() {
    let (_dir, url) = temp_db("transition-flow");
    with_env(&[("DISPUTARY_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0, "expected migrate to succeed");
        assert_eq!(seed::run().exit_code, 0, "expected seed to succeed");

        let payload_id = archive_payload(&url, "REG-AURORA-001", "gw-flow-200");
        let replayed = replay::run(&payload_id);
        assert_eq!(replayed.exit_code, 0, "expected replay success: {}", replayed.output);
        let message =
            parse_payload(&replayed.output)["message"].as_str().unwrap_or("").to_string();
        let dispute_id = extract_id(&message, "DSP-");

        let submitted = transition::run(transition_args(&dispute_id, "submit", None));
        assert_eq!(submitted.exit_code, 0, "expected submit success: {}", submitted.output);
        assert!(parse_payload(&submitted.output)["message"]
            .as_str()
            .unwrap_or("")
            .contains("SUBMITTED"));

        let rejected_blind = transition::run(transition_args(&dispute_id, "reject", None));
        assert_eq!(rejected_blind.exit_code, 5, "reject without a reason must fail");
        let payload = parse_payload(&rejected_blind.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "validation");

        let rejected =
            transition::run(transition_args(&dispute_id, "reject", Some("missing receipt")));
        assert_eq!(rejected.exit_code, 0, "expected reject success: {}", rejected.output);
        assert!(parse_payload(&rejected.output)["message"]
            .as_str()
            .unwrap_or("")
            .contains("REJECTED"));

        let resubmitted = transition::run(transition_args(&dispute_id, "resubmit", None));
        assert_eq!(resubmitted.exit_code, 0, "expected resubmit success: {}", resubmitted.output);
        assert!(parse_payload(&resubmitted.output)["message"]
            .as_str()
            .unwrap_or("")
            .contains("RESUBMITTED"));

        let accepted = transition::run(transition_args(&dispute_id, "accept", None));
        assert_eq!(accepted.exit_code, 0, "expected accept success: {}", accepted.output);
        let accept_message =
            parse_payload(&accepted.output)["message"].as_str().unwrap_or("").to_string();
        assert!(accept_message.contains("ACCEPTED"), "unexpected message: {accept_message}");
        assert!(accept_message.contains("marked submitted"), "unexpected: {accept_message}");
    });
}

#[test]
fn transition_rejects_unknown_action() {
    with_env(&[("DISPUTARY_DATABASE_URL", "sqlite::memory:")], || {
        let result = transition::run(transition_args("DSP-any", "escalate", None));
        assert_eq!(result.exit_code, 2, "expected invalid action failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_action");
    });
}

fn transition_args(dispute_id: &str, action: &str, reason: Option<&str>) -> TransitionArgs {
    TransitionArgs {
        dispute_id: dispute_id.to_string(),
        action: action.to_string(),
        actor: "cli-runtime-test".to_string(),
        reason: reason.map(str::to_string),
        comments: None,
        evidence: Vec::new(),
    }
}

fn temp_db(label: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let db_path = dir.path().join(format!("{label}.db"));
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    (dir, url)
}

/// Writes one archived webhook payload the way the server's intake would,
/// so `replay` has something real to work from.
fn archive_payload(url: &str, business_ref: &str, gateway_dispute_ref: &str) -> String {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime for payload fixture");

    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("connect for payload fixture");
        let payload = Payload {
            id: PayloadId::generate(),
            business_ref: business_ref.to_string(),
            headers: BTreeMap::new(),
            sender_ip: Some("198.51.100.7".to_string()),
            body: serde_json::json!({
                "gateway": "stripe",
                "gateway_dispute_ref": gateway_dispute_ref,
                "payment_ref": format!("pay-{gateway_dispute_ref}"),
                "amount": "64.25",
                "currency": "USD",
                "reason_code": "4853",
                "reason_text": "cardholder denies purchase",
                "status": "NEEDS_RESPONSE",
                "event": "dispute.created",
            })
            .to_string(),
            received_at: Utc::now(),
        };

        SqlPayloadRepository::new(pool.clone())
            .insert(&payload)
            .await
            .expect("archive payload fixture");
        pool.close().await;
        payload.id.0
    })
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_else(|| panic!("check `{name}` missing from report: {report}"))
        .to_string()
}

fn extract_id(message: &str, prefix: &str) -> String {
    message
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ':' | ','))
        .find(|token| token.starts_with(prefix))
        .unwrap_or_else(|| panic!("expected a `{prefix}` id in `{message}`"))
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "DISPUTARY_DATABASE_URL",
        "DISPUTARY_DATABASE_MAX_CONNECTIONS",
        "DISPUTARY_DATABASE_TIMEOUT_SECS",
        "DISPUTARY_SERVER_BIND_ADDRESS",
        "DISPUTARY_SERVER_PORT",
        "DISPUTARY_SERVER_HEALTH_CHECK_PORT",
        "DISPUTARY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "DISPUTARY_WEBHOOK_SECRET",
        "DISPUTARY_LOGGING_LEVEL",
        "DISPUTARY_LOGGING_FORMAT",
        "DISPUTARY_LOG_LEVEL",
        "DISPUTARY_LOG_FORMAT",
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
