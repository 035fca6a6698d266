use std::sync::Arc;

use disputary_core::config::{AppConfig, LoadOptions};
use disputary_core::domain::dispute::DisputeId;
use disputary_core::workflow::WorkflowAction;
use disputary_db::connect_with_settings;
use disputary_engine::{FeedbackInput, SystemClock, TracingAuditSink, WorkflowService};

use crate::commands::CommandResult;

#[derive(Debug)]
pub struct TransitionArgs {
    pub dispute_id: String,
    pub action: String,
    pub actor: String,
    pub reason: Option<String>,
    pub comments: Option<String>,
    pub evidence: Vec<String>,
}

pub fn run(args: TransitionArgs) -> CommandResult {
    let Some(action) = WorkflowAction::parse(&args.action) else {
        return CommandResult::failure(
            "transition",
            "invalid_action",
            format!(
                "unknown workflow action `{}` (expected submit, accept, reject, or resubmit)",
                args.action
            ),
            2,
        );
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "transition",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "transition",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let feedback = args.reason.map(|reason| FeedbackInput {
        reason,
        comments: args.comments,
        evidence_files: args.evidence,
    });

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let service =
            WorkflowService::new(pool.clone(), Arc::new(SystemClock), Arc::new(TracingAuditSink));

        let dispute_id = DisputeId(args.dispute_id.clone());
        let outcome = service.transition(&dispute_id, action, &args.actor, feedback).await;
        pool.close().await;

        match outcome {
            Ok(dispute) => {
                let submitted_note =
                    if dispute.is_submitted { " (marked submitted to gateway)" } else { "" };
                Ok(format!(
                    "dispute {} ({}): {} applied by {}, stage now {}{}",
                    dispute.id.0,
                    dispute.code,
                    action.as_str(),
                    args.actor,
                    dispute.stage.as_str(),
                    submitted_note
                ))
            }
            Err(error) => Err((error.kind().as_str(), error.to_string(), 5u8)),
        }
    });

    match result {
        Ok(message) => CommandResult::success("transition", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("transition", error_class, message, exit_code)
        }
    }
}
