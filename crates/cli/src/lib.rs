pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "disputary",
    about = "Disputary operator CLI",
    long_about = "Operate Disputary migrations, demo fixtures, config inspection, webhook replay, and dispute workflow actions.",
    after_help = "Examples:\n  disputary doctor --json\n  disputary replay --payload-id PAY-0199f2e1\n  disputary transition --dispute-id DSP-0199f2e1 --action submit --actor analyst-7"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (idempotent across runs)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, and migration status")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Re-run ingestion from an archived webhook payload")]
    Replay {
        #[arg(long = "payload-id", help = "Archived payload id (PAY-...)")]
        payload_id: String,
    },
    #[command(about = "Apply a workflow action (submit, accept, reject, resubmit) to a dispute")]
    Transition {
        #[arg(long = "dispute-id", help = "Dispute id (DSP-...)")]
        dispute_id: String,
        #[arg(long, help = "Workflow action: submit, accept, reject, or resubmit")]
        action: String,
        #[arg(long, help = "Actor recorded against the transition")]
        actor: String,
        #[arg(long, help = "Feedback reason (required when rejecting)")]
        reason: Option<String>,
        #[arg(long, help = "Free-form feedback comments")]
        comments: Option<String>,
        #[arg(long = "evidence", help = "Requested evidence file name (repeatable)")]
        evidence: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Replay { payload_id } => commands::replay::run(&payload_id),
        Command::Transition { dispute_id, action, actor, reason, comments, evidence } => {
            commands::transition::run(commands::transition::TransitionArgs {
                dispute_id,
                action,
                actor,
                reason,
                comments,
                evidence,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
