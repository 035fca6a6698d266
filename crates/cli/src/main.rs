use std::process::ExitCode;

fn main() -> ExitCode {
    disputary_cli::run()
}
