use std::process::ExitCode;

fn main() -> ExitCode {
    scrumbot_cli::run()
}
