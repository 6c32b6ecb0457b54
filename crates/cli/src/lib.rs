pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use scrumbot_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "scrumbot",
    about = "Scrumbot operator CLI",
    long_about = "Check scrumbot readiness, apply migrations, inspect config and validate team files.",
    after_help = "Examples:\n  scrumbot doctor --json\n  scrumbot config\n  scrumbot teams\n  scrumbot seed --file seed.toml"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Path to scrumbot.toml; defaults to ./scrumbot.toml or ./config/scrumbot.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Take Trello, Slack and GitHub credentials from the environment
    #[arg(long, global = true)]
    osenv: bool,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            credentials_from_env: self.osenv,
            ..LoadOptions::default()
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks (config and database) and return structured status")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load squads, chapters, bug labels, holidays and users from a TOML seed file")]
    Seed {
        #[arg(long, value_name = "PATH", help = "Seed file to load")]
        file: PathBuf,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack and Trello readiness, DB connectivity and the cron table")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Load and sanity-check every team file in the config directory")]
    Teams,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Start => commands::start::run(options),
        Command::Migrate => commands::migrate::run(options),
        Command::Seed { file } => commands::seed::run(options, &file),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Teams => commands::teams::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
