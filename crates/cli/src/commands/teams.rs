use std::fs;
use std::path::Path;

use scrumbot_core::config::LoadOptions;
use scrumbot_core::team::TeamConfig;

use crate::commands::{load_config, CommandResult, EXIT_TEAM_CONFIG};

/// Files that share the config directory but are not team files.
const NON_TEAM_FILES: &[&str] = &["example.toml", "cron.toml", "crons.toml", "scrumbot.toml"];

#[derive(Debug, PartialEq, Eq)]
pub enum TeamCheck {
    Valid { team_id: String, team_name: String },
    Invalid { file: String, problem: String },
}

/// Loads every team file in `config_dir`, keeping the failures instead of skipping them.
pub fn check_teams(config_dir: &Path, cron_file: &Path) -> Result<Vec<TeamCheck>, String> {
    let entries = fs::read_dir(config_dir).map_err(|error| {
        format!("could not read config directory `{}`: {error}", config_dir.display())
    })?;
    let cron_name = cron_file.file_name().map(|name| name.to_string_lossy().to_string());

    let mut paths = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("toml"))
        .filter(|path| {
            let name = path.file_name().map(|name| name.to_string_lossy().to_string());
            !name.as_deref().is_some_and(|name| NON_TEAM_FILES.contains(&name))
                && name != cron_name
        })
        .collect::<Vec<_>>();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| match TeamConfig::from_path(&path) {
            Ok(team) => TeamCheck::Valid { team_id: team.team_id, team_name: team.team_name },
            Err(error) => TeamCheck::Invalid {
                file: path.display().to_string(),
                problem: error.to_string().trim().to_string(),
            },
        })
        .collect())
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("teams", failure),
    };

    let checks = match check_teams(&config.bot.config_dir, &config.bot.cron_file) {
        Ok(checks) => checks,
        Err(message) => {
            return CommandResult::failure("teams", "team_config", message, EXIT_TEAM_CONFIG);
        }
    };

    let lines = checks
        .iter()
        .map(|check| match check {
            TeamCheck::Valid { team_id, team_name } => format!("ok {team_id} ({team_name})"),
            TeamCheck::Invalid { file, problem } => format!("invalid {file}: {problem}"),
        })
        .collect::<Vec<_>>();
    let invalid = checks.iter().filter(|check| matches!(check, TeamCheck::Invalid { .. })).count();

    if invalid > 0 {
        return CommandResult::failure(
            "teams",
            "team_config",
            format!("{invalid} of {} team file(s) failed to load\n{}", checks.len(), lines.join("\n")),
            EXIT_TEAM_CONFIG,
        );
    }
    if checks.is_empty() {
        return CommandResult::success(
            "teams",
            format!("no team files found in `{}`", config.bot.config_dir.display()),
        );
    }
    CommandResult::success(
        "teams",
        format!("{} team file(s) loaded\n{}", checks.len(), lines.join("\n")),
    )
}
