use std::str::FromStr;

use scrumbot_core::config::{AppConfig, LoadOptions};
use scrumbot_core::schedule::{load_cron_table, CronAction};
use serde::Serialize;

use crate::commands::{block_on, connect, CommandResult, EXIT_CONFIG, EXIT_DATABASE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["slack_readiness", "trello_readiness", "database_connectivity", "cron_table"];

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = exit_code_for(&report);

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

pub fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_slack(&config));
            checks.push(check_trello(&config));
            checks.push(check_database_connectivity(&config));
            checks.push(check_cron_table(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
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

/// Exit code of the first failing check, 0 when everything passed.
fn exit_code_for(report: &DoctorReport) -> u8 {
    report
        .checks
        .iter()
        .find(|check| check.status == CheckStatus::Fail)
        .map(|check| match check.name {
            "database_connectivity" => EXIT_DATABASE,
            _ => EXIT_CONFIG,
        })
        .unwrap_or(0)
}

/// Token shape is enforced by config validation; this covers the channels commands rely on.
fn check_slack(config: &AppConfig) -> DoctorCheck {
    let missing = [
        ("slack.admin_channel", &config.slack.admin_channel),
        ("slack.scrum_channel", &config.slack.scrum_channel),
        ("bot.user_id", &config.bot.user_id),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(key, _)| key)
    .collect::<Vec<_>>();

    if missing.is_empty() {
        let delivery = if config.slack.webhook_url.is_some() { "webhook" } else { "chat.postMessage" };
        DoctorCheck::pass(
            "slack_readiness",
            format!("tokens have the expected shape; channel posts use {delivery}"),
        )
    } else {
        DoctorCheck::fail(
            "slack_readiness",
            format!("blank values would refuse every permissioned command: {}", missing.join(", ")),
        )
    }
}

fn check_trello(config: &AppConfig) -> DoctorCheck {
    if config.trello.bot_member_id.trim().is_empty() {
        return DoctorCheck::fail(
            "trello_readiness",
            "trello.bot_member_id is blank; the bot cannot recognise its own card comments",
        );
    }
    DoctorCheck::pass("trello_readiness", "trello key, token and bot member id are set")
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let result = block_on(async {
        let pool = connect(config).await?;
        pool.close().await;
        Ok(())
    });

    match result {
        Ok(()) => DoctorCheck::pass("database_connectivity", "database connection succeeded"),
        Err((_, message, _)) => DoctorCheck::fail(
            "database_connectivity",
            format!("failed to connect to database: {message}"),
        ),
    }
}

fn check_cron_table(config: &AppConfig) -> DoctorCheck {
    let entries = match load_cron_table(&config.bot.cron_file) {
        Ok(entries) => entries,
        Err(error) => return DoctorCheck::fail("cron_table", error.to_string()),
    };

    let unknown = entries
        .iter()
        .filter(|entry| CronAction::from_str(&entry.action).is_err())
        .map(|entry| format!("`{}`", entry.action))
        .collect::<Vec<_>>();

    if unknown.is_empty() {
        DoctorCheck::pass(
            "cron_table",
            format!("{} job(s) in `{}`", entries.len(), config.bot.cron_file.display()),
        )
    } else {
        DoctorCheck::fail("cron_table", format!("unknown action(s): {}", unknown.join(", ")))
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
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
