//! Executes chat commands against the workflows, the scheduler and the user registry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use tokio::sync::Notify;
use tracing::{info, warn};

use scrumbot_core::domain::records::{Holiday, SquadPointsEntry, UserRecord};
use scrumbot_core::errors::ApplicationError;
use scrumbot_core::ports::{ChatNotifier, HolidayStore, UserStore};
use scrumbot_core::team::{list_teams, render_team_listing};
use scrumbot_core::workflows::tally::render_squad_totals;
use scrumbot_core::{Notice, RetroKind, TeamConfig, WorkflowError, Workflows};
use scrumbot_slack::commands::{
    help_text, Action, ChatRequest, CommandRouteError, CommandService, ParsedCommand, Tier,
};
use scrumbot_slack::web::{member_by_name, SlackDirectory};

use crate::scheduler::Scheduler;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const SHUTDOWN_DELAY: Duration = Duration::from_secs(1);

/// Who may run privileged commands: members of the admin channel, plus members of the
/// scrum channel for scrum-tier commands.
pub struct Permissions {
    directory: Arc<dyn SlackDirectory>,
    admin_channel: String,
    scrum_channel: String,
}

impl Permissions {
    pub fn new(
        directory: Arc<dyn SlackDirectory>,
        admin_channel: impl Into<String>,
        scrum_channel: impl Into<String>,
    ) -> Self {
        Self { directory, admin_channel: admin_channel.into(), scrum_channel: scrum_channel.into() }
    }

    pub async fn allows(&self, tier: Tier, user_id: &str) -> Result<bool, CommandRouteError> {
        let check = |channel: String| {
            let directory = Arc::clone(&self.directory);
            let user_id = user_id.to_string();
            async move { member_by_name(directory.as_ref(), &channel, &user_id).await }
        };
        let allowed = match tier {
            Tier::Anyone => Ok(true),
            Tier::Admin => check(self.admin_channel.clone()).await,
            Tier::Scrum => match check(self.admin_channel.clone()).await {
                Ok(true) => Ok(true),
                Ok(false) => check(self.scrum_channel.clone()).await,
                Err(error) => Err(error),
            },
        };
        allowed.map_err(|error| CommandRouteError::Service {
            reply: "I couldn't check your permissions right now, try again in a bit.".into(),
            detail: error.to_string(),
        })
    }
}

pub struct ServiceSettings {
    pub bot_name: String,
    pub bot_user_id: String,
    pub log_channel: String,
    pub config_dir: PathBuf,
    /// File names in the config directory that are not team files.
    pub skip_files: Vec<String>,
}

pub struct BotCommandService {
    workflows: Workflows,
    directory: Arc<dyn SlackDirectory>,
    permissions: Permissions,
    scheduler: Arc<Scheduler>,
    shutdown: Arc<Notify>,
    settings: ServiceSettings,
}

impl BotCommandService {
    pub fn new(
        workflows: Workflows,
        directory: Arc<dyn SlackDirectory>,
        permissions: Permissions,
        scheduler: Arc<Scheduler>,
        shutdown: Arc<Notify>,
        settings: ServiceSettings,
    ) -> Self {
        Self { workflows, directory, permissions, scheduler, shutdown, settings }
    }

    async fn run_team_command(
        &self,
        command: &ParsedCommand,
        team: &TeamConfig,
    ) -> Result<String, WorkflowError> {
        let workflows = &self.workflows;
        let value = command.value.as_deref().unwrap_or_default();

        let reply = match command.action {
            Action::StartSprint => {
                let suppress_retro = command.text.contains("suppress retro");
                workflows.start_sprint(team, suppress_retro).await?.message
            }
            Action::RecordPoints => {
                let sprint = workflows.current_sprint(team).await?;
                let report = workflows.get_all_points(team, &sprint).await?;
                if report.valid {
                    workflows
                        .notify(Notice::with_attachment(
                            &team.sprint_channel,
                            &report.header,
                            "#006400",
                            &report.message,
                        ))
                        .await;
                    format!("{}\n{}", report.header, report.message)
                } else {
                    report.message
                }
            }
            Action::SprintPoints => {
                let sprint = workflows.current_sprint(team).await?;
                let tally = workflows.sprint_squad_points(team, &sprint.sprint_name).await?;
                format!("Squad points for sprint *{}*:\n{}", sprint.sprint_name, render_squad_totals(&tally))
            }
            Action::PreviousSprintPoints => {
                if value.is_empty() {
                    return Ok("Which sprint did you mean? Put the sprint name in curly braces, like `{MC-03-02-2026}`.".into());
                }
                render_previous_points(value, &workflows.previous_sprint_points(value).await?)
            }
            Action::SyncPoints => {
                let (list_id, list_name) = team.column(value);
                let alerts = workflows.sync_points(team, list_id).await?;
                format!("Synced the points field on *{list_name}*.\n{alerts}")
            }
            Action::PointCleanup => {
                let alerts = workflows.point_cleanup(team).await?;
                if alerts.is_empty() {
                    "Points are synced across the sprint columns, nothing changed.".into()
                } else {
                    format!("Points are synced across the sprint columns. These changed:\n{alerts}")
                }
            }
            Action::CleanBacklog => workflows.clean_backlog(team).await?.render(team.backlog_days),
            Action::ArchiveBacklog => {
                let archived = workflows.archive_backlog(team).await?;
                format!("Archived {archived} cards older than {} days from the backlog.", team.backlog_days)
            }
            Action::CleanDone => {
                let archived = workflows.clean_done(team).await?;
                format!("Archived {archived} cards from Done.")
            }
            Action::TemplateCheck => {
                let moved = workflows.template_card(team).await?;
                format!("Moved {moved} template cards back to the top of the backlog.")
            }
            Action::PrSummary => match workflows.pr_summary(team).await? {
                0 => "No PR Cards available".into(),
                count => format!("Posted {count} PR cards to <#{}>.", team.complaint_channel),
            },
            Action::SkippedPr => {
                or_default(workflows.skipped_pr(team).await?, "No cards skipped the review column.")
            }
            Action::StalePr => {
                or_default(workflows.stale_pr_cards(team).await?, "No stale PR cards right now.")
            }
            Action::Troll => {
                let report = workflows.alert_runner(team).await?;
                format!(
                    "Board check finished for *{}*: {} point issues, {} faces removed, {} unassigned cards, {} cards without themes.",
                    team.team_name,
                    report.point_issues.lines().count(),
                    report.members_removed.lines().count(),
                    report.unassigned.lines().count(),
                    report.missing_themes.lines().count(),
                )
            }
            Action::CriticalBugs => match workflows.check_bugs(team).await? {
                0 => "No critical bugs are open.".into(),
                count => format!("{count} critical bugs are open."),
            },
            Action::EpicLinks => {
                or_default(workflows.epic_link(team).await?, "Every `Feature` card has an Epic link.")
            }
            Action::CheckThemes => {
                let (list_id, list_name) = team.column(value);
                let missing = workflows.check_themes(team, list_id).await?;
                if missing.is_empty() {
                    format!("Every card in *{list_name}* has a theme label.")
                } else {
                    format!("Cards in *{list_name}* without a theme label:\n{missing}")
                }
            }
            Action::CountCards => {
                let tally = workflows.count_cards(team).await?;
                format!("Cards per theme in Upcoming and Scoped:\n{}", tally.render("No Theme"))
            }
            Action::ThemePoints => {
                let (list_id, list_name) = team.column(value);
                let tally = workflows.theme_points(team, list_id).await?;
                format!("Points per theme in *{list_name}*:\n{}", tally.render("No Theme"))
            }
            Action::SquadPoints => {
                let (list_id, list_name) = team.column(value);
                let tally = workflows.squad_points(team, list_id).await?;
                format!("Squad points in *{list_name}*:\n{}", render_squad_totals(&tally))
            }
            Action::ChapterCount => {
                let (list_id, list_name) = team.column(value);
                let tally = workflows.chapter_count(team, list_id).await?;
                format!("Cards per chapter in *{list_name}*:\n{}", tally.render("No Chapter"))
            }
            Action::ChapterPoints => {
                let (list_id, list_name) = team.column(value);
                let tally = workflows.chapter_point(team, list_id).await?;
                format!("Points per chapter in *{list_name}*:\n{}", tally.render("No Chapter"))
            }
            Action::RecordChapters => {
                let (_, list_name) = team.column(value);
                let tally = workflows.record_chapters(team, value).await?;
                format!("Recorded chapter counts for *{list_name}*:\n{}", tally.render("No Chapter"))
            }
            Action::CardReport => format!("```{}```", workflows.card_report_csv(team).await?),
            Action::CardTracker => {
                let rows = workflows.card_play(team).await?;
                format!("Loaded {} cards of the current sprint into the card tracker.", rows.len())
            }
            Action::RetroActions => {
                let nagged = workflows.check_action_cards(team).await?;
                format!("Sent {nagged} reminders about stale retro action items.")
            }
            Action::RetroCard => {
                let kind = command
                    .trigger
                    .split_whitespace()
                    .next()
                    .and_then(RetroKind::parse)
                    .unwrap_or(RetroKind::Improve);
                if value.is_empty() {
                    return Ok("What should the card say? Put the title after the team ID.".into());
                }
                workflows.add_retro_card(team, kind, value).await?.reply()
            }
            Action::IgnoreLabel => match workflows.ignore_label(team, value).await? {
                Some(label) => format!("I will no longer treat `{}` as a theme label.", label.name),
                None => format!("I couldn't find a label named `{value}` on the board."),
            },
            other => format!("`{other:?}` does not take a team."),
        };
        Ok(reply)
    }

    async fn add_me(
        &self,
        command: &ParsedCommand,
        request: &ChatRequest,
    ) -> Result<String, CommandRouteError> {
        let values = command.list_values();
        let [email, trello, github] = values.as_slice() else {
            return Ok("Usage: `add me [email,trello,github]`".into());
        };
        if self.workflows.store().user_by_slack_id(&request.user_id).await.map_err(service_error)?.is_some() {
            return Ok(format!("<@{}> you are already registered!", request.user_id));
        }
        let profile = self.directory.user(&request.user_id).await.map_err(service_error)?;
        let user = UserRecord {
            name: profile.full_name().to_string(),
            slack_id: request.user_id.clone(),
            trello: trello.clone(),
            github: github.clone(),
            email: email.clone(),
        };
        self.register(user).await
    }

    async fn add_user(&self, command: &ParsedCommand) -> Result<String, CommandRouteError> {
        let values = command.list_values();
        let [name, email, slack_id, trello, github] = values.as_slice() else {
            return Ok("Usage: `add a new user [name,email,slackid,trello,github]`".into());
        };
        if self.workflows.store().user_by_slack_id(slack_id).await.map_err(service_error)?.is_some() {
            return Ok(format!("<@{slack_id}> is already registered!"));
        }
        self.register(UserRecord {
            name: name.clone(),
            slack_id: slack_id.clone(),
            trello: trello.clone(),
            github: github.clone(),
            email: email.clone(),
        })
        .await
    }

    async fn register(&self, user: UserRecord) -> Result<String, CommandRouteError> {
        self.workflows.store().add_user(&user).await.map_err(service_error)?;
        info!(event_name = "registry.user.added", slack_id = %user.slack_id, "user registered");
        Ok(format!("Registered {} (<@{}>), Trello `{}`, GitHub `{}`.", user.name, user.slack_id, user.trello, user.github))
    }

    fn version_reply(&self, request: &ChatRequest) -> String {
        format!(
            "Hi! My name is {} and I'm version {VERSION}. My slack ID is {}. This channels ID is {}. Your Slack UID is {}. I currently write my logs to {}",
            self.settings.bot_name,
            self.settings.bot_user_id,
            request.channel_id,
            request.user_id,
            self.settings.log_channel
        )
    }
}

#[async_trait]
impl CommandService for BotCommandService {
    async fn permitted(&self, tier: Tier, user_id: &str) -> Result<bool, CommandRouteError> {
        self.permissions.allows(tier, user_id).await
    }

    async fn team_listing(&self) -> Result<String, CommandRouteError> {
        let skip: Vec<&str> = self.settings.skip_files.iter().map(String::as_str).collect();
        let teams = list_teams(&self.settings.config_dir, &skip).map_err(|error| {
            CommandRouteError::Service {
                reply: "I couldn't read the team config directory.".into(),
                detail: error.to_string(),
            }
        })?;
        if teams.is_empty() {
            return Ok("I don't know about any teams yet.".into());
        }
        Ok(render_team_listing(&teams))
    }

    async fn execute(
        &self,
        command: &ParsedCommand,
        request: &ChatRequest,
    ) -> Result<String, CommandRouteError> {
        match command.action {
            Action::Shutdown => {
                warn!(event_name = "system.server.shutdown_requested", user = %request.user_id, "shutdown requested from chat");
                // Leave the socket runner time to post the goodbye.
                let shutdown = Arc::clone(&self.shutdown);
                tokio::spawn(async move {
                    tokio::time::sleep(SHUTDOWN_DELAY).await;
                    shutdown.notify_one();
                });
                Ok("Shutting down, bye for now!".into())
            }
            Action::CronHalt => {
                let halted = self.scheduler.halt().await;
                Ok(format!("Stopped {halted} cron jobs."))
            }
            Action::CronReload => Ok(match self.scheduler.load().await {
                Ok(report) => format!(
                    "Reloaded the cron table: {} jobs scheduled, {} skipped.",
                    report.scheduled, report.skipped
                ),
                Err(error) => error.to_string(),
            }),
            Action::CronList => {
                let table = self.scheduler.list().await;
                let notice = Notice::text(&request.user_id, format!("*Cron jobs* ({}):\n{table}", self.scheduler.status().await.as_str()));
                self.workflows
                    .chat()
                    .direct_message(&request.user_id, &notice)
                    .await
                    .map_err(service_error)?;
                Ok("I sent you the cron list in a DM.".into())
            }
            Action::AddMe => self.add_me(command, request).await,
            Action::AddUser => self.add_user(command).await,
            Action::ListUsers => {
                let users = self.workflows.store().users().await.map_err(service_error)?;
                Ok(render_users(&users))
            }
            Action::Holidays => {
                let year = self.workflows.today().year();
                let holidays =
                    self.workflows.store().holidays_in_year(year).await.map_err(service_error)?;
                Ok(render_holidays(year, &holidays))
            }
            Action::ListTeams => self.team_listing().await,
            Action::Version => Ok(self.version_reply(request)),
            Action::Hello => Ok("Hi there!".into()),
            Action::Help => Ok(help_text()),
            _ => {
                let team_id = command.team.as_deref().unwrap_or_default();
                let team = match TeamConfig::load(&self.settings.config_dir, team_id) {
                    Ok(team) => team,
                    Err(error) => return Ok(error.to_string()),
                };
                self.run_team_command(command, &team).await.map_err(|error| {
                    let detail = error.to_string();
                    let interface = ApplicationError::from(error).into_interface(request.ts.clone());
                    CommandRouteError::Service {
                        reply: format!("{}\n`{detail}`", interface.user_message()),
                        detail,
                    }
                })
            }
        }
    }
}

fn service_error(error: impl std::fmt::Display) -> CommandRouteError {
    CommandRouteError::Service {
        reply: "Something went wrong talking to Slack or the database, please check the logs.".into(),
        detail: error.to_string(),
    }
}

fn or_default(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

fn render_previous_points(sprint_name: &str, entries: &[SquadPointsEntry]) -> String {
    if entries.is_empty() {
        return format!("I don't have any squad points recorded for sprint `{sprint_name}`.");
    }
    let mut output = format!("Squad points recorded for sprint *{sprint_name}*:\n");
    for entry in entries {
        output.push_str(&format!("Total `{}` Points: {}\n", entry.squad_name, entry.points));
    }
    output
}

fn render_users(users: &[UserRecord]) -> String {
    if users.is_empty() {
        return "Nobody is registered yet. Try `add me [email,trello,github]`.".into();
    }
    let mut output = String::from("Registered users:\n");
    for user in users {
        output.push_str(&format!(
            "{} - <@{}> - Trello `{}` - GitHub `{}` - {}\n",
            user.name, user.slack_id, user.trello, user.github, user.email
        ));
    }
    output
}

fn render_holidays(year: i32, holidays: &[Holiday]) -> String {
    if holidays.is_empty() {
        return format!("I don't know about any company holidays in {year}.");
    }
    let mut output = format!("Company holidays for {year}:\n");
    for holiday in holidays {
        output.push_str(&format!("{} - *{}*\n", holiday.date.format("%a %b %e"), holiday.name));
    }
    output
}
