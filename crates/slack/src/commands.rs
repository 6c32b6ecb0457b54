//! Declarative chat command table.
//!
//! Messages addressed to the bot are matched against [`COMMANDS`] in order; the first entry
//! with a matching trigger phrase wins. Arguments are pulled from the message by the entry's
//! [`ArgKind`]: a `[team]` token, a `{value}` token, a bracketed list or trailing text.

use async_trait::async_trait;
use thiserror::Error;

use scrumbot_core::domain::board::braced_tag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Anyone,
    Scrum,
    Admin,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Anyone => "",
            Self::Scrum => "scrum",
            Self::Admin => "admin",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgKind {
    None,
    /// `[team]` token.
    Team,
    /// `[team]` token plus a `{value}` or the text after the token.
    TeamAndText,
    /// Comma separated values inside `[...]`.
    Bracketed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Shutdown,
    StartSprint,
    CronHalt,
    CronReload,
    CronList,
    RecordPoints,
    AddUser,
    PreviousSprintPoints,
    SprintPoints,
    SyncPoints,
    PointCleanup,
    CleanBacklog,
    ArchiveBacklog,
    CleanDone,
    TemplateCheck,
    PrSummary,
    SkippedPr,
    StalePr,
    Troll,
    CriticalBugs,
    EpicLinks,
    CheckThemes,
    CountCards,
    ThemePoints,
    SquadPoints,
    ChapterCount,
    ChapterPoints,
    RecordChapters,
    CardReport,
    CardTracker,
    RetroActions,
    RetroCard,
    IgnoreLabel,
    AddMe,
    ListUsers,
    Holidays,
    ListTeams,
    Version,
    Help,
    Hello,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub action: Action,
    pub triggers: &'static [&'static str],
    pub args: ArgKind,
    pub tier: Tier,
    pub usage: &'static str,
    pub summary: &'static str,
}

const fn spec(
    action: Action,
    triggers: &'static [&'static str],
    args: ArgKind,
    tier: Tier,
    usage: &'static str,
    summary: &'static str,
) -> CommandSpec {
    CommandSpec { action, triggers, args, tier, usage, summary }
}

/// Table order is match priority: longer phrases precede phrases they contain.
#[rustfmt::skip]
pub const COMMANDS: &[CommandSpec] = &[
    spec(Action::Shutdown, &["shutdown please"], ArgKind::None, Tier::Admin,
        "shutdown please", "stop the bot"),
    spec(Action::StartSprint, &["start a new sprint"], ArgKind::Team, Tier::Admin,
        "start a new sprint [team]", "roll the board over to a new sprint (add `suppress retro` to skip the retro board)"),
    spec(Action::CronHalt, &["stop all cron"], ArgKind::None, Tier::Scrum,
        "stop all cron", "halt every scheduled job"),
    spec(Action::CronReload, &["reload cron", "load cron"], ArgKind::None, Tier::Scrum,
        "reload cron", "reload the cron table from disk"),
    spec(Action::CronList, &["list cronjobs", "list cron jobs"], ArgKind::None, Tier::Anyone,
        "list cronjobs", "DM the loaded cron table"),
    spec(Action::RecordPoints, &["record points for"], ArgKind::Team, Tier::Scrum,
        "record points for [team]", "record today's burndown points"),
    spec(Action::AddUser, &["add a new user"], ArgKind::Bracketed, Tier::Scrum,
        "add a new user [name,email,slackid,trello,github]", "register someone else"),
    spec(Action::PreviousSprintPoints, &["previous sprint points"], ArgKind::TeamAndText, Tier::Anyone,
        "previous sprint points [team] {sprint}", "squad points recorded for an earlier sprint"),
    spec(Action::SprintPoints, &["current sprint points", "sprint points"], ArgKind::Team, Tier::Anyone,
        "sprint points [team]", "squad points of the current sprint"),
    spec(Action::SyncPoints, &["sync points"], ArgKind::TeamAndText, Tier::Anyone,
        "sync points [team] column", "copy power-up points into the points field of one column"),
    spec(Action::PointCleanup, &["point cleanup", "cleanup points"], ArgKind::Team, Tier::Anyone,
        "point cleanup [team]", "sync points across the sprint columns"),
    spec(Action::CleanBacklog, &["clean backlog", "clean the backlog", "cleanup backlog"], ArgKind::Team, Tier::Anyone,
        "clean backlog [team]", "strip faces, squads and fields off backlog cards"),
    spec(Action::ArchiveBacklog, &["archive backlog"], ArgKind::Team, Tier::Anyone,
        "archive backlog [team]", "archive ancient backlog cards"),
    spec(Action::CleanDone, &["archive done", "clean done"], ArgKind::Team, Tier::Anyone,
        "archive done [team]", "archive old cards in Done"),
    spec(Action::TemplateCheck, &["template check", "check templates"], ArgKind::Team, Tier::Anyone,
        "template check [team]", "move template cards back to the top of the backlog"),
    spec(Action::PrSummary, &["pr summary"], ArgKind::Team, Tier::Anyone,
        "pr summary [team]", "list the cards waiting for review"),
    spec(Action::SkippedPr, &["skipped pr", "skipped review"], ArgKind::Team, Tier::Anyone,
        "skipped pr [team]", "flag cards that reached Done without review"),
    spec(Action::StalePr, &["stale pr", "lagging pr"], ArgKind::Team, Tier::Anyone,
        "stale pr [team]", "alert on review cards older than the stale time"),
    spec(Action::Troll, &["troll", "alert runner", "check the board"], ArgKind::Team, Tier::Anyone,
        "troll [team]", "check points, faces and themes on the sprint columns"),
    spec(Action::CriticalBugs, &["critical bugs", "check bugs"], ArgKind::Team, Tier::Anyone,
        "critical bugs [team]", "alert on open critical bugs"),
    spec(Action::EpicLinks, &["epic links", "check epics"], ArgKind::Team, Tier::Anyone,
        "epic links [team]", "feature cards without an epic link"),
    spec(Action::CheckThemes, &["check themes"], ArgKind::TeamAndText, Tier::Anyone,
        "check themes [team] column", "cards in a column without a theme label"),
    spec(Action::CountCards, &["count cards"], ArgKind::Team, Tier::Anyone,
        "count cards [team]", "card count per theme label"),
    spec(Action::ThemePoints, &["theme points"], ArgKind::TeamAndText, Tier::Anyone,
        "theme points [team] column", "points per theme label in a column"),
    spec(Action::SquadPoints, &["squad points"], ArgKind::TeamAndText, Tier::Anyone,
        "squad points [team] column", "points per squad in a column"),
    spec(Action::ChapterCount, &["chapter count"], ArgKind::TeamAndText, Tier::Anyone,
        "chapter count [team] column", "cards per chapter in a column"),
    spec(Action::ChapterPoints, &["chapter points"], ArgKind::TeamAndText, Tier::Anyone,
        "chapter points [team] column", "points per chapter in a column"),
    spec(Action::RecordChapters, &["record chapters"], ArgKind::TeamAndText, Tier::Anyone,
        "record chapters [team] column", "record the chapter card counts of a column"),
    spec(Action::CardReport, &["card report", "card csv"], ArgKind::Team, Tier::Anyone,
        "card report [team]", "CSV of the current sprint's card timings"),
    spec(Action::CardTracker, &["card tracker", "track cards"], ArgKind::Team, Tier::Anyone,
        "card tracker [team]", "reload the card tracker table"),
    spec(Action::RetroActions, &["retro actions", "check action items"], ArgKind::Team, Tier::Anyone,
        "retro actions [team]", "nag owners of stale retro action items"),
    spec(Action::RetroCard,
        &["well retro card", "good retro card", "wrong retro card", "bad retro card", "vent retro card", "improve retro card"],
        ArgKind::TeamAndText, Tier::Anyone,
        "<well|wrong|vent|improve> retro card [team] title", "add a card to the current retro board"),
    spec(Action::IgnoreLabel, &["ignore label"], ArgKind::TeamAndText, Tier::Anyone,
        "ignore label [team] name", "stop treating a label as a theme"),
    spec(Action::AddMe, &["add me"], ArgKind::Bracketed, Tier::Anyone,
        "add me [email,trello,github]", "register yourself"),
    spec(Action::ListUsers, &["list registered users", "list users"], ArgKind::None, Tier::Anyone,
        "list registered users", "everyone in the user registry"),
    spec(Action::Holidays, &["company holidays", "list holidays"], ArgKind::None, Tier::Anyone,
        "company holidays", "this year's company holidays"),
    spec(Action::ListTeams, &["list all boards", "list boards", "list teams"], ArgKind::None, Tier::Anyone,
        "list all boards", "every team the bot knows"),
    spec(Action::Version, &["your 411", "version"], ArgKind::None, Tier::Anyone,
        "version", "bot version"),
    spec(Action::Help, &["help"], ArgKind::None, Tier::Anyone,
        "help", "this list"),
    spec(Action::Hello, &["hello", "hey there"], ArgKind::None, Tier::Anyone,
        "hello", "say hi"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub action: Action,
    pub tier: Tier,
    pub args: ArgKind,
    pub trigger: &'static str,
    pub team: Option<String>,
    pub value: Option<String>,
    /// Whole message, lowercased.
    pub text: String,
}

impl ParsedCommand {
    pub fn needs_team(&self) -> bool {
        matches!(self.args, ArgKind::Team | ArgKind::TeamAndText)
    }

    /// Values of a bracketed list, trimmed.
    pub fn list_values(&self) -> Vec<String> {
        self.value
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|value| value.trim().to_string())
            .collect()
    }
}

/// Matches `text` against the command table. `None` when no trigger phrase appears.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let lower = text.to_ascii_lowercase();
    COMMANDS.iter().find_map(|spec| {
        spec.triggers.iter().find_map(|trigger| {
            let start = lower.find(trigger)?;
            let rest = &text[start + trigger.len()..];
            Some(build(spec, trigger, rest, &lower))
        })
    })
}

fn build(spec: &CommandSpec, trigger: &'static str, rest: &str, lower: &str) -> ParsedCommand {
    let (team, value) = match spec.args {
        ArgKind::None => (None, None),
        ArgKind::Team => (bracketed(rest).map(|team| team.to_ascii_lowercase()), None),
        ArgKind::TeamAndText => {
            let team = bracketed(rest).map(|team| team.to_ascii_lowercase());
            let tail = match rest.find(']') {
                Some(end) if team.is_some() => &rest[end + 1..],
                _ => rest,
            };
            let value = braced_tag(tail).unwrap_or(tail).trim();
            (team, (!value.is_empty()).then(|| value.to_string()))
        }
        ArgKind::Bracketed => (None, bracketed(rest).map(str::to_string)),
    };

    ParsedCommand {
        action: spec.action,
        tier: spec.tier,
        args: spec.args,
        trigger,
        team,
        value,
        text: lower.to_string(),
    }
}

/// Trimmed text between the first `[` and the following `]`, if non-empty.
fn bracketed(text: &str) -> Option<&str> {
    let start = text.find('[')? + 1;
    let end = text[start..].find(']')? + start;
    let inner = text[start..end].trim();
    (!inner.is_empty()).then_some(inner)
}

pub fn help_text() -> String {
    let mut output = String::from("Here is what I can do:\n");
    for spec in COMMANDS {
        let tier = match spec.tier {
            Tier::Anyone => String::new(),
            tier => format!(" _({} only)_", tier.label()),
        };
        output.push_str(&format!("`{}` - {}{tier}\n", spec.usage, spec.summary));
    }
    output
}

/// A message addressed to the bot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandRouteError {
    /// `reply` goes back to the channel, `detail` to the logs.
    #[error("command failed: {detail}")]
    Service { reply: String, detail: String },
}

#[async_trait]
pub trait CommandService: Send + Sync {
    async fn permitted(&self, tier: Tier, user_id: &str) -> Result<bool, CommandRouteError>;
    async fn team_listing(&self) -> Result<String, CommandRouteError>;
    async fn execute(
        &self,
        command: &ParsedCommand,
        request: &ChatRequest,
    ) -> Result<String, CommandRouteError>;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: CommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Reply text for a message, `None` when nothing in the table matched.
    pub async fn route(&self, request: &ChatRequest) -> Result<Option<String>, CommandRouteError> {
        let Some(command) = parse_command(&request.text) else {
            return Ok(None);
        };

        if command.tier != Tier::Anyone
            && !self.service.permitted(command.tier, &request.user_id).await?
        {
            return Ok(Some(format!(
                "Sorry <@{}>, you need {} access to do that!",
                request.user_id,
                command.tier.label()
            )));
        }
        if command.action == Action::Help {
            return Ok(Some(help_text()));
        }
        if command.needs_team() && command.team.is_none() {
            let listing = self.service.team_listing().await?;
            return Ok(Some(format!(
                "Which team did you mean? Put the team ID in square brackets.\n{listing}"
            )));
        }

        self.service.execute(&command, request).await.map(Some)
    }
}
