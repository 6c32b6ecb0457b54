//! Board automation workflows.
//!
//! Every workflow reads a [`TeamConfig`], fetches board data once, applies simple
//! predicates per card and issues mutations through the ports. A failed snapshot read
//! aborts the workflow with [`WorkflowError::BoardRead`]; a failed single-card mutation is
//! trapped (logged and optionally echoed to Slack) and the loop moves on.

pub mod alerts;
pub mod backlog;
pub mod points;
pub mod retro;
pub mod review;
pub mod sprint;
pub mod tally;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use crate::calendar::local_date;
use crate::config::AppConfig;
use crate::domain::board::{Card, PluginData};
use crate::domain::records::{Holiday, SprintRecord};
use crate::errors::{DomainError, WorkflowError};
use crate::ports::{
    ChatNotifier, Clock, GithubApi, Notice, SystemClock, TrelloApi, WorkflowStore,
};
use crate::team::TeamConfig;

const TRAP_COLOR: &str = "#ff0000";

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub bot_name: String,
    /// Trello member id of the bot, used to recognise its own marker comments.
    pub bot_member_id: String,
    pub points_plugin_id: String,
    pub trello_org_id: String,
    pub table_prefix: String,
    pub log_channel: String,
    pub log_to_slack: bool,
    pub logging_prefix: String,
    pub local_offset: FixedOffset,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bot_name: config.bot.name.clone(),
            bot_member_id: config.trello.bot_member_id.clone(),
            points_plugin_id: config.trello.points_plugin_id.clone(),
            trello_org_id: config.trello.org_id.clone(),
            table_prefix: config.bot.table_prefix.clone(),
            log_channel: config.slack.log_channel.clone(),
            log_to_slack: config.slack.log_to_slack,
            logging_prefix: config.bot.logging_prefix.clone(),
            local_offset: config.bot.local_offset(),
        }
    }
}

#[derive(Clone)]
pub struct Workflows {
    trello: Arc<dyn TrelloApi>,
    github: Arc<dyn GithubApi>,
    chat: Arc<dyn ChatNotifier>,
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSettings,
}

impl Workflows {
    pub fn new(
        trello: Arc<dyn TrelloApi>,
        github: Arc<dyn GithubApi>,
        chat: Arc<dyn ChatNotifier>,
        store: Arc<dyn WorkflowStore>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { trello, github, chat, store, clock: Arc::new(SystemClock), settings }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn trello(&self) -> &Arc<dyn TrelloApi> {
        &self.trello
    }

    pub fn chat(&self) -> &Arc<dyn ChatNotifier> {
        &self.chat
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self.now(), self.settings.local_offset)
    }

    /// Today's holiday, when the team honours the company calendar.
    pub async fn holiday_today(&self, team: &TeamConfig) -> Option<Holiday> {
        if !team.holiday_support {
            return None;
        }
        self.holiday_on(self.today()).await
    }

    pub(crate) async fn holiday_on(&self, date: NaiveDate) -> Option<Holiday> {
        match self.store.holiday_on(date).await {
            Ok(holiday) => holiday,
            Err(error) => {
                self.trap("holiday lookup failed", &error).await;
                None
            }
        }
    }

    /// Independent of `HolidaySupport`, which only silences jobs on the holiday itself.
    pub(crate) async fn yesterday_was_holiday(&self) -> bool {
        match self.today().checked_sub_signed(Duration::days(1)) {
            Some(yesterday) => self.holiday_on(yesterday).await.is_some(),
            None => false,
        }
    }

    pub async fn current_sprint(&self, team: &TeamConfig) -> Result<SprintRecord, WorkflowError> {
        self.store
            .latest_sprint(&team.team_id)
            .await?
            .ok_or_else(|| DomainError::NoSprint(team.team_id.clone()).into())
    }

    /// Open cards of one list. Archived cards never take part in a workflow.
    pub(crate) async fn read_list(&self, list_id: &str) -> Result<Vec<Card>, WorkflowError> {
        let cards = self.trello.list_cards(list_id).await.map_err(WorkflowError::BoardRead)?;
        Ok(cards.into_iter().filter(|card| !card.closed).collect())
    }

    pub(crate) async fn read_board(&self, team: &TeamConfig) -> Result<Vec<Card>, WorkflowError> {
        let cards = self.trello.board_cards(&team.board_id).await.map_err(WorkflowError::BoardRead)?;
        Ok(cards.into_iter().filter(|card| !card.closed).collect())
    }

    /// Story points the points power-up holds for a card. Missing or unreadable data is 0.
    pub(crate) async fn card_points(&self, card: &Card) -> u32 {
        match self.trello.card_plugin_data(&card.id).await {
            Ok(data) => power_up_points(&data, &self.settings.points_plugin_id).unwrap_or(0),
            Err(error) => {
                self.trap(&format!("could not read power-up points for {}", card.short_link()), &error)
                    .await;
                0
            }
        }
    }

    /// Posts a notice, trapping delivery failures.
    pub async fn notify(&self, notice: Notice) {
        if let Err(error) = self.chat.post(&notice).await {
            warn!(
                event_name = "workflow.notify.failed",
                channel = %notice.channel,
                error = %error,
                "slack notice could not be delivered"
            );
        }
    }

    pub(crate) async fn direct(&self, slack_id: &str, notice: Notice) -> bool {
        match self.chat.direct_message(slack_id, &notice).await {
            Ok(()) => true,
            Err(error) => {
                self.trap(&format!("direct message to {slack_id} failed"), &error).await;
                false
            }
        }
    }

    /// Logs a recoverable failure and, when enabled, echoes it to the Slack log channel.
    pub async fn trap(&self, context: &str, error: &(dyn Display + Sync)) {
        warn!(event_name = "workflow.trap", context = %context, error = %error, "workflow step failed");
        if !self.echo_enabled() {
            return;
        }
        let notice = Notice::with_attachment(
            &self.settings.log_channel,
            self.stamped(context),
            TRAP_COLOR,
            error.to_string(),
        );
        if let Err(error) = self.chat.post(&notice).await {
            warn!(event_name = "workflow.trap.echo_failed", error = %error, "could not echo to log channel");
        }
    }

    /// Echoes an operational note to the Slack log channel when enabled.
    pub async fn log_to_slack(&self, text: &str) {
        if self.echo_enabled() {
            self.notify(Notice::text(&self.settings.log_channel, self.stamped(text))).await;
        }
    }

    fn echo_enabled(&self) -> bool {
        self.settings.log_to_slack && !self.settings.log_channel.is_empty()
    }

    fn stamped(&self, text: &str) -> String {
        let stamp = self.now().with_timezone(&self.settings.local_offset).format("%m/%d/%Y %H:%M:%S");
        if self.settings.logging_prefix.is_empty() {
            format!("*{stamp} :* {text}")
        } else {
            format!("`{}` - *{stamp} :* {text}", self.settings.logging_prefix)
        }
    }
}

/// Reads `{"points": N}` from the power-up's plugin data. `N` may be a number or a string.
pub fn power_up_points(data: &[PluginData], plugin_id: &str) -> Option<u32> {
    let entry = data.iter().rev().find(|entry| entry.id_plugin == plugin_id)?;
    let value: Value = serde_json::from_str(&entry.value).ok()?;
    let points = value.get("points")?;
    let parsed = match points {
        Value::Number(number) => number.as_u64().or_else(|| number.as_f64().map(|n| n.max(0.0) as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(parsed).ok()
}
