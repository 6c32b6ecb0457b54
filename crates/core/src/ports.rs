//! Seams between the workflows and the outside world.
//!
//! Workflows only see these traits. `scrumbot-integrations` implements the Trello and GitHub
//! ports over HTTP, `scrumbot-slack` implements [`ChatNotifier`], and `scrumbot-db`
//! implements the store traits over SQLite.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::board::{
    Attachment, Board, BoardList, Card, CardAction, FieldUpdate, Label, Member, PluginData,
    PullRequest,
};
use crate::domain::records::{
    BugLabel, BurndownEntry, CardTrackerRow, CategoryLabel, ChapterCardsEntry, Holiday,
    SprintRecord, SquadPointsEntry, ThemeCountEntry, UserRecord,
};
use crate::errors::{PortError, StoreError};

#[async_trait]
pub trait TrelloApi: Send + Sync {
    async fn board(&self, board_id: &str) -> Result<Board, PortError>;
    async fn board_lists(&self, board_id: &str) -> Result<Vec<BoardList>, PortError>;
    async fn board_labels(&self, board_id: &str) -> Result<Vec<Label>, PortError>;
    /// Every open card on the board, with labels and custom field items.
    async fn board_cards(&self, board_id: &str) -> Result<Vec<Card>, PortError>;
    /// Open cards of one list, with labels and custom field items.
    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>, PortError>;
    async fn card_plugin_data(&self, card_id: &str) -> Result<Vec<PluginData>, PortError>;
    /// History entries of the given Trello action `filter` (e.g. `updateCard:idList`), newest first.
    async fn card_actions(&self, card_id: &str, filter: &str)
        -> Result<Vec<CardAction>, PortError>;
    async fn card_attachments(&self, card_id: &str) -> Result<Vec<Attachment>, PortError>;
    async fn card_members(&self, card_id: &str) -> Result<Vec<Member>, PortError>;

    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<(), PortError>;
    async fn move_card_to_top(&self, card_id: &str) -> Result<(), PortError>;
    async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), PortError>;
    async fn remove_member(&self, card_id: &str, member_id: &str) -> Result<(), PortError>;
    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), PortError>;
    async fn set_custom_field(
        &self,
        card_id: &str,
        field_id: &str,
        value: FieldUpdate,
    ) -> Result<(), PortError>;
    async fn archive_card(&self, card_id: &str) -> Result<(), PortError>;
    async fn create_card(&self, list_id: &str, name: &str) -> Result<Card, PortError>;

    async fn create_board(&self, name: &str, org_id: &str) -> Result<Board, PortError>;
    async fn create_list(&self, board_id: &str, name: &str) -> Result<BoardList, PortError>;
    async fn add_board_to_collection(
        &self,
        board_id: &str,
        collection_id: &str,
    ) -> Result<(), PortError>;
    async fn add_board_member(&self, board_id: &str, username: &str) -> Result<(), PortError>;
}

#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, PortError>;
}

/// Legacy Slack attachment: a coloured side bar with optional title and pretext.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NoticeAttachment {
    pub color: String,
    pub title: String,
    pub pretext: String,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub channel: String,
    pub text: String,
    pub attachment: Option<NoticeAttachment>,
}

impl Notice {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self { channel: channel.into(), text: text.into(), attachment: None }
    }

    pub fn with_attachment(
        channel: impl Into<String>,
        text: impl Into<String>,
        color: &str,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            attachment: Some(NoticeAttachment {
                color: color.to_string(),
                text: body.into(),
                ..NoticeAttachment::default()
            }),
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        let attachment = self.attachment.get_or_insert_with(NoticeAttachment::default);
        attachment.title = title.into();
        self
    }
}

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Posts to a channel by name or id.
    async fn post(&self, notice: &Notice) -> Result<(), PortError>;
    /// Sends a direct message; `notice.channel` is ignored.
    async fn direct_message(&self, slack_user_id: &str, notice: &Notice) -> Result<(), PortError>;
}

#[async_trait]
pub trait SprintStore: Send + Sync {
    async fn latest_sprint(&self, team_id: &str) -> Result<Option<SprintRecord>, StoreError>;
    async fn record_sprint(&self, sprint: &SprintRecord) -> Result<(), StoreError>;
    async fn retro_board_ids(&self, team_id: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn squads(&self, board_id: &str) -> Result<Vec<CategoryLabel>, StoreError>;
    async fn chapters(&self, board_id: &str) -> Result<Vec<CategoryLabel>, StoreError>;
    async fn ignored_labels(&self, board_id: &str) -> Result<Vec<String>, StoreError>;
    async fn ignore_label(&self, board_id: &str, label_id: &str) -> Result<(), StoreError>;
    async fn bug_labels(&self, board_id: &str) -> Result<Vec<BugLabel>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn users(&self) -> Result<Vec<UserRecord>, StoreError>;
    async fn user_by_slack_id(&self, slack_id: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn user_by_trello(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn add_user(&self, user: &UserRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait HolidayStore: Send + Sync {
    async fn holiday_on(&self, date: NaiveDate) -> Result<Option<Holiday>, StoreError>;
    async fn holidays_in_year(&self, year: i32) -> Result<Vec<Holiday>, StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_burndown(&self, entry: &BurndownEntry) -> Result<(), StoreError>;
    async fn record_squad_points(&self, entries: &[SquadPointsEntry]) -> Result<(), StoreError>;
    async fn squad_points_for(&self, sprint_name: &str)
        -> Result<Vec<SquadPointsEntry>, StoreError>;
    async fn record_theme_counts(&self, entries: &[ThemeCountEntry]) -> Result<(), StoreError>;
    async fn record_chapter_cards(&self, entries: &[ChapterCardsEntry])
        -> Result<(), StoreError>;
    async fn reset_card_tracker(&self) -> Result<(), StoreError>;
    async fn record_card_tracker(&self, rows: &[CardTrackerRow]) -> Result<(), StoreError>;
    /// Clones the live card tracker into `table_name`.
    async fn archive_card_tracker(&self, table_name: &str) -> Result<(), StoreError>;
}

/// Everything a workflow may persist or look up.
pub trait WorkflowStore:
    SprintStore + CategoryStore + UserStore + HolidayStore + HistoryStore
{
}

impl<T> WorkflowStore for T where
    T: SprintStore + CategoryStore + UserStore + HolidayStore + HistoryStore
{
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
