use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One sprint rollover. The latest row by `started_at` is the active sprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub team_id: String,
    pub sprint_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_days: u32,
    pub working_days: u32,
    pub retro_board_id: String,
}

/// Board label mapped to a reporting category (squad, chapter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub board_id: String,
    pub label_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugLabel {
    pub board_id: String,
    pub label_id: String,
    pub level: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub slack_id: String,
    pub trello: String,
    pub github: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurndownEntry {
    pub recorded_at: DateTime<Utc>,
    pub team_id: String,
    pub total: u32,
    pub ready_for_work: u32,
    pub working: u32,
    pub review: u32,
    pub done: u32,
    pub cards: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadPointsEntry {
    pub sprint_name: String,
    pub squad_name: String,
    pub points: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeCountEntry {
    pub counted_at: DateTime<Utc>,
    pub team_id: String,
    pub sprint_name: String,
    pub label_name: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterCardsEntry {
    pub recorded_at: DateTime<Utc>,
    pub chapter_name: String,
    pub list_name: String,
    pub cards: u32,
    pub team_id: String,
}

/// Per-card dwell snapshot written by the card loader.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTrackerRow {
    pub card_id: String,
    pub title: String,
    pub points: u32,
    pub url: String,
    pub list_name: String,
    pub started_working: Option<DateTime<Utc>>,
    pub started_review: Option<DateTime<Utc>>,
    pub entered_done: Option<DateTime<Utc>>,
    pub owners: String,
    pub team_id: String,
}
