//! Per-board team configuration.
//!
//! Each managed Trello board has one TOML file at `{config_dir}/{team}.toml` with a single
//! `[General]` table. Keys keep the historical CamelCase names so existing board files load
//! unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{interpolate_env_vars, ConfigError};

#[derive(Debug, Error)]
pub enum TeamConfigError {
    #[error("I couldn't find the team config file ({0}.toml) you asked for!.")]
    NotFound(String),
    #[error("could not read team file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse team file `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error(transparent)]
    Interpolation(#[from] ConfigError),
    #[error("\nConfiguration File {path} is invalid: \n\n{problems}")]
    Invalid { path: PathBuf, problems: String },
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct TeamFile {
    #[serde(rename = "General")]
    general: TeamConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TeamConfig {
    /// File stem the team was loaded from, e.g. `mcboard`.
    #[serde(skip)]
    pub team_id: String,
    #[serde(rename = "TeamName")]
    pub team_name: String,
    /// Prefix of generated sprint names: `{prefix}-{MM-DD-YYYY}`.
    #[serde(rename = "Sprintname")]
    pub sprint_prefix: String,
    #[serde(rename = "TrelloOrg")]
    pub trello_org: String,
    /// Hours a Review card may sit before it is considered stale.
    #[serde(rename = "StaleTime")]
    pub stale_hours: u32,
    #[serde(rename = "MaxPoints")]
    pub max_points: u32,
    #[serde(rename = "ArchiveDoneDays")]
    pub archive_done_days: u32,
    #[serde(rename = "BackLogDays")]
    pub backlog_days: u32,
    #[serde(rename = "SprintDuration")]
    pub sprint_duration: u32,
    #[serde(rename = "RetroActionDays")]
    pub retro_action_days: u32,
    #[serde(rename = "IgnoreWeekends")]
    pub ignore_weekends: bool,
    #[serde(rename = "HolidaySupport")]
    pub holiday_support: bool,

    #[serde(rename = "BoardID")]
    pub board_id: String,
    #[serde(rename = "BacklogID")]
    pub backlog_list: String,
    #[serde(rename = "Upcoming")]
    pub upcoming_list: String,
    #[serde(rename = "Scoped")]
    pub scoped_list: String,
    #[serde(rename = "NextsprintID")]
    pub next_sprint_list: String,
    #[serde(rename = "ReadyForWork")]
    pub ready_for_work_list: String,
    #[serde(rename = "Working")]
    pub working_list: String,
    #[serde(rename = "ReadyForReview")]
    pub review_list: String,
    #[serde(rename = "Done")]
    pub done_list: String,

    #[serde(rename = "ROLabelID")]
    pub rollover_label: String,
    #[serde(rename = "TemplateLabelID")]
    pub template_label: String,
    #[serde(rename = "SilenceCardLabel")]
    pub silence_label: String,
    #[serde(rename = "TrainingLabel")]
    pub training_label: String,
    #[serde(rename = "AllowMembersLabel")]
    pub allow_members_label: String,
    #[serde(rename = "CfsprintID")]
    pub sprint_field: String,
    #[serde(rename = "CfpointsID")]
    pub points_field: String,
    #[serde(rename = "RetroCollectionID")]
    pub retro_collection: String,
    #[serde(rename = "DemoBoardID")]
    pub demo_board: String,

    #[serde(rename = "RetroChannel")]
    pub retro_channel: String,
    #[serde(rename = "SprintChannel")]
    pub sprint_channel: String,
    #[serde(rename = "ComplaintChannel")]
    pub complaint_channel: String,

    #[serde(rename = "StandupAlertChannel")]
    pub standup_alert_channel: String,
    #[serde(rename = "StandupLink")]
    pub standup_link: String,
    #[serde(rename = "DemoAlertChannel")]
    pub demo_alert_channel: String,
    #[serde(rename = "DemoAlertLink")]
    pub demo_alert_link: String,
    #[serde(rename = "RetroAlertChannel")]
    pub retro_alert_channel: String,
    #[serde(rename = "RetroAlertLink")]
    pub retro_alert_link: String,
    #[serde(rename = "WDWAlertChannel")]
    pub wdw_alert_channel: String,
    #[serde(rename = "WDWAlertLink")]
    pub wdw_alert_link: String,
}

const OPTIONAL_FIELDS: [&str; 9] = [
    "DemoBoardID",
    "StandupAlertChannel",
    "StandupLink",
    "DemoAlertChannel",
    "DemoAlertLink",
    "RetroAlertChannel",
    "RetroAlertLink",
    "WDWAlertChannel",
    "WDWAlertLink",
];

impl TeamConfig {
    pub fn path_for(config_dir: &Path, team_id: &str) -> PathBuf {
        config_dir.join(format!("{team_id}.toml"))
    }

    pub fn load(config_dir: &Path, team_id: &str) -> Result<Self, TeamConfigError> {
        let team_id = team_id.trim().to_ascii_lowercase();
        let path = Self::path_for(config_dir, &team_id);
        if team_id.is_empty() || !path.is_file() {
            return Err(TeamConfigError::NotFound(team_id));
        }
        let mut config = Self::from_path(&path)?;
        config.team_id = team_id;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, TeamConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| TeamConfigError::Read { path: path.to_path_buf(), source })?;
        let interpolated = interpolate_env_vars(&raw)?;
        let file: TeamFile = toml::from_str(&interpolated)
            .map_err(|source| TeamConfigError::Parse { path: path.to_path_buf(), source })?;

        let mut config = file.general;
        config.team_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let problems = config.sanity_check();
        if !problems.is_empty() {
            return Err(TeamConfigError::Invalid { path: path.to_path_buf(), problems });
        }
        Ok(config)
    }

    /// Trims every text value and returns one line per blank required field.
    pub fn sanity_check(&mut self) -> String {
        let mut problems = String::new();
        for (name, value) in self.text_fields_mut() {
            let trimmed = value.trim().to_string();
            *value = trimmed;
            if value.is_empty() && !OPTIONAL_FIELDS.contains(&name) {
                problems.push_str(&format!("Value {name} can not be blank!\n"));
            }
        }
        problems
    }

    fn text_fields_mut(&mut self) -> Vec<(&'static str, &mut String)> {
        vec![
            ("TeamName", &mut self.team_name),
            ("Sprintname", &mut self.sprint_prefix),
            ("TrelloOrg", &mut self.trello_org),
            ("BoardID", &mut self.board_id),
            ("BacklogID", &mut self.backlog_list),
            ("Upcoming", &mut self.upcoming_list),
            ("Scoped", &mut self.scoped_list),
            ("NextsprintID", &mut self.next_sprint_list),
            ("ReadyForWork", &mut self.ready_for_work_list),
            ("Working", &mut self.working_list),
            ("ReadyForReview", &mut self.review_list),
            ("Done", &mut self.done_list),
            ("ROLabelID", &mut self.rollover_label),
            ("TemplateLabelID", &mut self.template_label),
            ("SilenceCardLabel", &mut self.silence_label),
            ("TrainingLabel", &mut self.training_label),
            ("AllowMembersLabel", &mut self.allow_members_label),
            ("CfsprintID", &mut self.sprint_field),
            ("CfpointsID", &mut self.points_field),
            ("RetroCollectionID", &mut self.retro_collection),
            ("DemoBoardID", &mut self.demo_board),
            ("RetroChannel", &mut self.retro_channel),
            ("SprintChannel", &mut self.sprint_channel),
            ("ComplaintChannel", &mut self.complaint_channel),
            ("StandupAlertChannel", &mut self.standup_alert_channel),
            ("StandupLink", &mut self.standup_link),
            ("DemoAlertChannel", &mut self.demo_alert_channel),
            ("DemoAlertLink", &mut self.demo_alert_link),
            ("RetroAlertChannel", &mut self.retro_alert_channel),
            ("RetroAlertLink", &mut self.retro_alert_link),
            ("WDWAlertChannel", &mut self.wdw_alert_channel),
            ("WDWAlertLink", &mut self.wdw_alert_link),
        ]
    }

    /// The four lists that make up the active sprint, in board order.
    pub fn sprint_lists(&self) -> [(&'static str, &str); 4] {
        [
            ("Ready For Work", self.ready_for_work_list.as_str()),
            ("Working", self.working_list.as_str()),
            ("Ready for Review (PR)", self.review_list.as_str()),
            ("Done", self.done_list.as_str()),
        ]
    }

    /// Maps a free-text column name to a list id, defaulting to the backlog.
    pub fn column(&self, text: &str) -> (&str, &'static str) {
        let text = text.to_ascii_lowercase();
        if text.contains("upcoming") || text.contains("un-scoped") {
            (&self.upcoming_list, "Upcoming/Un-Scoped")
        } else if text.contains("next sprint") {
            (&self.next_sprint_list, "Next Sprint")
        } else if text.contains("ready for points") {
            (&self.scoped_list, "Ready for Points")
        } else if text.contains("ready for work") {
            (&self.ready_for_work_list, "Ready for Work")
        } else if text.contains("ready for pr") || text.contains("ready for review") {
            (&self.review_list, "Ready for Review")
        } else if text.contains("working") {
            (&self.working_list, "Working")
        } else if text.contains("done") {
            (&self.done_list, "Done")
        } else {
            (&self.backlog_list, "Backlog")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamSummary {
    pub team_id: String,
    pub team_name: String,
    pub board_id: String,
}

/// Enumerates loadable team files, skipping the example, the cron table and any extra names.
pub fn list_teams(config_dir: &Path, skip: &[&str]) -> Result<Vec<TeamSummary>, TeamConfigError> {
    let entries = fs::read_dir(config_dir)
        .map_err(|source| TeamConfigError::Read { path: config_dir.to_path_buf(), source })?;

    let mut teams = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let skipped = ["example.toml", "cron.toml", "crons.toml"].contains(&file_name.as_str())
            || skip.contains(&file_name.as_str());
        if skipped {
            continue;
        }
        if let Ok(team) = TeamConfig::from_path(&path) {
            teams.push(TeamSummary {
                team_id: team.team_id,
                team_name: team.team_name,
                board_id: team.board_id,
            });
        }
    }
    teams.sort_by(|a, b| a.team_id.cmp(&b.team_id));
    Ok(teams)
}

pub fn render_team_listing(teams: &[TeamSummary]) -> String {
    teams
        .iter()
        .map(|team| {
            format!(
                "<https://trello.com/b/{}|{} trello board>.  Refer to ID: [{}]\n",
                team.board_id, team.team_name, team.team_id
            )
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::TeamConfig;

    pub fn team() -> TeamConfig {
        TeamConfig {
            team_id: "mcboard".into(),
            team_name: "MC Board".into(),
            sprint_prefix: "MC".into(),
            trello_org: "org1".into(),
            stale_hours: 24,
            max_points: 8,
            archive_done_days: 14,
            backlog_days: 30,
            sprint_duration: 14,
            retro_action_days: 7,
            ignore_weekends: true,
            holiday_support: true,
            board_id: "board1".into(),
            backlog_list: "l-backlog".into(),
            upcoming_list: "l-upcoming".into(),
            scoped_list: "l-scoped".into(),
            next_sprint_list: "l-next".into(),
            ready_for_work_list: "l-rfw".into(),
            working_list: "l-working".into(),
            review_list: "l-review".into(),
            done_list: "l-done".into(),
            rollover_label: "lbl-rollover".into(),
            template_label: "lbl-template".into(),
            silence_label: "lbl-silence".into(),
            training_label: "lbl-training".into(),
            allow_members_label: "lbl-allow".into(),
            sprint_field: "cf-sprint".into(),
            points_field: "cf-points".into(),
            retro_collection: "collection1".into(),
            demo_board: String::new(),
            retro_channel: "retro".into(),
            sprint_channel: "sprint".into(),
            complaint_channel: "complaints".into(),
            standup_alert_channel: "standup".into(),
            standup_link: "https://meet.example.com/standup".into(),
            demo_alert_channel: String::new(),
            demo_alert_link: String::new(),
            retro_alert_channel: String::new(),
            retro_alert_link: String::new(),
            wdw_alert_channel: "wdw".into(),
            wdw_alert_link: "https://meet.example.com/wdw".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{list_teams, render_team_listing, TeamConfig, TeamConfigError};

    const VALID: &str = r#"
[General]
TeamName = "  MC Board "
Sprintname = "MC"
TrelloOrg = "org1"
StaleTime = 24
MaxPoints = 8
ArchiveDoneDays = 14
BackLogDays = 30
SprintDuration = 14
RetroActionDays = 7
IgnoreWeekends = true
HolidaySupport = true
BoardID = "board1"
BacklogID = "l1"
Upcoming = "l2"
Scoped = "l3"
NextsprintID = "l4"
ReadyForWork = "l5"
Working = "l6"
ReadyForReview = "l7"
Done = "l8"
ROLabelID = "r1"
TemplateLabelID = "t1"
SilenceCardLabel = "s1"
TrainingLabel = "tr1"
AllowMembersLabel = "a1"
CfsprintID = "cf1"
CfpointsID = "cf2"
RetroCollectionID = "c1"
RetroChannel = "retro"
SprintChannel = "sprint"
ComplaintChannel = "complaints"
"#;

    #[test]
    fn loads_team_file_and_trims_values() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("mcboard.toml"), VALID).expect("write team");

        let team = TeamConfig::load(dir.path(), "MCBoard").expect("team loads");
        assert_eq!(team.team_id, "mcboard");
        assert_eq!(team.team_name, "MC Board");
        assert_eq!(team.sprint_duration, 14);
        assert!(team.demo_board.is_empty());
    }

    #[test]
    fn sanity_check_lists_every_blank_required_field() {
        let dir = TempDir::new().expect("temp dir");
        let broken = VALID.replace("BoardID = \"board1\"", "BoardID = \"   \"").replace(
            "ComplaintChannel = \"complaints\"",
            "",
        );
        let path = dir.path().join("broken.toml");
        fs::write(&path, broken).expect("write team");

        match TeamConfig::from_path(&path) {
            Err(TeamConfigError::Invalid { problems, .. }) => {
                assert!(problems.contains("Value BoardID can not be blank!\n"));
                assert!(problems.contains("Value ComplaintChannel can not be blank!\n"));
                assert!(!problems.contains("DemoBoardID"));
            }
            other => panic!("expected invalid team config, got {other:?}"),
        }
    }

    #[test]
    fn missing_team_reports_file_name() {
        let dir = TempDir::new().expect("temp dir");
        let error = TeamConfig::load(dir.path(), "nope").expect_err("missing team");
        assert_eq!(
            error.to_string(),
            "I couldn't find the team config file (nope.toml) you asked for!."
        );
    }

    #[test]
    fn listing_skips_cron_and_example_files() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("mcboard.toml"), VALID).expect("write team");
        fs::write(dir.path().join("example.toml"), VALID).expect("write example");
        fs::write(dir.path().join("cron.toml"), "").expect("write cron");
        fs::write(dir.path().join("bot.toml"), VALID).expect("write bot");

        let teams = list_teams(dir.path(), &["bot.toml"]).expect("listing");
        assert_eq!(teams.len(), 1);
        assert_eq!(
            render_team_listing(&teams),
            "<https://trello.com/b/board1|MC Board trello board>.  Refer to ID: [mcboard]\n"
        );
    }

    #[test]
    fn column_keywords_resolve_to_lists() {
        let team = super::fixtures::team();
        assert_eq!(team.column("theme points ready for work"), ("l-rfw", "Ready for Work"));
        assert_eq!(team.column("ready for review"), ("l-review", "Ready for Review"));
        assert_eq!(team.column("something else"), ("l-backlog", "Backlog"));
    }
}
