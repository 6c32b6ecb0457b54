use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("*WARNING!* Can not find a valid `cron.toml` file to load!! Cron's are not running!")]
    MissingFile(PathBuf),
    #[error("could not read cron file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse cron file `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("unknown cron action `{0}`")]
    UnknownAction(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CronEntry {
    #[serde(rename = "Timing")]
    pub timing: String,
    #[serde(rename = "Action")]
    pub action: String,
    /// Team id whose board configuration the job runs against.
    #[serde(rename = "Config")]
    pub config: String,
}

#[derive(Debug, Default, Deserialize)]
struct CronFile {
    #[serde(rename = "Cronjob", default)]
    jobs: Vec<CronEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CronAction {
    StandupAlert,
    DemoAlert,
    RetroAlert,
    WdwAlert,
    SdlcAlert,
    StalePr,
    Troll,
    Sprint,
    SyncPoints,
    ArchiveDone,
    ArchiveBacklog,
    CleanBacklog,
    PrSummary,
    RecordPoints,
    CountCards,
    Holidays,
    EpicLinks,
    ChapterCount,
    CriticalBug,
    CardLoader,
    RetroAction,
    TemplateCheck,
}

impl CronAction {
    pub const ALL: [CronAction; 22] = [
        Self::StandupAlert,
        Self::DemoAlert,
        Self::RetroAlert,
        Self::WdwAlert,
        Self::SdlcAlert,
        Self::StalePr,
        Self::Troll,
        Self::Sprint,
        Self::SyncPoints,
        Self::ArchiveDone,
        Self::ArchiveBacklog,
        Self::CleanBacklog,
        Self::PrSummary,
        Self::RecordPoints,
        Self::CountCards,
        Self::Holidays,
        Self::EpicLinks,
        Self::ChapterCount,
        Self::CriticalBug,
        Self::CardLoader,
        Self::RetroAction,
        Self::TemplateCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StandupAlert => "standupalert",
            Self::DemoAlert => "demoalert",
            Self::RetroAlert => "retroalert",
            Self::WdwAlert => "wdwalert",
            Self::SdlcAlert => "sdlcalert",
            Self::StalePr => "pr",
            Self::Troll => "troll",
            Self::Sprint => "sprint",
            Self::SyncPoints => "pts",
            Self::ArchiveDone => "archive",
            Self::ArchiveBacklog => "backlogarchive",
            Self::CleanBacklog => "clean-backlog",
            Self::PrSummary => "pr-summary",
            Self::RecordPoints => "record-pts",
            Self::CountCards => "count-cards",
            Self::Holidays => "holidays",
            Self::EpicLinks => "epic-links",
            Self::ChapterCount => "chapter-count",
            Self::CriticalBug => "critical-bug",
            Self::CardLoader => "cardloader",
            Self::RetroAction => "retroaction",
            Self::TemplateCheck => "templatecheck",
        }
    }

    /// Actions skipped outright on a company holiday. Ceremony alerts check the
    /// calendar themselves.
    pub fn holiday_suppressed(self) -> bool {
        matches!(
            self,
            Self::StalePr
                | Self::SyncPoints
                | Self::ArchiveDone
                | Self::ArchiveBacklog
                | Self::CleanBacklog
                | Self::CriticalBug
                | Self::EpicLinks
                | Self::PrSummary
                | Self::Troll
        )
    }
}

impl fmt::Display for CronAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CronAction {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| ScheduleError::UnknownAction(value.to_string()))
    }
}

pub fn load_cron_table(path: &Path) -> Result<Vec<CronEntry>, ScheduleError> {
    if !path.is_file() {
        return Err(ScheduleError::MissingFile(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)
        .map_err(|source| ScheduleError::Read { path: path.to_path_buf(), source })?;
    let file: CronFile = toml::from_str(&raw)
        .map_err(|source| ScheduleError::Parse { path: path.to_path_buf(), source })?;
    Ok(file.jobs)
}

/// Renders the table the way it is DM'd to whoever asks for the cron list.
pub fn render_cron_table(entries: &[CronEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!("`{}` - *{}* for team `{}`\n", entry.timing, entry.action, entry.config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{load_cron_table, CronAction, ScheduleError};

    #[test]
    fn parses_cronjob_tables() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("cron.toml");
        fs::write(
            &path,
            r#"
[[Cronjob]]
Timing = "0 0 9 * * MON-FRI"
Action = "standupalert"
Config = "mcboard"

[[Cronjob]]
Timing = "0 30 16 * * *"
Action = "clean-backlog"
Config = "mcboard"
"#,
        )
        .expect("write cron");

        let table = load_cron_table(&path).expect("table loads");
        assert_eq!(table.len(), 2);
        assert_eq!(table[1].action, "clean-backlog");
        assert_eq!(table[0].config, "mcboard");
    }

    #[test]
    fn missing_file_has_operator_warning() {
        let dir = TempDir::new().expect("temp dir");
        let error = load_cron_table(&dir.path().join("cron.toml")).expect_err("missing");
        assert!(matches!(error, ScheduleError::MissingFile(_)));
        assert!(error.to_string().contains("Cron's are not running!"));
    }

    #[test]
    fn action_names_round_trip_and_flag_holiday_suppression() {
        for action in CronAction::ALL {
            let parsed: CronAction = action.as_str().parse().expect("known action");
            assert_eq!(parsed, action);
        }
        assert!("Troll".parse::<CronAction>().expect("case insensitive").holiday_suppressed());
        assert!(!CronAction::StandupAlert.holiday_suppressed());
        assert!(!CronAction::Sprint.holiday_suppressed());
        assert!("dance".parse::<CronAction>().is_err());
    }
}
