pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod schedule;
pub mod team;
pub mod workflows;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::board::{Card, CardAction, FieldUpdate, Label, PullRequest};
pub use domain::records::{Holiday, SprintRecord, UserRecord};
pub use domain::tally::CategoryTally;
pub use errors::{ApplicationError, DomainError, InterfaceError, PortError, StoreError, WorkflowError};
pub use ports::{ChatNotifier, Clock, GithubApi, Notice, SystemClock, TrelloApi, WorkflowStore};
pub use schedule::{CronAction, CronEntry, ScheduleError};
pub use team::{TeamConfig, TeamConfigError, TeamSummary};
pub use workflows::alerts::AlertKind;
pub use workflows::retro::{RetroCardOutcome, RetroKind};
pub use workflows::{WorkflowSettings, Workflows};
