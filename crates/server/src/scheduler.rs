//! Cron jobs over tokio tasks.
//!
//! Every `[[Cronjob]]` of the cron table becomes one task that sleeps until the next fire
//! time of its schedule (evaluated in the bot's UTC offset), waits one more second and then
//! hands the action to a [`JobExecutor`].

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use scrumbot_core::schedule::{load_cron_table, render_cron_table, CronAction, CronEntry, ScheduleError};
use scrumbot_core::workflows::alerts::AlertKind;
use scrumbot_core::{TeamConfig, WorkflowError, Workflows};

const JOB_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run(&self, action: CronAction, team_id: &str);

    /// Surfaces a cron table problem to the operators.
    async fn report(&self, text: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerStatus {
    NotLoaded,
    Running,
    Stopped,
}

impl SchedulerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotLoaded => "not loaded",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub scheduled: usize,
    pub skipped: usize,
}

struct SchedulerState {
    entries: Vec<CronEntry>,
    jobs: Vec<JoinHandle<()>>,
    status: SchedulerStatus,
}

pub struct Scheduler {
    executor: Arc<dyn JobExecutor>,
    cron_file: PathBuf,
    offset: FixedOffset,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn JobExecutor>, cron_file: PathBuf, offset: FixedOffset) -> Self {
        Self {
            executor,
            cron_file,
            offset,
            state: Mutex::new(SchedulerState {
                entries: Vec::new(),
                jobs: Vec::new(),
                status: SchedulerStatus::NotLoaded,
            }),
        }
    }

    /// Replaces every running job with the jobs of the cron file. On a missing or broken
    /// file the scheduler is left empty and stopped. Load failures and skipped jobs are
    /// reported through the executor.
    pub async fn load(&self) -> Result<LoadReport, ScheduleError> {
        let mut state = self.state.lock().await;
        abort_all(&mut state);

        let entries = match load_cron_table(&self.cron_file) {
            Ok(entries) => entries,
            Err(error) => {
                state.status = SchedulerStatus::Stopped;
                warn!(
                    event_name = "scheduler.load.failed",
                    cron_file = %self.cron_file.display(),
                    error = %error,
                    "cron table not loaded"
                );
                self.executor.report(&error.to_string()).await;
                return Err(error);
            }
        };

        let mut report = LoadReport::default();
        for entry in entries {
            let action = match CronAction::from_str(&entry.action) {
                Ok(action) => action,
                Err(error) => {
                    warn!(
                        event_name = "scheduler.job.invalid_action",
                        action = %entry.action,
                        team = %entry.config,
                        error = %error,
                        "skipping cron job"
                    );
                    self.executor
                        .report(&format!(
                            "CRON ISSUE: skipping `{}` for team `{}`: {error}",
                            entry.action, entry.config
                        ))
                        .await;
                    report.skipped += 1;
                    continue;
                }
            };
            let schedule = match parse_timing(&entry.timing) {
                Ok(schedule) => schedule,
                Err(error) => {
                    warn!(
                        event_name = "scheduler.job.invalid_timing",
                        timing = %entry.timing,
                        action = %entry.action,
                        team = %entry.config,
                        error = %error,
                        "skipping cron job"
                    );
                    self.executor
                        .report(&format!(
                            "CRON ISSUE: invalid timing `{}` for `{}` on team `{}`: {error}",
                            entry.timing, entry.action, entry.config
                        ))
                        .await;
                    report.skipped += 1;
                    continue;
                }
            };

            info!(
                event_name = "scheduler.job.scheduled",
                timing = %entry.timing,
                action = action.as_str(),
                team = %entry.config,
                "cron job scheduled"
            );
            state.jobs.push(tokio::spawn(run_job(
                Arc::clone(&self.executor),
                schedule,
                self.offset,
                action,
                entry.config.clone(),
            )));
            state.entries.push(entry);
            report.scheduled += 1;
        }

        state.status = SchedulerStatus::Running;
        Ok(report)
    }

    /// Stops every job. Returns how many were running.
    pub async fn halt(&self) -> usize {
        let mut state = self.state.lock().await;
        let halted = abort_all(&mut state);
        state.status = SchedulerStatus::Stopped;
        info!(event_name = "scheduler.halted", jobs = halted, "all cron jobs stopped");
        halted
    }

    pub async fn list(&self) -> String {
        let state = self.state.lock().await;
        if state.entries.is_empty() {
            return format!("No cron jobs are loaded (scheduler is {}).", state.status.as_str());
        }
        render_cron_table(&state.entries)
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.state.lock().await.status
    }
}

fn abort_all(state: &mut SchedulerState) -> usize {
    let count = state.jobs.len();
    for job in state.jobs.drain(..) {
        job.abort();
    }
    state.entries.clear();
    count
}

/// Parses a cron expression. Five-field expressions get a leading seconds field of `0`.
pub fn parse_timing(timing: &str) -> Result<Schedule, cron::error::Error> {
    let timing = timing.trim();
    if timing.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {timing}"))
    } else {
        Schedule::from_str(timing)
    }
}

async fn run_job(
    executor: Arc<dyn JobExecutor>,
    schedule: Schedule,
    offset: FixedOffset,
    action: CronAction,
    team_id: String,
) {
    loop {
        let Some(next) = schedule.upcoming(offset).next() else {
            info!(
                event_name = "scheduler.job.exhausted",
                action = action.as_str(),
                team = %team_id,
                "schedule has no further runs"
            );
            return;
        };
        let wait = (next.with_timezone(&Utc) - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait + JOB_DELAY).await;
        executor.run(action, &team_id).await;
    }
}

/// Runs cron actions against the team's board configuration.
pub struct JobRunner {
    workflows: Workflows,
    config_dir: PathBuf,
}

impl JobRunner {
    pub fn new(workflows: Workflows, config_dir: PathBuf) -> Self {
        Self { workflows, config_dir }
    }
}

#[async_trait]
impl JobExecutor for JobRunner {
    async fn run(&self, action: CronAction, team_id: &str) {
        let team = match TeamConfig::load(&self.config_dir, team_id) {
            Ok(team) => team,
            Err(error) => {
                self.workflows
                    .trap(&format!("CRON ISSUE: could not load team `{team_id}` for `{action}`"), &error)
                    .await;
                return;
            }
        };

        if action.holiday_suppressed() {
            if let Some(holiday) = self.workflows.holiday_today(&team).await {
                info!(
                    event_name = "scheduler.job.skipped_holiday",
                    action = action.as_str(),
                    team = %team_id,
                    holiday = %holiday.name,
                    "today is a holiday, skipping job"
                );
                self.workflows
                    .log_to_slack(&format!(
                        "Today is Holiday, skipping `{action}` for *{team_id}*. ({})",
                        holiday.name
                    ))
                    .await;
                return;
            }
        }

        info!(event_name = "scheduler.job.started", action = action.as_str(), team = %team_id, "running cron job");
        self.workflows.log_to_slack(&format!("Executing CRON `{action}` on team *{team_id}*")).await;

        if let Err(error) = run_action(&self.workflows, action, &team).await {
            self.workflows
                .trap(&format!("Error returned running cron job `{action}` for team {team_id}"), &error)
                .await;
        }
    }

    async fn report(&self, text: &str) {
        self.workflows.log_to_slack(text).await;
    }
}

async fn run_action(
    workflows: &Workflows,
    action: CronAction,
    team: &TeamConfig,
) -> Result<(), WorkflowError> {
    match action {
        CronAction::StandupAlert => {
            workflows.send_alert(team, AlertKind::Standup).await;
        }
        CronAction::DemoAlert => {
            workflows.send_alert(team, AlertKind::Demo).await;
        }
        CronAction::RetroAlert => {
            workflows.send_alert(team, AlertKind::Retro).await;
        }
        CronAction::WdwAlert => {
            workflows.send_alert(team, AlertKind::Wdw).await;
        }
        CronAction::SdlcAlert => {
            workflows.send_alert(team, AlertKind::Sdlc).await;
        }
        CronAction::StalePr => {
            workflows.stale_pr_cards(team).await?;
        }
        CronAction::Troll => {
            workflows.alert_runner(team).await?;
            workflows.skipped_pr(team).await?;
        }
        CronAction::Sprint => {
            workflows.start_sprint(team, false).await?;
        }
        CronAction::SyncPoints => {
            workflows.point_cleanup(team).await?;
        }
        CronAction::ArchiveDone => {
            workflows.clean_done(team).await?;
        }
        CronAction::ArchiveBacklog => {
            workflows.archive_backlog(team).await?;
        }
        CronAction::CleanBacklog => {
            workflows.clean_backlog(team).await?;
        }
        CronAction::PrSummary => {
            workflows.pr_summary(team).await?;
        }
        CronAction::RecordPoints => {
            let sprint = workflows.current_sprint(team).await?;
            workflows.get_all_points(team, &sprint).await?;
        }
        CronAction::CountCards => {
            workflows.count_cards(team).await?;
        }
        CronAction::Holidays => {
            workflows.holiday_troll(team).await;
        }
        CronAction::EpicLinks => {
            workflows.epic_link(team).await?;
        }
        CronAction::ChapterCount => {
            workflows.record_chapters(team, "backlog").await?;
        }
        CronAction::CriticalBug => {
            workflows.check_bugs(team).await?;
        }
        CronAction::CardLoader => {
            workflows.card_play(team).await?;
        }
        CronAction::RetroAction => {
            workflows.check_action_cards(team).await?;
        }
        CronAction::TemplateCheck => {
            workflows.template_card(team).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{FixedOffset, Timelike, Utc};
    use tempfile::TempDir;

    use scrumbot_core::schedule::{CronAction, ScheduleError};

    use super::{parse_timing, JobExecutor, LoadReport, Scheduler, SchedulerStatus};

    #[derive(Default)]
    struct RecordingExecutor {
        runs: Mutex<Vec<(CronAction, String)>>,
        reports: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn run(&self, action: CronAction, team_id: &str) {
            self.runs.lock().expect("lock").push((action, team_id.to_string()));
        }

        async fn report(&self, text: &str) {
            self.reports.lock().expect("lock").push(text.to_string());
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("offset")
    }

    fn scheduler_with(dir: &TempDir, table: Option<&str>) -> (Scheduler, Arc<RecordingExecutor>) {
        let path = dir.path().join("cron.toml");
        if let Some(table) = table {
            fs::write(&path, table).expect("write cron table");
        }
        let executor = Arc::new(RecordingExecutor::default());
        (Scheduler::new(executor.clone(), path, utc()), executor)
    }

    #[test]
    fn five_field_timings_gain_a_seconds_field() {
        let schedule = parse_timing("30 9 * * MON-FRI").expect("five fields");
        let next = schedule.upcoming(Utc).next().expect("next run");
        assert_eq!((next.hour(), next.minute(), next.second()), (9, 30, 0));

        assert!(parse_timing("0 0 9 * * *").is_ok());
        assert!(parse_timing("every tuesday").is_err());
    }

    #[tokio::test]
    async fn load_skips_unknown_actions_and_bad_timings() {
        let dir = TempDir::new().expect("temp dir");
        let (scheduler, executor) = scheduler_with(
            &dir,
            Some(
                r#"
[[Cronjob]]
Timing = "0 0 9 * * MON-FRI"
Action = "standupalert"
Config = "mcboard"

[[Cronjob]]
Timing = "0 0 9 * * *"
Action = "make-coffee"
Config = "mcboard"

[[Cronjob]]
Timing = "sometime"
Action = "pr"
Config = "mcboard"
"#,
            ),
        );

        let report = scheduler.load().await.expect("load");
        assert_eq!(report, LoadReport { scheduled: 1, skipped: 2 });
        let reports = executor.reports.lock().expect("lock").clone();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].starts_with("CRON ISSUE: skipping `make-coffee` for team `mcboard`"));
        assert!(reports[1].starts_with("CRON ISSUE: invalid timing `sometime` for `pr`"));
        assert_eq!(scheduler.status().await, SchedulerStatus::Running);
        assert_eq!(
            scheduler.list().await,
            "`0 0 9 * * MON-FRI` - *standupalert* for team `mcboard`\n"
        );

        assert_eq!(scheduler.halt().await, 1);
        assert_eq!(scheduler.status().await, SchedulerStatus::Stopped);
        assert!(scheduler.list().await.starts_with("No cron jobs are loaded"));
    }

    #[tokio::test]
    async fn missing_cron_file_leaves_the_scheduler_empty() {
        let dir = TempDir::new().expect("temp dir");
        let (scheduler, executor) = scheduler_with(&dir, None);

        let error = scheduler.load().await.expect_err("missing file");
        assert!(matches!(error, ScheduleError::MissingFile(_)));
        assert!(error.to_string().contains("Can not find a valid `cron.toml`"));
        assert_eq!(scheduler.status().await, SchedulerStatus::Stopped);
        assert_eq!(*executor.reports.lock().expect("lock"), vec![error.to_string()]);
    }

    #[tokio::test]
    async fn unparsable_cron_table_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let (scheduler, executor) = scheduler_with(&dir, Some("[[Cronjob]\nTiming = "));

        let error = scheduler.load().await.expect_err("broken table");
        assert!(matches!(error, ScheduleError::Parse { .. }));
        assert_eq!(scheduler.status().await, SchedulerStatus::Stopped);
        let reports = executor.reports.lock().expect("lock").clone();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("could not parse cron file"));
    }

    #[tokio::test]
    async fn due_jobs_reach_the_executor() {
        let dir = TempDir::new().expect("temp dir");
        let (scheduler, executor) = scheduler_with(
            &dir,
            Some(
                r#"
[[Cronjob]]
Timing = "* * * * * *"
Action = "troll"
Config = "mcboard"
"#,
            ),
        );
        scheduler.load().await.expect("load");

        let fired = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if !executor.runs.lock().expect("lock").is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        scheduler.halt().await;

        assert!(fired.is_ok(), "job should fire within a few seconds");
        let runs = executor.runs.lock().expect("lock").clone();
        assert_eq!(runs[0], (CronAction::Troll, "mcboard".to_string()));
    }
}
