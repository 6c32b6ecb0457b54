use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scrumbot_core::config::{AppConfig, ConfigError, LoadOptions};
use scrumbot_core::{WorkflowSettings, Workflows};
use scrumbot_db::{connect_with_settings, migrations, DbPool, SqlStore};
use scrumbot_integrations::{GithubClient, TrelloClient};
use scrumbot_slack::events::command_dispatcher;
use scrumbot_slack::socket::{ReconnectPolicy, SocketModeRunner, WebSocketTransport};
use scrumbot_slack::{BotIdentity, SlackWebClient};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;

use crate::dispatch::{BotCommandService, Permissions, ServiceSettings};
use crate::scheduler::{JobRunner, Scheduler};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflows: Workflows,
    pub slack: SlackWebClient,
    pub scheduler: Arc<Scheduler>,
    /// Notified by the `shutdown please` chat command.
    pub shutdown: Arc<Notify>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = Client::builder().timeout(HTTP_TIMEOUT).build().map_err(BootstrapError::HttpClient)?;
    let slack = SlackWebClient::new(
        client.clone(),
        config.slack.bot_token.clone(),
        config.slack.app_token.clone(),
        config.slack.webhook_url.clone(),
        BotIdentity { name: config.bot.name.clone(), emoji: config.slack.emoji.clone() },
    );
    let trello = TrelloClient::new(client.clone(), config.trello.key.clone(), config.trello.token.clone());
    let github = GithubClient::new(client, config.github.org.clone(), config.github.token.clone());

    let workflows = Workflows::new(
        Arc::new(trello),
        Arc::new(github),
        Arc::new(slack.clone()),
        Arc::new(SqlStore::new(db_pool.clone())),
        WorkflowSettings::from_config(&config),
    );
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(JobRunner::new(workflows.clone(), config.bot.config_dir.clone())),
        config.bot.cron_file.clone(),
        config.bot.local_offset(),
    ));

    Ok(Application { config, db_pool, workflows, slack, scheduler, shutdown: Arc::new(Notify::new()) })
}

impl Application {
    /// Socket Mode runner with every chat command wired to this application.
    pub fn slack_runner(&self) -> SocketModeRunner {
        let directory = Arc::new(self.slack.clone());
        let permissions = Permissions::new(
            directory.clone(),
            self.config.slack.admin_channel.clone(),
            self.config.slack.scrum_channel.clone(),
        );
        let service = BotCommandService::new(
            self.workflows.clone(),
            directory,
            permissions,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.shutdown),
            ServiceSettings {
                bot_name: self.config.bot.name.clone(),
                bot_user_id: self.config.bot.user_id.clone(),
                log_channel: self.config.slack.log_channel.clone(),
                config_dir: self.config.bot.config_dir.clone(),
                skip_files: skip_files(&self.config),
            },
        );

        SocketModeRunner::new(
            Arc::new(WebSocketTransport::new(self.slack.clone())),
            command_dispatcher(service, self.config.bot.user_id.clone()),
            Arc::new(self.slack.clone()),
            ReconnectPolicy::default(),
        )
    }
}

/// Non-team files that may live next to the team files.
fn skip_files(config: &AppConfig) -> Vec<String> {
    [&config.bot.cron_file]
        .into_iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .chain(["scrumbot.toml".to_string()])
        .collect()
}

#[cfg(test)]
mod tests {
    use scrumbot_core::config::{ConfigOverrides, LoadOptions};
    use scrumbot_core::schedule::ScheduleError;
    use tempfile::TempDir;

    use crate::bootstrap::bootstrap;
    use crate::scheduler::SchedulerStatus;

    fn overrides(database_url: &str, dir: &TempDir) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                trello_key: Some("key".to_string()),
                trello_token: Some("token".to_string()),
                config_dir: Some(dir.path().to_path_buf()),
                cron_file: Some(dir.path().join("cron.toml")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let dir = TempDir::new().expect("temp dir");
        let mut options = overrides("sqlite::memory:", &dir);
        options.overrides.slack_app_token = Some("invalid-token".to_string());

        let message = bootstrap(options).await.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_the_scheduler() {
        let dir = TempDir::new().expect("temp dir");
        let app = bootstrap(overrides("sqlite::memory:?cache=shared", &dir))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('sprints', 'users', 'holidays', 'card_tracker')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables after bootstrap");
        assert_eq!(table_count, 4);

        let missing = app.scheduler.load().await.expect_err("no cron file in the temp dir");
        assert!(matches!(missing, ScheduleError::MissingFile(_)));
        assert_eq!(app.scheduler.status().await, SchedulerStatus::Stopped);

        app.db_pool.close().await;
    }
}
