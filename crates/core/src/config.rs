use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub trello: TrelloConfig,
    pub github: GithubConfig,
    pub bot: BotConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    /// Incoming webhook used for channel posts. Falls back to `chat.postMessage` when unset.
    pub webhook_url: Option<SecretString>,
    pub admin_channel: String,
    pub scrum_channel: String,
    pub log_channel: String,
    pub emoji: String,
    pub log_to_slack: bool,
}

#[derive(Clone, Debug)]
pub struct TrelloConfig {
    pub key: SecretString,
    pub token: SecretString,
    /// Trello member id the bot authenticates as; used to recognise its own comments.
    pub bot_member_id: String,
    pub org_id: String,
    pub points_plugin_id: String,
}

#[derive(Clone, Debug)]
pub struct GithubConfig {
    pub token: Option<SecretString>,
    pub org: String,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub name: String,
    pub user_id: String,
    pub logging_prefix: String,
    pub table_prefix: String,
    pub config_dir: PathBuf,
    pub cron_file: PathBuf,
    pub utc_offset_hours: i32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub trello_key: Option<String>,
    pub trello_token: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub cron_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    /// Source credentials from `TRELLO_KEY`, `TRELLO_TOKEN`, `SLACK_HOOK`, `SLACK_TOKEN`,
    /// `SLACK_APP_TOKEN` and `GITHUB_TOKEN`, failing when the required ones are absent.
    pub credentials_from_env: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("required credential `{0}` is not set in the environment")]
    MissingEnvCredential(&'static str),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://scrumbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                webhook_url: None,
                admin_channel: String::new(),
                scrum_channel: String::new(),
                log_channel: String::new(),
                emoji: ":robot_face:".to_string(),
                log_to_slack: false,
            },
            trello: TrelloConfig {
                key: String::new().into(),
                token: String::new().into(),
                bot_member_id: String::new(),
                org_id: String::new(),
                points_plugin_id: String::new(),
            },
            github: GithubConfig { token: None, org: String::new() },
            bot: BotConfig {
                name: "scrumbot".to_string(),
                user_id: String::new(),
                logging_prefix: String::new(),
                table_prefix: "scrumbot".to_string(),
                config_dir: PathBuf::from("cfg"),
                cron_file: PathBuf::from("cfg/cron.toml"),
                utc_offset_hours: 0,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl BotConfig {
    /// Offset used to decide which calendar day "today" is for holidays and weekends.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.apply_patch(read_patch(&path)?),
            None if options.require_file => {
                let expected = options.config_path.unwrap_or_else(|| PathBuf::from("scrumbot.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        if options.credentials_from_env {
            config.apply_credential_env()?;
        }
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        let ConfigPatch { database, slack, trello, github, bot, server, logging } = patch;
        if let Some(patch) = database {
            merge(&mut self.database.url, patch.url);
            merge(&mut self.database.max_connections, patch.max_connections);
            merge(&mut self.database.timeout_secs, patch.timeout_secs);
        }
        if let Some(patch) = slack {
            merge(&mut self.slack.app_token, patch.app_token.map(SecretString::from));
            merge(&mut self.slack.bot_token, patch.bot_token.map(SecretString::from));
            merge(&mut self.slack.webhook_url, patch.webhook_url.map(|url| Some(url.into())));
            merge(&mut self.slack.admin_channel, patch.admin_channel);
            merge(&mut self.slack.scrum_channel, patch.scrum_channel);
            merge(&mut self.slack.log_channel, patch.log_channel);
            merge(&mut self.slack.emoji, patch.emoji);
            merge(&mut self.slack.log_to_slack, patch.log_to_slack);
        }
        if let Some(patch) = trello {
            merge(&mut self.trello.key, patch.key.map(SecretString::from));
            merge(&mut self.trello.token, patch.token.map(SecretString::from));
            merge(&mut self.trello.bot_member_id, patch.bot_member_id);
            merge(&mut self.trello.org_id, patch.org_id);
            merge(&mut self.trello.points_plugin_id, patch.points_plugin_id);
        }
        if let Some(patch) = github {
            merge(&mut self.github.token, patch.token.map(|token| Some(token.into())));
            merge(&mut self.github.org, patch.org);
        }
        if let Some(patch) = bot {
            merge(&mut self.bot.name, patch.name);
            merge(&mut self.bot.user_id, patch.user_id);
            merge(&mut self.bot.logging_prefix, patch.logging_prefix);
            merge(&mut self.bot.table_prefix, patch.table_prefix);
            merge(&mut self.bot.config_dir, patch.config_dir);
            merge(&mut self.bot.cron_file, patch.cron_file);
            merge(&mut self.bot.utc_offset_hours, patch.utc_offset_hours);
        }
        if let Some(patch) = server {
            merge(&mut self.server.bind_address, patch.bind_address);
            merge(&mut self.server.health_check_port, patch.health_check_port);
            merge(&mut self.server.graceful_shutdown_secs, patch.graceful_shutdown_secs);
        }
        if let Some(patch) = logging {
            merge(&mut self.logging.level, patch.level);
            merge(&mut self.logging.format, patch.format);
        }
    }

    /// `SCRUMBOT_<SECTION>_<KEY>` variables. Blank values are ignored.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        merge(&mut self.database.url, read_env("SCRUMBOT_DATABASE_URL"));
        merge(&mut self.database.max_connections, env_parsed("SCRUMBOT_DATABASE_MAX_CONNECTIONS")?);
        merge(&mut self.database.timeout_secs, env_parsed("SCRUMBOT_DATABASE_TIMEOUT_SECS")?);

        merge(&mut self.slack.app_token, secret_env("SCRUMBOT_SLACK_APP_TOKEN"));
        merge(&mut self.slack.bot_token, secret_env("SCRUMBOT_SLACK_BOT_TOKEN"));
        merge(&mut self.slack.webhook_url, secret_env("SCRUMBOT_SLACK_WEBHOOK_URL").map(Some));
        merge(&mut self.slack.log_to_slack, env_parsed("SCRUMBOT_SLACK_LOG_TO_SLACK")?);

        merge(&mut self.trello.key, secret_env("SCRUMBOT_TRELLO_KEY"));
        merge(&mut self.trello.token, secret_env("SCRUMBOT_TRELLO_TOKEN"));
        merge(&mut self.github.token, secret_env("SCRUMBOT_GITHUB_TOKEN").map(Some));

        merge(&mut self.bot.config_dir, read_env("SCRUMBOT_BOT_CONFIG_DIR").map(PathBuf::from));
        merge(&mut self.bot.cron_file, read_env("SCRUMBOT_BOT_CRON_FILE").map(PathBuf::from));
        merge(&mut self.bot.utc_offset_hours, env_parsed("SCRUMBOT_BOT_UTC_OFFSET_HOURS")?);

        merge(&mut self.server.bind_address, read_env("SCRUMBOT_SERVER_BIND_ADDRESS"));
        merge(&mut self.server.health_check_port, env_parsed("SCRUMBOT_SERVER_HEALTH_CHECK_PORT")?);
        merge(
            &mut self.server.graceful_shutdown_secs,
            env_parsed("SCRUMBOT_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        merge(&mut self.logging.level, read_env("SCRUMBOT_LOGGING_LEVEL"));
        merge(&mut self.logging.format, env_parsed("SCRUMBOT_LOGGING_FORMAT")?);
        Ok(())
    }

    /// The unprefixed variable names the bot was historically deployed with.
    fn apply_credential_env(&mut self) -> Result<(), ConfigError> {
        self.trello.key = required_env("TRELLO_KEY")?.into();
        self.trello.token = required_env("TRELLO_TOKEN")?.into();
        self.slack.bot_token = required_env("SLACK_TOKEN")?.into();
        self.slack.app_token = required_env("SLACK_APP_TOKEN")?.into();
        merge(&mut self.slack.webhook_url, secret_env("SLACK_HOOK").map(Some));
        merge(&mut self.github.token, secret_env("GITHUB_TOKEN").map(Some));
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        merge(&mut self.database.url, overrides.database_url);
        merge(&mut self.slack.app_token, overrides.slack_app_token.map(SecretString::from));
        merge(&mut self.slack.bot_token, overrides.slack_bot_token.map(SecretString::from));
        merge(&mut self.trello.key, overrides.trello_key.map(SecretString::from));
        merge(&mut self.trello.token, overrides.trello_token.map(SecretString::from));
        merge(&mut self.bot.config_dir, overrides.config_dir);
        merge(&mut self.bot.cron_file, overrides.cron_file);
    }

    /// Stops at the first bad value; the message names its key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        let url = database.url.trim();
        check(
            url.starts_with("sqlite:") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        check(database.max_connections > 0, "database.max_connections must be greater than zero")?;
        check(
            (1..=300).contains(&database.timeout_secs),
            "database.timeout_secs must be in range 1..=300",
        )?;

        let slack = &self.slack;
        check_slack_token(
            "slack.app_token",
            &slack.app_token,
            "xapp-",
            "Basic Information > App-Level Tokens",
        )?;
        check_slack_token(
            "slack.bot_token",
            &slack.bot_token,
            "xoxb-",
            "OAuth & Permissions > Bot User OAuth Token",
        )?;
        let webhook_ok =
            slack.webhook_url.as_ref().map_or(true, |url| url.expose_secret().starts_with("https://"));
        check(webhook_ok, "slack.webhook_url must start with https://")?;
        check(
            !slack.log_to_slack || !slack.log_channel.trim().is_empty(),
            "slack.log_channel is required when slack.log_to_slack is enabled",
        )?;

        check(
            !self.trello.key.expose_secret().trim().is_empty(),
            "trello.key is required. Get it from https://trello.com/app-key",
        )?;
        check(
            !self.trello.token.expose_secret().trim().is_empty(),
            "trello.token is required. Generate one from https://trello.com/app-key",
        )?;

        let bot = &self.bot;
        check(!bot.name.trim().is_empty(), "bot.name must not be blank")?;
        check(
            !bot.table_prefix.is_empty()
                && bot.table_prefix.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_'),
            "bot.table_prefix must be non-empty and contain only [A-Za-z0-9_]",
        )?;
        check(
            (-12..=14).contains(&bot.utc_offset_hours),
            "bot.utc_offset_hours must be in range -12..=14",
        )?;

        check(self.server.health_check_port > 0, "server.health_check_port must be greater than zero")?;
        check(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )?;

        check(
            matches!(
                self.logging.level.trim().to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn check(ok: bool, message: impl Into<String>) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.into()))
    }
}

fn check_slack_token(
    key: &str,
    token: &SecretString,
    prefix: &str,
    app_page: &str,
) -> Result<(), ConfigError> {
    let token = token.expose_secret();
    check(
        !token.is_empty(),
        format!("{key} is required. Get it from https://api.slack.com/apps > Your App > {app_page}"),
    )?;
    let swapped = ["xapp-", "xoxb-"].iter().any(|other| *other != prefix && token.starts_with(other));
    let hint = if swapped { " (hint: the app and bot tokens look swapped)" } else { "" };
    check(
        token.starts_with(prefix),
        format!("{key} must start with `{prefix}`{hint}. Get it from https://api.slack.com/apps"),
    )
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => ["scrumbot.toml", "config/scrumbot.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|path| path.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&interpolate_env_vars(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of the environment variable `NAME`.
pub(crate) fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn secret_env(key: &str) -> Option<SecretString> {
    read_env(key).map(SecretString::from)
}

fn required_env(key: &'static str) -> Result<String, ConfigError> {
    read_env(key).ok_or(ConfigError::MissingEnvCredential(key))
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Some(value) = read_env(key) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    trello: Option<TrelloPatch>,
    github: Option<GithubPatch>,
    bot: Option<BotPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    webhook_url: Option<String>,
    admin_channel: Option<String>,
    scrum_channel: Option<String>,
    log_channel: Option<String>,
    emoji: Option<String>,
    log_to_slack: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TrelloPatch {
    key: Option<String>,
    token: Option<String>,
    bot_member_id: Option<String>,
    org_id: Option<String>,
    points_plugin_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GithubPatch {
    token: Option<String>,
    org: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    name: Option<String>,
    user_id: Option<String>,
    logging_prefix: Option<String>,
    table_prefix: Option<String>,
    config_dir: Option<PathBuf>,
    cron_file: Option<PathBuf>,
    utc_offset_hours: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
