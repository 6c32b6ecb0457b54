use scrumbot_core::config::LoadOptions;
use scrumbot_db::migrations::MIGRATOR;

use crate::commands::{block_on, connect, load_config, CommandResult, EXIT_DATABASE};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("start", failure),
    };

    let result = block_on(async {
        let pool = connect(&config).await?;
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        // A fresh database has no migration table yet.
        let applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap_or(0);
        pool.close().await;
        Ok(usize::try_from(applied).unwrap_or(0))
    });

    match result {
        Ok(applied) => {
            let pending = MIGRATOR.iter().count().saturating_sub(applied);
            CommandResult::success(
                "start",
                format!(
                    "preflight passed for bot `{}`: config valid, database reachable, {pending} pending migration(s)",
                    config.bot.name
                ),
            )
        }
        Err(failure) => CommandResult::from_failure("start", failure),
    }
}
