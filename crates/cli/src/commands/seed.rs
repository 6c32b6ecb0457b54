//! Loads board label mappings, holidays and the user registry from a TOML seed file.
//!
//! ```toml
//! [[squads]]
//! board_id = "5a1b..."
//! label_id = "5c2d..."
//! name = "Platform"
//!
//! [[holidays]]
//! date = "2026-12-25"
//! name = "Christmas"
//! message = "No standup today, enjoy the break!"
//! ```
//!
//! Labels and holidays are upserted. Users are only added when their Slack id is unknown, so
//! re-running a seed is safe.

use std::fs;
use std::path::Path;

use scrumbot_core::config::LoadOptions;
use scrumbot_core::domain::records::{BugLabel, CategoryLabel, Holiday, UserRecord};
use scrumbot_core::errors::StoreError;
use scrumbot_core::ports::UserStore;
use scrumbot_db::{migrations, SqlStore};
use serde::Deserialize;

use crate::commands::{
    block_on, connect, load_config, CommandResult, Failure, EXIT_CONFIG, EXIT_DATABASE,
    EXIT_MIGRATION,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub squads: Vec<CategoryLabel>,
    pub chapters: Vec<CategoryLabel>,
    pub bug_labels: Vec<BugLabel>,
    pub holidays: Vec<Holiday>,
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub squads: usize,
    pub chapters: usize,
    pub bug_labels: usize,
    pub holidays: usize,
    pub users_added: usize,
    pub users_existing: usize,
}

impl SeedSummary {
    fn render(&self) -> String {
        format!(
            "seeded {} squad(s), {} chapter(s), {} bug label(s), {} holiday(s); \
             added {} user(s), {} already registered",
            self.squads,
            self.chapters,
            self.bug_labels,
            self.holidays,
            self.users_added,
            self.users_existing
        )
    }
}

pub fn read_seed_file(path: &Path) -> Result<SeedFile, Failure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ("seed_file", format!("could not read seed file `{}`: {error}", path.display()), EXIT_CONFIG)
    })?;
    toml::from_str(&raw).map_err(|error| {
        ("seed_file", format!("could not parse seed file `{}`: {error}", path.display()), EXIT_CONFIG)
    })
}

pub async fn apply(store: &SqlStore, seed: &SeedFile) -> Result<SeedSummary, StoreError> {
    let mut summary = SeedSummary::default();

    for squad in &seed.squads {
        store.add_squad(squad).await?;
        summary.squads += 1;
    }
    for chapter in &seed.chapters {
        store.add_chapter(chapter).await?;
        summary.chapters += 1;
    }
    for bug in &seed.bug_labels {
        store.add_bug_label(bug).await?;
        summary.bug_labels += 1;
    }
    for holiday in &seed.holidays {
        store.add_holiday(holiday).await?;
        summary.holidays += 1;
    }
    for user in &seed.users {
        if store.user_by_slack_id(&user.slack_id).await?.is_some() {
            summary.users_existing += 1;
            continue;
        }
        store.add_user(user).await?;
        summary.users_added += 1;
    }

    Ok(summary)
}

pub fn run(options: LoadOptions, file: &Path) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("seed", failure),
    };
    let seed = match read_seed_file(file) {
        Ok(seed) => seed,
        Err(failure) => return CommandResult::from_failure("seed", failure),
    };

    let result = block_on(async {
        let pool = connect(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let store = SqlStore::new(pool.clone());
        let outcome = apply(&store, &seed)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_DATABASE));
        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => CommandResult::success("seed", summary.render()),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}
