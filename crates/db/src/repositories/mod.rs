//! SQLite implementations of the workflow store ports.
//!
//! One [`SqlStore`] backs every store trait; each concern lives in its own module.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use scrumbot_core::errors::StoreError;

use crate::DbPool;

pub mod categories;
pub mod history;
pub mod holidays;
pub mod sprints;
pub mod users;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        StoreError(value.to_string())
    }
}

#[derive(Clone)]
pub struct SqlStore {
    pool: DbPool,
}

impl SqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn store_error(error: sqlx::Error) -> StoreError {
    RepositoryError::Database(error).into()
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
pub(crate) async fn setup_pool() -> DbPool {
    let pool = crate::connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    crate::migrations::run_pending(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
pub(crate) fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
}
