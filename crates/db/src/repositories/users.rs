use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use scrumbot_core::domain::records::UserRecord;
use scrumbot_core::errors::StoreError;
use scrumbot_core::ports::UserStore;

use super::{store_error, RepositoryError, SqlStore};

const USER_COLUMNS: &str = "SELECT name, slack_id, trello, github, email FROM users";

#[async_trait]
impl UserStore for SqlStore {
    async fn users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query(&format!("{USER_COLUMNS} ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(user_from_row).collect::<Result<_, _>>()?)
    }

    async fn user_by_slack_id(&self, slack_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("{USER_COLUMNS} WHERE slack_id = ?"))
            .bind(slack_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(user_from_row).transpose()?)
    }

    async fn user_by_trello(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("{USER_COLUMNS} WHERE lower(trello) = lower(?) LIMIT 1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(user_from_row).transpose()?)
    }

    async fn add_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (name, slack_id, trello, github, email) VALUES (?, ?, ?, ?, ?)")
            .bind(&user.name)
            .bind(&user.slack_id)
            .bind(&user.trello)
            .bind(&user.github)
            .bind(&user.email)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

fn user_from_row(row: SqliteRow) -> Result<UserRecord, RepositoryError> {
    Ok(UserRecord {
        name: row.try_get("name")?,
        slack_id: row.try_get("slack_id")?,
        trello: row.try_get("trello")?,
        github: row.try_get("github")?,
        email: row.try_get("email")?,
    })
}
