use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use scrumbot_core::domain::records::SprintRecord;
use scrumbot_core::errors::StoreError;
use scrumbot_core::ports::SprintStore;

use super::{parse_timestamp, parse_u32, store_error, RepositoryError, SqlStore};

#[async_trait]
impl SprintStore for SqlStore {
    async fn latest_sprint(&self, team_id: &str) -> Result<Option<SprintRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT team_id, sprint_name, started_at, duration_days, working_days, retro_board_id
             FROM sprints
             WHERE team_id = ?
             ORDER BY started_at DESC, id DESC
             LIMIT 1",
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(sprint_from_row).transpose()?)
    }

    async fn record_sprint(&self, sprint: &SprintRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sprints (
                team_id,
                sprint_name,
                started_at,
                duration_days,
                working_days,
                retro_board_id
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&sprint.team_id)
        .bind(&sprint.sprint_name)
        .bind(sprint.started_at.to_rfc3339())
        .bind(i64::from(sprint.duration_days))
        .bind(i64::from(sprint.working_days))
        .bind(&sprint.retro_board_id)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn retro_board_ids(&self, team_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT retro_board_id
             FROM sprints
             WHERE team_id = ? AND retro_board_id <> ''
             ORDER BY retro_board_id",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("retro_board_id").map_err(store_error))
            .collect()
    }
}

fn sprint_from_row(row: SqliteRow) -> Result<SprintRecord, RepositoryError> {
    Ok(SprintRecord {
        team_id: row.try_get("team_id")?,
        sprint_name: row.try_get("sprint_name")?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        duration_days: parse_u32("duration_days", row.try_get("duration_days")?)?,
        working_days: parse_u32("working_days", row.try_get("working_days")?)?,
        retro_board_id: row.try_get("retro_board_id")?,
    })
}
