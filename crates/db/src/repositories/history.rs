use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use scrumbot_core::domain::records::{
    BurndownEntry, CardTrackerRow, ChapterCardsEntry, SquadPointsEntry, ThemeCountEntry,
};
use scrumbot_core::errors::StoreError;
use scrumbot_core::ports::HistoryStore;

use super::{
    parse_optional_timestamp, parse_u32, store_error, RepositoryError, SqlStore,
};

impl SqlStore {
    /// Rows currently held by the card tracker, in insertion order.
    pub async fn card_tracker_rows(&self) -> Result<Vec<CardTrackerRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT
                card_id,
                title,
                points,
                url,
                list_name,
                started_working,
                started_review,
                entered_done,
                owners,
                team_id
             FROM card_tracker
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(tracker_from_row).collect::<Result<_, _>>()?)
    }
}

#[async_trait]
impl HistoryStore for SqlStore {
    async fn record_burndown(&self, entry: &BurndownEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO burndown (
                recorded_at,
                team_id,
                total,
                ready_for_work,
                working,
                review,
                done,
                cards
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.recorded_at.to_rfc3339())
        .bind(&entry.team_id)
        .bind(i64::from(entry.total))
        .bind(i64::from(entry.ready_for_work))
        .bind(i64::from(entry.working))
        .bind(i64::from(entry.review))
        .bind(i64::from(entry.done))
        .bind(i64::from(entry.cards))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn record_squad_points(&self, entries: &[SquadPointsEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO sprint_squad_points (sprint_name, squad_name, points) VALUES (?, ?, ?)",
            )
            .bind(&entry.sprint_name)
            .bind(&entry.squad_name)
            .bind(i64::from(entry.points))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)
    }

    async fn squad_points_for(&self, sprint_name: &str) -> Result<Vec<SquadPointsEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT sprint_name, squad_name, points
             FROM sprint_squad_points
             WHERE lower(sprint_name) = lower(?)
             ORDER BY id",
        )
        .bind(sprint_name)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(squad_points_from_row).collect::<Result<_, _>>()?)
    }

    async fn record_theme_counts(&self, entries: &[ThemeCountEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO theme_counts (counted_at, team_id, sprint_name, label_name, quantity)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(entry.counted_at.to_rfc3339())
            .bind(&entry.team_id)
            .bind(&entry.sprint_name)
            .bind(&entry.label_name)
            .bind(i64::from(entry.quantity))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)
    }

    async fn record_chapter_cards(&self, entries: &[ChapterCardsEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO chapter_cards (recorded_at, chapter_name, list_name, cards, team_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(entry.recorded_at.to_rfc3339())
            .bind(&entry.chapter_name)
            .bind(&entry.list_name)
            .bind(i64::from(entry.cards))
            .bind(&entry.team_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)
    }

    async fn reset_card_tracker(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM card_tracker").execute(&self.pool).await.map_err(store_error)?;
        Ok(())
    }

    async fn record_card_tracker(&self, rows: &[CardTrackerRow]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for row in rows {
            sqlx::query(
                "INSERT INTO card_tracker (
                    card_id,
                    title,
                    points,
                    url,
                    list_name,
                    started_working,
                    started_review,
                    entered_done,
                    owners,
                    team_id
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.card_id)
            .bind(&row.title)
            .bind(i64::from(row.points))
            .bind(&row.url)
            .bind(&row.list_name)
            .bind(row.started_working.map(|value| value.to_rfc3339()))
            .bind(row.started_review.map(|value| value.to_rfc3339()))
            .bind(row.entered_done.map(|value| value.to_rfc3339()))
            .bind(&row.owners)
            .bind(&row.team_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)
    }

    async fn archive_card_tracker(&self, table_name: &str) -> Result<(), StoreError> {
        if !is_archive_name(table_name) {
            return Err(RepositoryError::Decode(format!(
                "refusing to archive into table `{table_name}`"
            ))
            .into());
        }
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {table_name}"))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query(&format!("CREATE TABLE {table_name} AS SELECT * FROM card_tracker"))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)
    }
}

/// Archive tables are named from sprint names, so only `[a-z0-9_]` is interpolated.
fn is_archive_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name != "card_tracker"
}

fn squad_points_from_row(row: SqliteRow) -> Result<SquadPointsEntry, RepositoryError> {
    Ok(SquadPointsEntry {
        sprint_name: row.try_get("sprint_name")?,
        squad_name: row.try_get("squad_name")?,
        points: parse_u32("points", row.try_get("points")?)?,
    })
}

fn tracker_from_row(row: SqliteRow) -> Result<CardTrackerRow, RepositoryError> {
    Ok(CardTrackerRow {
        card_id: row.try_get("card_id")?,
        title: row.try_get("title")?,
        points: parse_u32("points", row.try_get("points")?)?,
        url: row.try_get("url")?,
        list_name: row.try_get("list_name")?,
        started_working: parse_optional_timestamp("started_working", row.try_get("started_working")?)?,
        started_review: parse_optional_timestamp("started_review", row.try_get("started_review")?)?,
        entered_done: parse_optional_timestamp("entered_done", row.try_get("entered_done")?)?,
        owners: row.try_get("owners")?,
        team_id: row.try_get("team_id")?,
    })
}
