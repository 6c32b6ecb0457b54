use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use scrumbot_core::domain::records::{BugLabel, CategoryLabel};
use scrumbot_core::errors::StoreError;
use scrumbot_core::ports::CategoryStore;

use super::{store_error, RepositoryError, SqlStore};

impl SqlStore {
    async fn category_labels(
        &self,
        table: Category,
        board_id: &str,
    ) -> Result<Vec<CategoryLabel>, StoreError> {
        let sql = match table {
            Category::Squad => "SELECT board_id, label_id, name FROM squads WHERE board_id = ? ORDER BY name",
            Category::Chapter => {
                "SELECT board_id, label_id, name FROM chapters WHERE board_id = ? ORDER BY name"
            }
        };
        let rows = sqlx::query(sql).bind(board_id).fetch_all(&self.pool).await.map_err(store_error)?;
        Ok(rows.into_iter().map(category_from_row).collect::<Result<_, _>>()?)
    }

    /// Maps a board label to a squad. Used by operators seeding a new board.
    pub async fn add_squad(&self, label: &CategoryLabel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO squads (board_id, label_id, name) VALUES (?, ?, ?)
             ON CONFLICT(board_id, label_id) DO UPDATE SET name = excluded.name",
        )
        .bind(&label.board_id)
        .bind(&label.label_id)
        .bind(&label.name)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    pub async fn add_chapter(&self, label: &CategoryLabel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chapters (board_id, label_id, name) VALUES (?, ?, ?)
             ON CONFLICT(board_id, label_id) DO UPDATE SET name = excluded.name",
        )
        .bind(&label.board_id)
        .bind(&label.label_id)
        .bind(&label.name)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    pub async fn add_bug_label(&self, bug: &BugLabel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bug_labels (board_id, label_id, level) VALUES (?, ?, ?)
             ON CONFLICT(board_id, label_id) DO UPDATE SET level = excluded.level",
        )
        .bind(&bug.board_id)
        .bind(&bug.label_id)
        .bind(&bug.level)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Category {
    Squad,
    Chapter,
}

#[async_trait]
impl CategoryStore for SqlStore {
    async fn squads(&self, board_id: &str) -> Result<Vec<CategoryLabel>, StoreError> {
        self.category_labels(Category::Squad, board_id).await
    }

    async fn chapters(&self, board_id: &str) -> Result<Vec<CategoryLabel>, StoreError> {
        self.category_labels(Category::Chapter, board_id).await
    }

    async fn ignored_labels(&self, board_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT label_id FROM label_ignore WHERE board_id = ? ORDER BY label_id")
            .bind(board_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter().map(|row| row.try_get::<String, _>("label_id").map_err(store_error)).collect()
    }

    async fn ignore_label(&self, board_id: &str, label_id: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO label_ignore (board_id, label_id) VALUES (?, ?)")
            .bind(board_id)
            .bind(label_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn bug_labels(&self, board_id: &str) -> Result<Vec<BugLabel>, StoreError> {
        let rows = sqlx::query("SELECT board_id, label_id, level FROM bug_labels WHERE board_id = ?")
            .bind(board_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(bug_from_row).collect::<Result<_, _>>()?)
    }
}

fn category_from_row(row: SqliteRow) -> Result<CategoryLabel, RepositoryError> {
    Ok(CategoryLabel {
        board_id: row.try_get("board_id")?,
        label_id: row.try_get("label_id")?,
        name: row.try_get("name")?,
    })
}

fn bug_from_row(row: SqliteRow) -> Result<BugLabel, RepositoryError> {
    Ok(BugLabel {
        board_id: row.try_get("board_id")?,
        label_id: row.try_get("label_id")?,
        level: row.try_get("level")?,
    })
}
