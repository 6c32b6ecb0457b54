use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};

use scrumbot_core::domain::records::Holiday;
use scrumbot_core::errors::StoreError;
use scrumbot_core::ports::HolidayStore;

use super::{parse_date, store_error, RepositoryError, SqlStore};

impl SqlStore {
    /// Inserts or replaces a calendar entry.
    pub async fn add_holiday(&self, holiday: &Holiday) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO holidays (holiday_date, name, message) VALUES (?, ?, ?)
             ON CONFLICT(holiday_date) DO UPDATE SET
                name = excluded.name,
                message = excluded.message",
        )
        .bind(holiday.date.format("%Y-%m-%d").to_string())
        .bind(&holiday.name)
        .bind(&holiday.message)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl HolidayStore for SqlStore {
    async fn holiday_on(&self, date: NaiveDate) -> Result<Option<Holiday>, StoreError> {
        let row = sqlx::query("SELECT holiday_date, name, message FROM holidays WHERE holiday_date = ?")
            .bind(date.format("%Y-%m-%d").to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(holiday_from_row).transpose()?)
    }

    async fn holidays_in_year(&self, year: i32) -> Result<Vec<Holiday>, StoreError> {
        let rows = sqlx::query(
            "SELECT holiday_date, name, message
             FROM holidays
             WHERE holiday_date LIKE ?
             ORDER BY holiday_date",
        )
        .bind(format!("{year:04}-%"))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(holiday_from_row).collect::<Result<_, _>>()?)
    }
}

fn holiday_from_row(row: SqliteRow) -> Result<Holiday, RepositoryError> {
    Ok(Holiday {
        date: parse_date("holiday_date", row.try_get("holiday_date")?)?,
        name: row.try_get("name")?,
        message: row.try_get("message")?,
    })
}
