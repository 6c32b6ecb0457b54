//! Day arithmetic shared by every age check.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};

/// Whole days between `reference` and `now`: `floor(hours / 24)`. Negative spans count as 0.
pub fn days_old(now: DateTime<Utc>, reference: DateTime<Utc>) -> u32 {
    let hours = (now - reference).num_hours();
    if hours <= 0 {
        0
    } else {
        u32::try_from(hours / 24).unwrap_or(u32::MAX)
    }
}

pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Working days in `[start, start + duration)`: every calendar day that is not a holiday,
/// minus the weekend estimate `round(duration / 7 * 2)`.
pub fn working_days(start: NaiveDate, duration_days: u32, holidays: &[NaiveDate]) -> u32 {
    let calendar_days = (0..duration_days)
        .filter_map(|offset| start.checked_add_signed(Duration::days(i64::from(offset))))
        .filter(|day| !holidays.contains(day))
        .count();
    let weekend_estimate = (f64::from(duration_days) / 7.0 * 2.0).round() as usize;
    u32::try_from(calendar_days.saturating_sub(weekend_estimate)).unwrap_or(0)
}

/// Time to discount from a Review card's age: 48h on a Monday when weekends are ignored,
/// plus 24h when yesterday was a holiday.
pub fn review_age_allowance(
    today: NaiveDate,
    ignore_weekends: bool,
    yesterday_was_holiday: bool,
) -> Duration {
    let mut allowance = Duration::zero();
    if ignore_weekends && today.weekday() == Weekday::Mon {
        allowance += Duration::hours(48);
    }
    if yesterday_was_holiday {
        allowance += Duration::hours(24);
    }
    allowance
}

/// `true` when the time since `since`, less the allowance, is longer than `stale_hours`.
/// Compared at full precision: 24h50m is past a 24h threshold.
pub fn is_stale(
    now: DateTime<Utc>,
    since: DateTime<Utc>,
    allowance: Duration,
    stale_hours: u32,
) -> bool {
    now - since - allowance > Duration::hours(i64::from(stale_hours))
}
