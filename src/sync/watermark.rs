// ABOUTME: Chooses the lower date bound for each item's transaction fetch
// ABOUTME: Explicit start date, else earliest of snapshot and item update dates, else yesterday

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Resolve the fetch watermark for one item.
///
/// An explicit start date is returned as-is. Otherwise the earlier of the
/// last snapshot date and the item's last update date is used, falling back
/// to yesterday. A computed watermark is never today or later: it is pushed
/// back to yesterday so the current day is always re-read in full next run.
pub fn resolve(
    explicit: Option<NaiveDate>,
    last_snapshot_date: Option<NaiveDate>,
    account_updated_at: Option<NaiveDate>,
    today: NaiveDate,
) -> NaiveDate {
    if let Some(explicit) = explicit {
        return explicit;
    }

    let yesterday = yesterday(today);
    let computed = match (last_snapshot_date, account_updated_at) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => yesterday,
    };

    if computed >= today {
        yesterday
    } else {
        computed
    }
}

/// Calendar date of `now` in the reference timezone.
pub fn today_in(offset: FixedOffset, now: DateTime<Utc>) -> NaiveDate {
    local_date(offset, now)
}

/// Calendar date of an instant in the reference timezone.
pub fn local_date(offset: FixedOffset, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

fn yesterday(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}
