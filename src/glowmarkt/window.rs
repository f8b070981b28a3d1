//! Daily reporting window computation
//!
//! A window runs from local midnight to "now" truncated to the minute. Shortly
//! after midnight the upstream data for the new day is not finalised, so up to
//! the cutoff the previous day is reported instead, ending at 23:59:59.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

const QUERY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Local-time interval plus the offset the readings endpoint expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyWindow {
    /// Local calendar day the window covers
    pub date: NaiveDate,
    /// Local midnight
    pub from: NaiveDateTime,
    /// Inclusive end, local time
    pub to: NaiveDateTime,
    /// Minutes to add to local time to reach UTC, evaluated at `from`
    pub offset_minutes: i32,
}

impl DailyWindow {
    /// Window for the given instant in `tz`
    pub fn for_instant(now: DateTime<Utc>, tz: Tz, cutoff: NaiveTime) -> Self {
        let local_now = now.with_timezone(&tz).naive_local();

        let (date, to) = if local_now.time() <= cutoff {
            let date = local_now.date() - Duration::days(1);
            (date, date.and_time(end_of_day()))
        } else {
            (local_now.date(), truncate_to_minute(local_now))
        };

        let from = date.and_time(NaiveTime::MIN);
        Self {
            date,
            from,
            to,
            offset_minutes: offset_minutes_at(tz, from, now),
        }
    }

    /// `from` formatted for the query string
    pub fn from_param(&self) -> String {
        self.from.format(QUERY_FORMAT).to_string()
    }

    /// `to` formatted for the query string
    pub fn to_param(&self) -> String {
        self.to.format(QUERY_FORMAT).to_string()
    }

    /// True when the window covers the previous local day
    pub fn is_yesterday(&self) -> bool {
        self.to.time() == end_of_day()
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

// Negated UTC offset of `tz` at the local instant `at`. Midnight never falls
// in a gap for the zones we care about; if it does, the offset at `fallback`
// is used.
fn offset_minutes_at(tz: Tz, at: NaiveDateTime, fallback: DateTime<Utc>) -> i32 {
    let seconds = match tz.from_local_datetime(&at).earliest() {
        Some(dt) => dt.offset().fix().local_minus_utc(),
        None => fallback.with_timezone(&tz).offset().fix().local_minus_utc(),
    };
    -(seconds / 60)
}
