//! Epoch time projection
//!
//! Sui epochs have a fixed duration, so the start and end of any epoch can be
//! projected from the start time of the current one.

use chrono::{DateTime, Datelike, Days, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Current epoch as reported by the Sui system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochData {
    pub epoch_number: u64,
    pub duration_ms: u64,
    pub start_time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpochTimes {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Start and end of `target_epoch`, which may be in the past or the future.
pub fn get_epoch_times(target_epoch: u64, current: &EpochData) -> EpochTimes {
    let epoch_diff = target_epoch as i64 - current.epoch_number as i64;
    let duration_ms = current.duration_ms as i64;

    let start_ms = current
        .start_time_ms
        .saturating_add(epoch_diff.saturating_mul(duration_ms));
    let end_ms = start_ms.saturating_add(duration_ms);

    EpochTimes {
        start: utc_from_millis(start_ms),
        end: utc_from_millis(end_ms),
    }
}

fn utc_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(if ms < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Human-friendly time relative to `now`, e.g. `today at 14:05`,
/// `Thu at 09:00` or `Apr 3 at 18:30`. Both times are rendered in their own
/// timezone, so pass them in the same one.
pub fn format_epoch_time<Tz: TimeZone>(date: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    let hm = date.format("%H:%M");
    let day = date.date_naive();
    let today = now.date_naive();

    if Some(day) == today.checked_add_days(Days::new(1)) {
        format!("tomorrow at {}", hm)
    } else if day == today {
        format!("today at {}", hm)
    } else if Some(day) == today.checked_sub_days(Days::new(1)) {
        format!("yesterday at {}", hm)
    } else if day > today && Some(day) < today.checked_add_days(Days::new(7)) {
        format!("{} at {}", date.format("%a"), hm)
    } else {
        format!("{} {} at {}", date.format("%b"), date.day(), hm)
    }
}

pub fn format_epoch_period<Tz: TimeZone>(
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> String
where
    Tz::Offset: Display,
{
    format!(
        "{} - {}",
        format_epoch_time(start, now),
        format_epoch_time(end, now)
    )
}

/// [`format_epoch_period`] in the machine's local timezone.
pub fn format_local_period(times: &EpochTimes) -> String {
    format_epoch_period(
        &times.start.with_timezone(&Local),
        &times.end.with_timezone(&Local),
        &Local::now(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    fn current() -> EpochData {
        EpochData {
            epoch_number: 400,
            duration_ms: DAY_MS,
            // 2024-05-02 (Thursday) 18:00:00 UTC
            start_time_ms: 1_714_672_800_000,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_current_epoch_times() {
        let times = get_epoch_times(400, &current());
        assert_eq!(times.start, utc(2024, 5, 2, 18, 0));
        assert_eq!(times.end, utc(2024, 5, 3, 18, 0));
    }

    #[test]
    fn test_past_and_future_epochs() {
        let past = get_epoch_times(398, &current());
        assert_eq!(past.start, utc(2024, 4, 30, 18, 0));
        assert_eq!(past.end, utc(2024, 5, 1, 18, 0));

        let future = get_epoch_times(403, &current());
        assert_eq!(future.start, utc(2024, 5, 5, 18, 0));
    }

    #[test]
    fn test_format_relative_days() {
        let now = utc(2024, 5, 2, 12, 0);

        assert_eq!(format_epoch_time(&utc(2024, 5, 2, 18, 0), &now), "today at 18:00");
        assert_eq!(format_epoch_time(&utc(2024, 5, 3, 9, 5), &now), "tomorrow at 09:05");
        assert_eq!(format_epoch_time(&utc(2024, 5, 1, 23, 59), &now), "yesterday at 23:59");
    }

    #[test]
    fn test_format_within_week_uses_weekday() {
        let now = utc(2024, 5, 2, 12, 0);

        assert_eq!(format_epoch_time(&utc(2024, 5, 4, 18, 0), &now), "Sat at 18:00");
        assert_eq!(format_epoch_time(&utc(2024, 5, 8, 18, 0), &now), "Wed at 18:00");
    }

    #[test]
    fn test_format_far_dates_use_month_and_day() {
        let now = utc(2024, 5, 2, 12, 0);

        assert_eq!(format_epoch_time(&utc(2024, 5, 9, 18, 0), &now), "May 9 at 18:00");
        assert_eq!(format_epoch_time(&utc(2024, 4, 28, 7, 30), &now), "Apr 28 at 07:30");
    }

    #[test]
    fn test_format_period() {
        let now = utc(2024, 5, 2, 12, 0);
        let times = get_epoch_times(400, &current());

        assert_eq!(
            format_epoch_period(&times.start, &times.end, &now),
            "today at 18:00 - tomorrow at 18:00"
        );
    }
}
