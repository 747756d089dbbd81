//! Schedule window computation and late-delay skipping (C2).

use crate::cron::CronSpec;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;

/// The `(date, next, previous)` triple for one firing (spec.md §3
/// `ScheduleOutput`). All three, when present, satisfy
/// `previous < date <= next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutput {
    pub date: DateTime<Tz>,
    pub next: DateTime<Tz>,
    pub previous: Option<DateTime<Tz>>,
}

/// Computes the schedule window anchored just after `cursor`.
///
/// `date = nextAfter(spec, cursor - 1s)`; `next = nextAfter(spec, date)`;
/// `previous = lastBefore(spec, cursor)`. Returns `None` if the spec has
/// no fire strictly after `cursor - 1s` (spec.md §4.2).
#[must_use]
pub fn schedule_dates(spec: &CronSpec, cursor: DateTime<Tz>) -> Option<ScheduleOutput> {
    let date = spec.next_after(cursor - Duration::seconds(1))?;
    let next = spec.next_after(date)?;
    let previous = spec.last_before(cursor);

    Some(ScheduleOutput {
        date,
        next,
        previous,
    })
}

/// Skips forward through late fires: while `output.date + late_max < now`,
/// re-anchors at `output.next` and recomputes. Returns `None` if skipping
/// walks past the end of the schedule (spec.md §4.2).
#[must_use]
pub fn apply_late_delay(
    spec: &CronSpec,
    mut output: ScheduleOutput,
    late_max: Duration,
    now: DateTime<Tz>,
) -> Option<ScheduleOutput> {
    while output.date + late_max < now {
        output = schedule_dates(spec, output.next)?;
    }
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> Tz {
        chrono_tz::UTC
    }

    #[test]
    fn window_orders_previous_date_next() {
        let spec = CronSpec::new("*/15 * * * *", false, utc()).unwrap();
        let cursor = utc().with_ymd_and_hms(2024, 1, 1, 0, 7, 0).unwrap();
        let output = schedule_dates(&spec, cursor).unwrap();

        assert_eq!(output.date, utc().with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap());
        assert_eq!(output.next, utc().with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap());
        assert_eq!(
            output.previous,
            Some(utc().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn late_delay_skips_past_stale_fires() {
        // S3: hourly cron, lateMaximumDelay=10m, last=T00:00, now=T02:05
        // should skip T01:00 (late by 65m) and land on T02:00.
        let spec = CronSpec::new("0 * * * *", false, utc()).unwrap();
        let last = utc().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = utc().with_ymd_and_hms(2024, 1, 1, 2, 5, 0).unwrap();
        let initial = schedule_dates(&spec, last).unwrap();

        let output = apply_late_delay(&spec, initial, Duration::minutes(10), now).unwrap();
        assert_eq!(output.date, utc().with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap());
    }
}
