//! Cron expression parsing and next/previous fire computation (C1).

use crate::error::ScheduleError;
use chrono::DateTime;
use chrono_tz::Tz;
use cron::Schedule;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Expands the Unix crontab nicknames into their 5-field equivalents.
/// Anything else passes through unchanged.
fn expand_nickname(expression: &str) -> &str {
    match expression.trim() {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        other => other,
    }
}

/// Pads a user-facing cron expression out to the 7-field form the `cron`
/// crate expects (seconds ... year).
fn to_seven_field(expression: &str, with_seconds: bool) -> String {
    let normalized = expand_nickname(expression);
    if with_seconds {
        format!("{normalized} *")
    } else {
        format!("0 {normalized} *")
    }
}

/// An immutable, validated cron expression bound to a timezone
/// (spec.md §3 `CronSpec`).
///
/// The compiled `cron::Schedule` is computed once at construction, per
/// the re-architecture hint in spec.md §9: no lazily-initialized shared
/// cache to guard.
///
/// `cron::Schedule` has no serde support of its own, so `Serialize`/
/// `Deserialize` are hand-written below (`cron_spec_serde`), storing only
/// `expression`/`with_seconds`/`timezone` and rebuilding `schedule` via
/// `CronSpec::new` on deserialize — the same "store the source fields,
/// rebuild the derived one" shape as the teacher's `graph_serde` module.
#[derive(Debug, Clone)]
pub struct CronSpec {
    expression: String,
    with_seconds: bool,
    timezone: Tz,
    schedule: Schedule,
}

impl Serialize for CronSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        cron_spec_serde::CronSpecFields {
            expression: self.expression.clone(),
            with_seconds: self.with_seconds,
            timezone: self.timezone.name().to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CronSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = cron_spec_serde::CronSpecFields::deserialize(deserializer)?;
        let timezone = fields
            .timezone
            .parse::<Tz>()
            .map_err(|_| D::Error::custom(format!("invalid timezone: {}", fields.timezone)))?;
        CronSpec::new(fields.expression, fields.with_seconds, timezone).map_err(D::Error::custom)
    }
}

mod cron_spec_serde {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    pub(super) struct CronSpecFields {
        pub(super) expression: String,
        pub(super) with_seconds: bool,
        pub(super) timezone: String,
    }
}

impl CronSpec {
    /// Parses and validates a cron expression, returning a ready-to-use
    /// spec or `InvalidCronExpression` if it does not parse under the
    /// chosen field arity.
    pub fn new(
        expression: impl Into<String>,
        with_seconds: bool,
        timezone: Tz,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let padded = to_seven_field(&expression, with_seconds);
        let schedule =
            Schedule::from_str(&padded).map_err(|e| ScheduleError::InvalidCronExpression {
                expression: expression.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expression,
            with_seconds,
            timezone,
            schedule,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    #[must_use]
    pub fn with_seconds(&self) -> bool {
        self.with_seconds
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The smallest fire instant strictly greater than `instant`.
    #[must_use]
    pub fn next_after(&self, instant: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(&instant).next()
    }

    /// The largest fire instant less than or equal to `instant`.
    ///
    /// The `cron` crate only iterates forward, so this walks backward by
    /// an exponentially growing window — 1 day, then 1 week, 1 year, 10
    /// years — taking the last fire strictly before `instant` found in
    /// the first window that yields one. Bounded at 10 years to match
    /// the search horizon used elsewhere in this crate.
    #[must_use]
    pub fn last_before(&self, instant: DateTime<Tz>) -> Option<DateTime<Tz>> {
        const WINDOWS_DAYS: [i64; 4] = [1, 7, 366, 3653];

        for days in WINDOWS_DAYS {
            let anchor = instant - chrono::Duration::days(days);
            let candidate = self
                .schedule
                .after(&anchor)
                .take_while(|fire| *fire < instant)
                .last();
            if candidate.is_some() {
                return candidate;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> Tz {
        chrono_tz::UTC
    }

    #[test]
    fn rejects_malformed_expression() {
        let err = CronSpec::new("not a cron", false, utc()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCronExpression { .. }));
    }

    #[test]
    fn every_fifteen_minutes_basic() {
        let spec = CronSpec::new("*/15 * * * *", false, utc()).unwrap();
        let now = utc().with_ymd_and_hms(2024, 1, 1, 0, 7, 0).unwrap();
        let next = spec.next_after(now).unwrap();
        assert_eq!(next, utc().with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap());
    }

    #[test]
    fn nickname_hourly_expands() {
        let spec = CronSpec::new("@hourly", false, utc()).unwrap();
        let now = utc().with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let next = spec.next_after(now).unwrap();
        assert_eq!(next, utc().with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn last_before_finds_prior_fire() {
        let spec = CronSpec::new("0 * * * *", false, utc()).unwrap();
        let now = utc().with_ymd_and_hms(2024, 1, 1, 2, 5, 0).unwrap();
        let prev = spec.last_before(now).unwrap();
        assert_eq!(prev, utc().with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn serde_roundtrip_preserves_evaluation_behavior() {
        let spec = CronSpec::new("*/15 * * * *", false, chrono_tz::America::New_York).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let restored: CronSpec = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.expression(), spec.expression());
        assert_eq!(restored.with_seconds(), spec.with_seconds());
        assert_eq!(restored.timezone(), spec.timezone());

        let now = utc().with_ymd_and_hms(2024, 1, 1, 0, 7, 0).unwrap();
        assert_eq!(
            restored.next_after(now.with_timezone(&restored.timezone())),
            spec.next_after(now.with_timezone(&spec.timezone()))
        );
    }

    #[test]
    fn deserialize_rejects_malformed_expression() {
        let json = r#"{"expression":"not a cron","with_seconds":false,"timezone":"UTC"}"#;
        let result: Result<CronSpec, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn with_seconds_field_respected() {
        let spec = CronSpec::new("30 * * * * *", true, utc()).unwrap();
        let now = utc().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = spec.next_after(now).unwrap();
        assert_eq!(next, utc().with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap());
    }

    /// S2 — DST spring-forward: the 2024-03-10 fire is skipped because
    /// 02:30 local does not exist that day, so the next fire lands on
    /// 2024-03-11 instead.
    #[test]
    fn s2_dst_spring_forward_skips_nonexistent_local_time() {
        let ny = chrono_tz::America::New_York;
        let spec = CronSpec::new("30 2 * * *", false, ny).unwrap();
        let last = ny.with_ymd_and_hms(2024, 3, 9, 2, 30, 0).unwrap();

        let next = spec.next_after(last).unwrap();

        assert_eq!(next, ny.with_ymd_and_hms(2024, 3, 11, 2, 30, 0).unwrap());
        assert_eq!(next.format("%z").to_string(), "-0400");
    }
}
