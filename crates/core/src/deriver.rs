use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{DerivedMetrics, DurationUnit, TimestampPolicy, WebhookPayload};

const SECONDS_PER_HOUR: i64 = 3_600;
const HOURS_PER_DAY: i64 = 24;
/// Largest span a nanosecond-resolution `i64` duration can hold.
const MAX_ELAPSED_SECONDS: i64 = i64::MAX / 1_000_000_000;
const MAX_ELAPSED_HOURS: i64 = MAX_ELAPSED_SECONDS / SECONDS_PER_HOUR;
/// 0001-01-01T00:00:00Z, the zero instant substituted for unparseable timestamps.
const ZERO_INSTANT_SECONDS: i64 = -62_135_596_800;

/// Errors raised while deriving metrics from a decoded payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeriveError {
    #[error("pull request has not been closed")]
    NotClosed,
    #[error("invalid timestamp for field '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Turns closed pull requests into [`DerivedMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricDeriver {
    unit: DurationUnit,
    policy: TimestampPolicy,
}

impl MetricDeriver {
    pub fn new(unit: DurationUnit, policy: TimestampPolicy) -> Self {
        Self { unit, policy }
    }

    /// Computes the duration, size and file count of a closed pull request.
    ///
    /// Callers are expected to check [`WebhookPayload::is_closed`] first; a
    /// payload without `closed_at` yields [`DeriveError::NotClosed`].
    pub fn derive(&self, payload: &WebhookPayload) -> Result<DerivedMetrics, DeriveError> {
        let closed_at = payload.closed_at.as_deref().ok_or(DeriveError::NotClosed)?;

        let created = self.parse_timestamp("created_at", &payload.created_at)?;
        let closed = self.parse_timestamp("closed_at", closed_at)?;
        let duration = elapsed_in(self.unit, created, closed);
        let size = payload.additions.saturating_add(payload.deletions);

        debug!(
            stage = "derive",
            repo = %payload.repository_name,
            duration,
            unit = self.unit.as_str(),
            size,
            changed_files = payload.changed_files,
            "derived pull request metrics"
        );

        Ok(DerivedMetrics {
            count: 1,
            duration,
            unit: self.unit,
            size,
            changed_files: payload.changed_files,
            dimension: payload.repository_name.clone(),
        })
    }

    fn parse_timestamp(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<DateTime<Utc>, DeriveError> {
        match DateTime::parse_from_rfc3339(value) {
            Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
            Err(err) => match self.policy {
                TimestampPolicy::Lenient => {
                    warn!(
                        stage = "derive",
                        field,
                        value,
                        error = %err,
                        "unparseable timestamp, using zero instant"
                    );
                    Ok(zero_instant())
                }
                TimestampPolicy::Strict => Err(DeriveError::InvalidTimestamp {
                    field,
                    value: value.to_string(),
                }),
            },
        }
    }
}

fn zero_instant() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_INSTANT_SECONDS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Elapsed time between `created` and `closed` in `unit`, never below 1.
///
/// The span saturates at [`MAX_ELAPSED_SECONDS`] in either direction, and
/// rounded hours never exceed the whole hours that span holds.
fn elapsed_in(unit: DurationUnit, created: DateTime<Utc>, closed: DateTime<Utc>) -> u64 {
    let seconds = closed
        .signed_duration_since(created)
        .num_seconds()
        .clamp(-MAX_ELAPSED_SECONDS, MAX_ELAPSED_SECONDS);
    let hours = round_to_hours(seconds).clamp(-MAX_ELAPSED_HOURS, MAX_ELAPSED_HOURS);
    match unit {
        DurationUnit::Seconds => at_least_one(seconds),
        DurationUnit::Hours => at_least_one(hours),
        DurationUnit::Days => {
            let hours = hours.max(1);
            at_least_one(hours / HOURS_PER_DAY)
        }
    }
}

/// Rounds to the nearest whole hour, halves away from zero.
fn round_to_hours(seconds: i64) -> i64 {
    let half = SECONDS_PER_HOUR / 2;
    if seconds >= 0 {
        seconds.saturating_add(half) / SECONDS_PER_HOUR
    } else {
        -(seconds.saturating_neg().saturating_add(half) / SECONDS_PER_HOUR)
    }
}

fn at_least_one(value: i64) -> u64 {
    value.max(1) as u64
}
