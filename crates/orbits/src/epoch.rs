//! Conversions between `DateTime<Utc>` epochs and floating-point second offsets.

use chrono::{DateTime, TimeDelta, Utc};

/// Seconds elapsed from `from` to `to` (negative when `to` precedes `from`).
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta.num_seconds() as f64 + delta.subsec_nanos() as f64 * 1e-9
}

/// `epoch` shifted by `seconds`, rounded to the nearest microsecond.
pub fn offset(epoch: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    epoch + TimeDelta::microseconds((seconds * 1e6).round() as i64)
}

/// Julian date of an epoch (UTC, leap seconds ignored).
pub fn julian_date(epoch: DateTime<Utc>) -> f64 {
    let unix = epoch.timestamp() as f64 + epoch.timestamp_subsec_nanos() as f64 * 1e-9;
    unix / msim_core::constants::SECONDS_PER_DAY + 2_440_587.5
}
