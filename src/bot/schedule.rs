use chrono::{DateTime, Duration, Utc};

/// Next wall-clock multiple of `interval_secs` strictly after `now`
///
/// Boundaries are aligned to the Unix epoch, so a 5 minute interval wakes at
/// :00, :05, :10 and so on regardless of when the previous tick finished.
pub fn next_candle_boundary(now: DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    let interval = interval_secs.max(1) as i64;
    let current = now.timestamp().div_euclid(interval) * interval;
    DateTime::from_timestamp(current + interval, 0).unwrap_or(now)
}

/// How long to wait from `now` until the next boundary
pub fn time_until_next_boundary(now: DateTime<Utc>, interval_secs: u64) -> std::time::Duration {
    (next_candle_boundary(now, interval_secs) - now)
        .max(Duration::zero())
        .to_std()
        .unwrap_or_default()
}
