//! Interval arithmetic shared by the availability calculator and the
//! booking engine. Times of day are handled as minutes since midnight.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

pub fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    if minutes >= MINUTES_PER_DAY {
        return None;
    }
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Half-open intervals `[a_start, a_end)` and `[b_start, b_end)` overlap iff
/// `a_start < b_end && b_start < a_end`. Touching intervals do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// `[start, end)` widened by `margin_minutes` on both sides.
pub fn widen(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    margin_minutes: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let margin = Duration::minutes(margin_minutes);
    (start - margin, end + margin)
}

/// Candidate slots of `slot_len` minutes inside `[window_start, window_end)`,
/// starting at `window_start` and advancing by `step` minutes. A slot ending
/// exactly at `window_end` is included.
pub fn slot_grid(window_start: u32, window_end: u32, slot_len: u32, step: u32) -> Vec<(u32, u32)> {
    let mut slots = Vec::new();
    if slot_len == 0 || step == 0 {
        return slots;
    }

    let mut start = window_start;
    while start + slot_len <= window_end {
        slots.push((start, start + slot_len));
        start += step;
    }

    slots
}
