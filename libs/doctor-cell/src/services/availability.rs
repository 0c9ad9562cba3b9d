// libs/doctor-cell/src/services/availability.rs

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use shared_utils::clock::Clock;
use shared_utils::time::{overlaps, slot_grid, time_from_minutes, widen};

use crate::models::{AvailableSlot, BookedInterval, ScheduleRule};

/// Margin added on both sides of a requested (not grid-generated) interval
/// before it is tested against existing bookings. Absorbs clock rounding and
/// back-to-back scheduling.
pub const REQUEST_CONFLICT_MARGIN_MINUTES: i64 = 59;

/// Turns a resolved rule and the day's bookings into concrete slots.
pub struct AvailabilityCalculator {
    clock: Arc<dyn Clock>,
}

impl AvailabilityCalculator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Every grid slot of `date` under `rule`, flagged when an existing
    /// booking overlaps it. Slots touching the break window are dropped.
    /// Slots last `requested_duration` minutes when given, otherwise the
    /// rule's `slot_duration`; the grid always advances by
    /// `slot_duration + buffer_time`.
    pub fn compute_day(
        &self,
        rule: Option<&ScheduleRule>,
        existing: &[BookedInterval],
        date: NaiveDate,
        requested_duration: Option<u32>,
    ) -> Vec<AvailableSlot> {
        let rule = match rule {
            Some(rule) if rule.is_available => rule,
            Some(rule) => {
                debug!("Rule {} is a blackout for {}", rule.id, date);
                return Vec::new();
            }
            None => return Vec::new(),
        };

        let slot_len = requested_duration
            .filter(|minutes| *minutes > 0)
            .unwrap_or(rule.slot_duration);

        let mut slots: Vec<AvailableSlot> = rule
            .time_slots
            .iter()
            .flat_map(|window| {
                slot_grid(window.start_minute(), window.end_minute(), slot_len, rule.step_minutes())
            })
            .filter(|(start, end)| {
                rule.break_window
                    .as_ref()
                    .map_or(true, |pause| !pause.overlaps(*start, *end))
            })
            .filter_map(|(start, end)| {
                let start_time = time_from_minutes(start)?;
                let end_time = time_from_minutes(end)?;
                let start_at = self.clock.instant_at(date, start_time);
                let end_at = self.clock.instant_at(date, end_time);

                let is_booked = existing
                    .iter()
                    .any(|booked| overlaps(start_at, end_at, booked.start_at, booked.end_at));

                Some(AvailableSlot { start_time, end_time, is_booked })
            })
            .collect();

        slots.sort_by_key(|slot| (slot.start_time, slot.end_time));
        slots.dedup_by_key(|slot| (slot.start_time, slot.end_time));

        debug!(
            "Computed {} slots ({} booked) for rule {} on {}",
            slots.len(),
            slots.iter().filter(|slot| slot.is_booked).count(),
            rule.id,
            date
        );

        slots
    }

    /// Only the slots a booking caller may offer.
    pub fn available_slots(
        &self,
        rule: Option<&ScheduleRule>,
        existing: &[BookedInterval],
        date: NaiveDate,
        requested_duration: Option<u32>,
    ) -> Vec<AvailableSlot> {
        self.compute_day(rule, existing, date, requested_duration)
            .into_iter()
            .filter(|slot| !slot.is_booked)
            .collect()
    }
}

/// Bookings that collide with a requested interval once it is widened by
/// [`REQUEST_CONFLICT_MARGIN_MINUTES`] on both sides.
pub fn request_conflicts<'a>(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    existing: &'a [BookedInterval],
) -> Vec<&'a BookedInterval> {
    let (wide_start, wide_end) = widen(start_at, end_at, REQUEST_CONFLICT_MARGIN_MINUTES);
    existing
        .iter()
        .filter(|booked| overlaps(wide_start, wide_end, booked.start_at, booked.end_at))
        .collect()
}
