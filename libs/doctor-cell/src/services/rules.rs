// libs/doctor-cell/src/services/rules.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_utils::clock::Clock;

use crate::models::{
    CreateScheduleRuleRequest, RuleKind, ScheduleError, ScheduleRule, TimeWindow,
    UpdateScheduleRuleRequest,
};
use crate::services::store::ScheduleRuleStore;

pub struct ScheduleRuleService {
    store: Arc<dyn ScheduleRuleStore>,
    clock: Arc<dyn Clock>,
}

impl ScheduleRuleService {
    pub fn new(store: Arc<dyn ScheduleRuleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a schedule rule for a doctor
    pub async fn create_rule(
        &self,
        request: CreateScheduleRuleRequest,
    ) -> Result<ScheduleRule, ScheduleError> {
        debug!("Creating {} rule for doctor {}", request.kind, request.doctor_id);

        let now = self.clock.now();
        let priority = request.priority.unwrap_or_else(|| request.kind.default_priority());

        let mut rule = ScheduleRule {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            kind: request.kind,
            is_available: request.is_available,
            time_slots: request.time_slots,
            break_window: request.break_window,
            slot_duration: request.slot_duration,
            buffer_time: request.buffer_time.unwrap_or(0),
            max_appointments: request.max_appointments.unwrap_or(0),
            priority,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        normalize_windows(&mut rule.time_slots);
        validate_rule(&rule)?;

        let stored = self.store.insert(rule).await?;
        info!("Schedule rule {} created for doctor {}", stored.id, stored.doctor_id);
        Ok(stored)
    }

    /// Update an existing rule; the merged record is validated as a whole.
    pub async fn update_rule(
        &self,
        rule_id: Uuid,
        request: UpdateScheduleRuleRequest,
    ) -> Result<ScheduleRule, ScheduleError> {
        debug!("Updating schedule rule {}", rule_id);

        let mut rule = self.get_rule(rule_id).await?;

        if let Some(kind) = request.kind {
            rule.kind = kind;
        }
        if let Some(is_available) = request.is_available {
            rule.is_available = is_available;
        }
        if let Some(time_slots) = request.time_slots {
            rule.time_slots = time_slots;
        }
        if let Some(break_window) = request.break_window {
            rule.break_window = break_window;
        }
        if let Some(slot_duration) = request.slot_duration {
            rule.slot_duration = slot_duration;
        }
        if let Some(buffer_time) = request.buffer_time {
            rule.buffer_time = buffer_time;
        }
        if let Some(max_appointments) = request.max_appointments {
            rule.max_appointments = max_appointments;
        }
        if let Some(priority) = request.priority {
            rule.priority = priority;
        }
        if let Some(is_active) = request.is_active {
            rule.is_active = is_active;
        }
        rule.updated_at = self.clock.now();

        normalize_windows(&mut rule.time_slots);
        validate_rule(&rule)?;

        let updated = self.store.update(rule).await?;
        info!("Schedule rule {} updated", rule_id);
        Ok(updated)
    }

    /// Soft-delete: the rule stays stored but is never matched again.
    pub async fn deactivate_rule(&self, rule_id: Uuid) -> Result<ScheduleRule, ScheduleError> {
        let mut rule = self.get_rule(rule_id).await?;
        if !rule.is_active {
            return Ok(rule);
        }

        rule.is_active = false;
        rule.updated_at = self.clock.now();

        let updated = self.store.update(rule).await?;
        info!("Schedule rule {} deactivated", rule_id);
        Ok(updated)
    }

    pub async fn get_rule(&self, rule_id: Uuid) -> Result<ScheduleRule, ScheduleError> {
        self.store
            .get(rule_id)
            .await?
            .ok_or(ScheduleError::NotFound(rule_id))
    }

    pub async fn list_rules(
        &self,
        doctor_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ScheduleRule>, ScheduleError> {
        self.store.rules_for_doctor(doctor_id, include_inactive).await
    }
}

fn normalize_windows(windows: &mut [TimeWindow]) {
    windows.sort_by_key(|window| (window.start_time, window.end_time));
}

/// Write-time validation of a complete rule record.
pub fn validate_rule(rule: &ScheduleRule) -> Result<(), ScheduleError> {
    let invalid = |message: String| {
        warn!("Rejected schedule rule {}: {}", rule.id, message);
        Err(ScheduleError::InvalidRule(message))
    };

    match &rule.kind {
        RuleKind::WeeklyRecurring { day_of_week } if *day_of_week > 6 => {
            return invalid(format!(
                "day_of_week must be between 0 (Sunday) and 6 (Saturday), got {}",
                day_of_week
            ));
        }
        RuleKind::MonthlyRecurring { day_of_month } if !(1..=31).contains(day_of_month) => {
            return invalid(format!("day_of_month must be between 1 and 31, got {}", day_of_month));
        }
        RuleKind::Exception { start_date, end_date: Some(end_date) } if end_date < start_date => {
            return invalid(format!("end_date {} is before start_date {}", end_date, start_date));
        }
        _ => {}
    }

    if rule.slot_duration == 0 {
        return invalid("slot_duration must be greater than zero".to_string());
    }

    if rule.priority == 0 {
        return invalid("priority must be 1 or greater".to_string());
    }

    if rule.is_available && rule.time_slots.is_empty() {
        return invalid("an available rule needs at least one time slot".to_string());
    }

    for window in &rule.time_slots {
        if window.start_time >= window.end_time {
            return invalid(format!(
                "time slot start {} must be before end {}",
                window.start_time, window.end_time
            ));
        }
    }

    for pair in rule.time_slots.windows(2) {
        if pair[0].end_time > pair[1].start_time {
            return invalid(format!(
                "time slots {}-{} and {}-{} overlap",
                pair[0].start_time, pair[0].end_time, pair[1].start_time, pair[1].end_time
            ));
        }
    }

    if let Some(pause) = &rule.break_window {
        if pause.start_time >= pause.end_time {
            return invalid(format!(
                "break start {} must be before end {}",
                pause.start_time, pause.end_time
            ));
        }
    }

    Ok(())
}
