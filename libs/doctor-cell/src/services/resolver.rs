// libs/doctor-cell/src/services/resolver.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::models::{ScheduleError, ScheduleRule};
use crate::services::store::ScheduleRuleStore;

/// Picks the single rule governing a doctor's calendar date.
pub struct RuleResolver {
    store: Arc<dyn ScheduleRuleStore>,
}

impl RuleResolver {
    pub fn new(store: Arc<dyn ScheduleRuleStore>) -> Self {
        Self { store }
    }

    /// `None` means the doctor declared nothing for that date and is
    /// unavailable; no default hours are assumed.
    pub async fn resolve(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<ScheduleRule>, ScheduleError> {
        let rules = self.store.active_rules_for(doctor_id).await?;
        let selected = select_rule(&rules, date).cloned();

        match &selected {
            Some(rule) => debug!(
                "Rule {} ({}, priority {}) governs doctor {} on {}",
                rule.id, rule.kind, rule.priority, doctor_id, date
            ),
            None => debug!("No schedule rule for doctor {} on {}", doctor_id, date),
        }

        Ok(selected)
    }
}

/// Among active rules matching `date`, the one with the smallest priority
/// number; ties go to the stronger rule kind, then to the lowest id.
pub fn select_rule(rules: &[ScheduleRule], date: NaiveDate) -> Option<&ScheduleRule> {
    rules
        .iter()
        .filter(|rule| rule.applies_to(date))
        .min_by_key(|rule| (rule.priority, rule.kind.rank(), rule.id))
}
