use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use std::fmt;

use shared_utils::time::{minutes_since_midnight, overlaps};

// ==============================================================================
// SCHEDULE RULES
// ==============================================================================

/// One window of the day during which a doctor sees patients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TimeWindow {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self { start_time, end_time, label: None }
    }

    pub fn start_minute(&self) -> u32 {
        minutes_since_midnight(self.start_time)
    }

    pub fn end_minute(&self) -> u32 {
        minutes_since_midnight(self.end_time)
    }

    pub fn contains(&self, start_minute: u32, end_minute: u32) -> bool {
        self.start_minute() <= start_minute && end_minute <= self.end_minute()
    }

    pub fn overlaps(&self, start_minute: u32, end_minute: u32) -> bool {
        overlaps(self.start_minute(), self.end_minute(), start_minute, end_minute)
    }
}

/// How a rule decides which calendar dates it governs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    SpecificDate {
        start_date: NaiveDate,
    },
    /// `day_of_week` counts from Sunday = 0.
    WeeklyRecurring {
        day_of_week: u8,
    },
    MonthlyRecurring {
        day_of_month: u8,
    },
    /// Blackout or vacation override. Covers the closed range
    /// `[start_date, end_date]`, or only `start_date` without an end.
    Exception {
        start_date: NaiveDate,
        #[serde(default)]
        end_date: Option<NaiveDate>,
    },
}

impl RuleKind {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self {
            RuleKind::SpecificDate { start_date } => date == *start_date,
            RuleKind::WeeklyRecurring { day_of_week } => {
                date.weekday().num_days_from_sunday() == u32::from(*day_of_week)
            }
            RuleKind::MonthlyRecurring { day_of_month } => date.day() == u32::from(*day_of_month),
            RuleKind::Exception { start_date, end_date: Some(end_date) } => {
                *start_date <= date && date <= *end_date
            }
            RuleKind::Exception { start_date, end_date: None } => date == *start_date,
        }
    }

    /// Secondary ordering among rules of equal priority: lower ranks win.
    pub fn rank(&self) -> u8 {
        match self {
            RuleKind::Exception { .. } => 0,
            RuleKind::SpecificDate { .. } => 1,
            RuleKind::MonthlyRecurring { .. } => 2,
            RuleKind::WeeklyRecurring { .. } => 3,
        }
    }

    /// Priority assigned when the author does not choose one. Exceptions
    /// default to the top so that blackouts override regular hours.
    pub fn default_priority(&self) -> u32 {
        u32::from(self.rank()) + 1
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::SpecificDate { .. } => write!(f, "specific_date"),
            RuleKind::WeeklyRecurring { .. } => write!(f, "weekly_recurring"),
            RuleKind::MonthlyRecurring { .. } => write!(f, "monthly_recurring"),
            RuleKind::Exception { .. } => write!(f, "exception"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleRule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub is_available: bool,
    #[serde(default)]
    pub time_slots: Vec<TimeWindow>,
    #[serde(default)]
    pub break_window: Option<TimeWindow>,
    pub slot_duration: u32,
    #[serde(default)]
    pub buffer_time: u32,
    /// Zero means no daily cap.
    #[serde(default)]
    pub max_appointments: u32,
    pub priority: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleRule {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.is_active && self.kind.applies_to(date)
    }

    /// Whether `[start_minute, end_minute)` lies inside one declared window
    /// and clear of the break. Blackout rules cover nothing.
    pub fn covers(&self, start_minute: u32, end_minute: u32) -> bool {
        if !self.is_available || start_minute >= end_minute {
            return false;
        }

        if let Some(pause) = &self.break_window {
            if pause.overlaps(start_minute, end_minute) {
                return false;
            }
        }

        self.time_slots
            .iter()
            .any(|window| window.contains(start_minute, end_minute))
    }

    pub fn has_daily_cap(&self) -> bool {
        self.max_appointments > 0
    }

    pub fn step_minutes(&self) -> u32 {
        self.slot_duration + self.buffer_time
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRuleRequest {
    pub doctor_id: Uuid,
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub time_slots: Vec<TimeWindow>,
    pub break_window: Option<TimeWindow>,
    pub slot_duration: u32,
    pub buffer_time: Option<u32>,
    pub max_appointments: Option<u32>,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRuleRequest {
    pub kind: Option<RuleKind>,
    pub is_available: Option<bool>,
    pub time_slots: Option<Vec<TimeWindow>>,
    /// `Some(None)` clears the break window.
    pub break_window: Option<Option<TimeWindow>>,
    pub slot_duration: Option<u32>,
    pub buffer_time: Option<u32>,
    pub max_appointments: Option<u32>,
    pub priority: Option<u32>,
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// An already-booked interval that blocks slots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookedInterval {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_booked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub rule_id: Option<Uuid>,
    pub slots: Vec<AvailableSlot>,
    pub at_capacity: bool,
}

impl DayAvailability {
    pub fn open_slots(&self) -> impl Iterator<Item = &AvailableSlot> {
        self.slots
            .iter()
            .filter(move |slot| !self.at_capacity && !slot.is_booked)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule rule not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid schedule rule: {0}")]
    InvalidRule(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<shared_database::SupabaseError> for ScheduleError {
    fn from(error: shared_database::SupabaseError) -> Self {
        ScheduleError::Database(error.to_string())
    }
}

impl From<ScheduleError> for shared_models::AppError {
    fn from(error: ScheduleError) -> Self {
        match error {
            ScheduleError::NotFound(_) => shared_models::AppError::NotFound(error.to_string()),
            ScheduleError::InvalidRule(msg) => shared_models::AppError::InvalidRequest(msg),
            ScheduleError::Database(msg) => shared_models::AppError::Database(msg),
        }
    }
}
