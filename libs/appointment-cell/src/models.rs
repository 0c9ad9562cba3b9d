// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

use doctor_cell::models::{BookedInterval, ScheduleError};
use shared_database::SupabaseError;
use shared_models::AppError;

/// Minimum gap between "now" and a requested start.
pub const MIN_LEAD_TIME_MINUTES: i64 = 20;

pub const DEFAULT_APPOINTMENT_MINUTES: u32 = 60;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_at: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reminder_sent: bool,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn interval(&self) -> BookedInterval {
        BookedInterval {
            start_at: self.start_at,
            end_at: self.end_at(),
        }
    }

    /// Whether this appointment still occupies the doctor's calendar.
    pub fn blocks_calendar(&self) -> bool {
        self.status.blocks_calendar()
    }
}

fn default_duration() -> u32 {
    DEFAULT_APPOINTMENT_MINUTES
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Approved,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
    NoShow,
    Expired,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 9] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Approved,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Rejected,
        AppointmentStatus::NoShow,
        AppointmentStatus::Expired,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rejected
                | AppointmentStatus::NoShow
                | AppointmentStatus::Expired
        )
    }

    pub fn blocks_calendar(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Rejected | AppointmentStatus::Expired
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Approved => write!(f, "approved"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Expired => write!(f, "expired"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: Option<u32>,
    pub notes: Option<String>,
}

/// Optional payload accompanying a status transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionExtra {
    pub reason: Option<String>,
}

impl TransitionExtra {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self { reason: Some(reason.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub min_lead_time_minutes: i64,
    pub default_duration_minutes: u32,
    pub max_duration_minutes: u32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            min_lead_time_minutes: MIN_LEAD_TIME_MINUTES,
            default_duration_minutes: DEFAULT_APPOINTMENT_MINUTES,
            max_duration_minutes: 8 * 60,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Appointments must be booked at least {minimum_minutes} minutes in advance")]
    LeadTimeViolation { minimum_minutes: i64 },

    #[error("Doctor has no open window for the requested time: {0}")]
    NoOpenWindow(String),

    #[error("Doctor has reached the daily limit of {0} appointments")]
    DailyCapacityReached(u32),

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Appointment changed concurrently, reload and retry")]
    ConcurrentModification,

    #[error("Cannot move appointment from {from} to {to}")]
    IllegalTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for AppointmentError {
    fn from(error: SupabaseError) -> Self {
        match error {
            SupabaseError::Conflict(_) => AppointmentError::ConflictDetected,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::NotFound(_) | AppointmentError::UserNotFound(_) => {
                AppError::NotFound(message)
            }
            AppointmentError::InvalidRequest(_) | AppointmentError::LeadTimeViolation { .. } => {
                AppError::InvalidRequest(message)
            }
            AppointmentError::NoOpenWindow(_)
            | AppointmentError::DailyCapacityReached(_)
            | AppointmentError::ConflictDetected
            | AppointmentError::ConcurrentModification => AppError::Conflict(message),
            AppointmentError::IllegalTransition { from, to } => AppError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            AppointmentError::Unauthorized(_) => AppError::Unauthorized(message),
            AppointmentError::Schedule(inner) => inner.into(),
            AppointmentError::DatabaseError(_) => AppError::Database(message),
        }
    }
}
