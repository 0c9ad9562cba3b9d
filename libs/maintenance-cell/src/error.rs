use thiserror::Error;

use appointment_cell::models::AppointmentError;

use crate::JobKind;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("Appointment store error: {0}")]
    Store(#[from] AppointmentError),

    #[error("Retention cutoff out of range for {0}")]
    CutoffOutOfRange(String),

    #[error("Interval for job {0} must be non-zero")]
    InvalidInterval(JobKind),

    #[error("Scheduler task failed: {0}")]
    TaskFailed(String),
}

impl From<MaintenanceError> for AppError {
    fn from(error: MaintenanceError) -> Self {
        match error {
            MaintenanceError::Store(inner) => inner.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}
