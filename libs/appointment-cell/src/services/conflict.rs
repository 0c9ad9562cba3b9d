// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::services::availability::REQUEST_CONFLICT_MARGIN_MINUTES;
use shared_utils::time::{overlaps, widen};

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};
use crate::services::store::AppointmentStore;

/// Calendar-blocking appointments overlapping `[start_at, end_at)`.
pub fn find_conflicts<'a>(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    existing: &'a [Appointment],
) -> Vec<&'a Appointment> {
    existing
        .iter()
        .filter(|appointment| appointment.blocks_calendar())
        .filter(|appointment| overlaps(start_at, end_at, appointment.start_at, appointment.end_at()))
        .collect()
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Check a requested interval for a doctor against stored bookings,
    /// widened by [`REQUEST_CONFLICT_MARGIN_MINUTES`] on both sides.
    pub async fn check_request(
        &self,
        doctor_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start_at, end_at);

        let (wide_start, wide_end) = widen(start_at, end_at, REQUEST_CONFLICT_MARGIN_MINUTES);

        let mut existing = self.store.for_doctor_between(doctor_id, wide_start, wide_end).await?;
        if let Some(excluded) = exclude_appointment_id {
            existing.retain(|appointment| appointment.id != excluded);
        }

        let conflicting_appointments: Vec<Appointment> = find_conflicts(wide_start, wide_end, &existing)
            .into_iter()
            .cloned()
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!("Conflict detected for doctor {} - {} conflicting appointments",
                  doctor_id, conflicting_appointments.len());
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }
}
