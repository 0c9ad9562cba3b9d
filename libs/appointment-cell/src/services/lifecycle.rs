// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::auth::Actor;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::IllegalTransition {
                from: current_status,
                to: new_status,
            });
        }

        debug!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        use AppointmentStatus::*;

        match current_status {
            Pending => vec![Confirmed, Approved, Cancelled, Rejected, NoShow, Expired],
            Confirmed | Approved => vec![InProgress, Cancelled, Rejected, NoShow, Expired],
            InProgress => vec![Completed, Cancelled, Rejected, NoShow, Expired],
            // Terminal states - no transitions allowed
            Completed | Cancelled | Rejected | NoShow | Expired => vec![],
        }
    }

    /// Who may move `appointment` to `new_status`. Admins and the
    /// appointment's doctor may perform any legal transition; the owning
    /// patient may only cancel.
    pub fn authorize(
        &self,
        actor: &Actor,
        appointment: &Appointment,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if actor.is_admin() || actor.user_id == appointment.doctor_id {
            return Ok(());
        }

        if actor.user_id == appointment.patient_id {
            if new_status == AppointmentStatus::Cancelled {
                return Ok(());
            }
            return Err(AppointmentError::Unauthorized(
                "Patients may only cancel their appointments".to_string(),
            ));
        }

        Err(AppointmentError::Unauthorized(
            "Not allowed to modify this appointment".to_string(),
        ))
    }

    /// Deletion: admins always, owning patients only while still pending.
    pub fn authorize_delete(&self, actor: &Actor, appointment: &Appointment) -> Result<(), AppointmentError> {
        if actor.is_admin() {
            return Ok(());
        }

        if actor.user_id == appointment.patient_id && appointment.status == AppointmentStatus::Pending {
            return Ok(());
        }

        Err(AppointmentError::Unauthorized(
            "Only pending appointments can be removed by their patient".to_string(),
        ))
    }

    /// Statuses that produce a `status_changed` notification.
    pub fn should_notify_status_change(&self, old: AppointmentStatus, new: AppointmentStatus) -> bool {
        old != new
            && matches!(
                new,
                AppointmentStatus::Approved
                    | AppointmentStatus::Rejected
                    | AppointmentStatus::Cancelled
                    | AppointmentStatus::Confirmed
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_exits() {
        let lifecycle = AppointmentLifecycleService::new();
        for status in AppointmentStatus::ALL {
            assert_eq!(status.is_terminal(), lifecycle.get_valid_transitions(status).is_empty(), "{}", status);
        }
    }

    #[test]
    fn notification_only_for_visible_outcomes() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.should_notify_status_change(AppointmentStatus::Pending, AppointmentStatus::Approved));
        assert!(!lifecycle.should_notify_status_change(AppointmentStatus::Approved, AppointmentStatus::InProgress));
        assert!(!lifecycle.should_notify_status_change(AppointmentStatus::Pending, AppointmentStatus::Expired));
        assert!(!lifecycle.should_notify_status_change(AppointmentStatus::Cancelled, AppointmentStatus::Cancelled));
    }
}
