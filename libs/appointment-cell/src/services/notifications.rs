// libs/appointment-cell/src/services/notifications.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus};

pub type EventSender = broadcast::Sender<String>;
pub type EventReceiver = broadcast::Receiver<String>;

const EVENT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    PendingAppointments,
}

/// Everything the engine announces to the outside world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulingEvent {
    CounterUpdated {
        kind: CounterKind,
        doctor_id: Uuid,
        count: u64,
    },
    CalendarChanged {
        doctor_id: Uuid,
    },
    StatusChanged {
        appointment_id: Uuid,
        doctor_id: Uuid,
        patient_id: Uuid,
        old_status: AppointmentStatus,
        new_status: AppointmentStatus,
    },
    Expired {
        appointment_id: Uuid,
        doctor_id: Uuid,
        patient_id: Uuid,
    },
    Reminder {
        appointment_id: Uuid,
        patient_id: Uuid,
        start_at: DateTime<Utc>,
    },
    Confirmation {
        appointment_id: Uuid,
        patient_id: Uuid,
        start_at: DateTime<Utc>,
    },
    Cancellation {
        appointment_id: Uuid,
        patient_id: Uuid,
        reason: Option<String>,
    },
}

impl SchedulingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulingEvent::CounterUpdated { .. } => "counter_updated",
            SchedulingEvent::CalendarChanged { .. } => "calendar_changed",
            SchedulingEvent::StatusChanged { .. } => "status_changed",
            SchedulingEvent::Expired { .. } => "expired",
            SchedulingEvent::Reminder { .. } => "reminder",
            SchedulingEvent::Confirmation { .. } => "confirmation",
            SchedulingEvent::Cancellation { .. } => "cancellation",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("No subscribers for {0}")]
    NoSubscribers(&'static str),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notifications. Implementations must return promptly; the engine
/// never waits on delivery and only logs failures.
pub trait NotificationSink: Send + Sync {
    fn notify_counter(&self, kind: CounterKind, count: u64, doctor_id: Uuid) -> Result<(), NotificationError>;

    fn notify_calendar_changed(&self, doctor_id: Uuid) -> Result<(), NotificationError>;

    fn notify_status_changed(
        &self,
        appointment: &Appointment,
        old_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), NotificationError>;

    fn notify_expired(&self, appointment: &Appointment) -> Result<(), NotificationError>;

    fn notify_reminder(&self, appointment: &Appointment) -> Result<(), NotificationError>;

    fn send_confirmation(&self, appointment: &Appointment) -> Result<(), NotificationError>;

    /// The reason travels in `appointment.rejection_reason`.
    fn send_cancellation(&self, appointment: &Appointment) -> Result<(), NotificationError>;
}

/// Log a failed dispatch and carry on.
pub fn log_failure(what: &str, result: Result<(), NotificationError>) {
    if let Err(e) = result {
        warn!("Notification '{}' not delivered: {}", what, e);
    }
}

/// Fans serialized [`SchedulingEvent`]s out to every subscriber.
pub struct BroadcastNotifier {
    sender: EventSender,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    fn publish(&self, event: SchedulingEvent) -> Result<(), NotificationError> {
        let name = event.name();
        let payload = serde_json::to_string(&event)
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        self.sender
            .send(payload)
            .map_err(|_| NotificationError::NoSubscribers(name))?;

        debug!("Published {} event", name);
        Ok(())
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify_counter(&self, kind: CounterKind, count: u64, doctor_id: Uuid) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::CounterUpdated { kind, doctor_id, count })
    }

    fn notify_calendar_changed(&self, doctor_id: Uuid) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::CalendarChanged { doctor_id })
    }

    fn notify_status_changed(
        &self,
        appointment: &Appointment,
        old_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::StatusChanged {
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            old_status,
            new_status,
        })
    }

    fn notify_expired(&self, appointment: &Appointment) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::Expired {
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
        })
    }

    fn notify_reminder(&self, appointment: &Appointment) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::Reminder {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            start_at: appointment.start_at,
        })
    }

    fn send_confirmation(&self, appointment: &Appointment) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::Confirmation {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            start_at: appointment.start_at,
        })
    }

    fn send_cancellation(&self, appointment: &Appointment) -> Result<(), NotificationError> {
        self.publish(SchedulingEvent::Cancellation {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            reason: appointment.rejection_reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_without_subscribers_is_reported() {
        let notifier = BroadcastNotifier::new();
        let result = notifier.notify_calendar_changed(Uuid::new_v4());
        assert!(matches!(result, Err(NotificationError::NoSubscribers("calendar_changed"))));
    }

    #[test]
    fn events_are_tagged_json() {
        let notifier = BroadcastNotifier::new();
        let mut receiver = notifier.subscribe();
        let doctor_id = Uuid::new_v4();

        notifier.notify_counter(CounterKind::PendingAppointments, 3, doctor_id).unwrap();

        let payload = receiver.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["event"], "counter_updated");
        assert_eq!(value["kind"], "pending_appointments");
        assert_eq!(value["count"], 3);
    }
}
