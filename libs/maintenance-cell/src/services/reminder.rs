use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, error, info, instrument, warn};

use appointment_cell::services::notifications::NotificationSink;
use appointment_cell::services::store::AppointmentStore;
use shared_utils::clock::Clock;

use crate::{JobKind, JobReport, MaintenanceError, MaintenanceJob};

pub const REMINDER_WINDOW_START_MINUTES: i64 = 25;
pub const REMINDER_WINDOW_END_MINUTES: i64 = 30;

/// Sends one reminder per approved appointment shortly before it starts.
pub struct ReminderDispatcher {
    store: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, notifier, clock }
    }
}

#[async_trait]
impl MaintenanceJob for ReminderDispatcher {
    fn kind(&self) -> JobKind {
        JobKind::Reminder
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<JobReport, MaintenanceError> {
        let now = self.clock.now();
        let mut report = JobReport::new(JobKind::Reminder, now);

        let from = now + Duration::minutes(REMINDER_WINDOW_START_MINUTES);
        let to = now + Duration::minutes(REMINDER_WINDOW_END_MINUTES);

        let due = self.store.reminder_candidates(from, to).await?;
        report.matched = due.len();

        for appointment in due {
            match self.store.claim_reminder(appointment.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Reminder for {} already claimed", appointment.id);
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Failed to claim reminder for {}: {}", appointment.id, e);
                    continue;
                }
            }

            match self.notifier.notify_reminder(&appointment) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Reminder for {} not delivered, releasing claim: {}", appointment.id, e);
                    if let Err(e) = self.store.release_reminder(appointment.id).await {
                        error!("Failed to release reminder claim for {}: {}", appointment.id, e);
                    }
                }
            }
        }

        info!("Reminder run finished: matched={} sent={} failed={}",
              report.matched, report.processed, report.failed);
        Ok(report)
    }
}
