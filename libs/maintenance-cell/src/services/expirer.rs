use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use appointment_cell::models::AppointmentStatus;
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::services::notifications::{log_failure, NotificationSink};
use appointment_cell::services::store::AppointmentStore;
use shared_utils::clock::Clock;

use crate::{JobKind, JobReport, MaintenanceError, MaintenanceJob};

/// Statuses that lapse once their start time has passed.
pub const EXPIRABLE_STATUSES: [AppointmentStatus; 2] =
    [AppointmentStatus::Pending, AppointmentStatus::Approved];

/// Marks appointments whose start has passed without them being taken up.
pub struct AppointmentExpirer {
    store: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentExpirer {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }
}

#[async_trait]
impl MaintenanceJob for AppointmentExpirer {
    fn kind(&self) -> JobKind {
        JobKind::Expirer
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<JobReport, MaintenanceError> {
        let now = self.clock.now();
        let mut report = JobReport::new(JobKind::Expirer, now);

        let overdue = self.store.with_status_before(&EXPIRABLE_STATUSES, now).await?;
        report.matched = overdue.len();

        for appointment in overdue {
            let previous = appointment.status;
            if self.lifecycle
                .validate_status_transition(previous, AppointmentStatus::Expired)
                .is_err()
            {
                continue;
            }

            let mut expired = appointment;
            expired.status = AppointmentStatus::Expired;
            expired.updated_at = now;

            match self.store.update_if_status(expired, previous).await {
                Ok(Some(stored)) => {
                    report.processed += 1;
                    log_failure("expired", self.notifier.notify_expired(&stored));
                }
                Ok(None) => debug!("Appointment left {} before it could expire", previous),
                Err(e) => {
                    report.failed += 1;
                    error!("Failed to expire appointment: {}", e);
                }
            }
        }

        info!("Expirer finished: matched={} expired={} failed={}",
              report.matched, report.processed, report.failed);
        Ok(report)
    }
}
