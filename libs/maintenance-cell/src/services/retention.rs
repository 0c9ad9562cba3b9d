use std::sync::Arc;

use async_trait::async_trait;
use chrono::Months;
use tracing::{info, instrument};

use appointment_cell::models::AppointmentStatus;
use appointment_cell::services::store::AppointmentStore;
use shared_utils::clock::Clock;

use crate::{JobKind, JobReport, MaintenanceError, MaintenanceJob};

pub const RETENTION_MONTHS: u32 = 6;

pub const PURGEABLE_STATUSES: [AppointmentStatus; 2] =
    [AppointmentStatus::Expired, AppointmentStatus::Cancelled];

/// Hard-deletes long-dead appointments.
pub struct RetentionPurger {
    store: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
}

impl RetentionPurger {
    pub fn new(store: Arc<dyn AppointmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl MaintenanceJob for RetentionPurger {
    fn kind(&self) -> JobKind {
        JobKind::RetentionPurge
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<JobReport, MaintenanceError> {
        let now = self.clock.now();
        let mut report = JobReport::new(JobKind::RetentionPurge, now);

        let cutoff = now
            .checked_sub_months(Months::new(RETENTION_MONTHS))
            .ok_or_else(|| MaintenanceError::CutoffOutOfRange(now.to_rfc3339()))?;

        let purged = self.store.purge(&PURGEABLE_STATUSES, cutoff).await? as usize;
        report.matched = purged;
        report.processed = purged;

        info!("Retention purge removed {} appointments older than {}", purged, cutoff);
        Ok(report)
    }
}
