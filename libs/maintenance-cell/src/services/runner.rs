use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use appointment_cell::services::notifications::NotificationSink;
use appointment_cell::services::store::AppointmentStore;
use shared_utils::clock::Clock;

use crate::services::{AppointmentExpirer, ReminderDispatcher, RetentionPurger};
use crate::{JobKind, JobReport, MaintenanceConfig, MaintenanceError};

/// A periodic background job. Runs never assume exclusive access to the
/// store; every write they make is conditional.
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn run(&self) -> Result<JobReport, MaintenanceError>;
}

struct ScheduledJob {
    job: Arc<dyn MaintenanceJob>,
    every: Duration,
}

/// Drives each job on its own timer until shut down.
pub struct MaintenanceScheduler {
    jobs: Vec<ScheduledJob>,
    is_shutdown: Arc<RwLock<bool>>,
}

impl Default for MaintenanceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_job(mut self, job: Arc<dyn MaintenanceJob>, every: Duration) -> Self {
        self.jobs.push(ScheduledJob { job, every });
        self
    }

    /// Expirer, reminder and retention purge over one store.
    pub fn standard(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: &MaintenanceConfig,
    ) -> Self {
        Self::new()
            .with_job(
                Arc::new(AppointmentExpirer::new(store.clone(), notifier.clone(), clock.clone())),
                config.expirer_interval,
            )
            .with_job(
                Arc::new(ReminderDispatcher::new(store.clone(), notifier, clock.clone())),
                config.reminder_interval,
            )
            .with_job(
                Arc::new(RetentionPurger::new(store, clock)),
                config.retention_interval,
            )
    }

    /// Run every job once, in registration order. A failing job does not
    /// stop the ones after it.
    pub async fn run_once(&self) -> Vec<Result<JobReport, MaintenanceError>> {
        let mut results = Vec::with_capacity(self.jobs.len());
        for scheduled in &self.jobs {
            results.push(scheduled.job.run().await);
        }
        results
    }

    /// Runs until [`shutdown`](Self::shutdown) is called. A job loop that
    /// ends on its own stops the whole scheduler and its error is returned.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), MaintenanceError> {
        info!("Starting maintenance scheduler with {} jobs", self.jobs.len());

        let mut loops = JoinSet::new();
        for scheduled in &self.jobs {
            let job = Arc::clone(&scheduled.job);
            let every = scheduled.every;
            let is_shutdown = Arc::clone(&self.is_shutdown);
            loops.spawn(async move { job_loop(job, every, is_shutdown).await });
        }

        let stopped_early = tokio::select! {
            _ = wait_for_shutdown(&self.is_shutdown) => None,
            Some(joined) = loops.join_next() => Some(joined),
        };

        if let Some(joined) = stopped_early {
            let failure = match joined {
                Ok(Err(e)) => e,
                Ok(Ok(())) => MaintenanceError::TaskFailed("job loop exited before shutdown".to_string()),
                Err(e) => MaintenanceError::TaskFailed(e.to_string()),
            };
            error!("Maintenance job stopped unexpectedly, stopping scheduler: {}", failure);
            *self.is_shutdown.write().await = true;
            while loops.join_next().await.is_some() {}
            return Err(failure);
        }

        info!("Shutdown signal received, waiting for running jobs");

        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(MaintenanceError::TaskFailed(e.to_string())),
            }
        }

        info!("Maintenance scheduler stopped");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown for maintenance scheduler");
        *self.is_shutdown.write().await = true;
    }
}

async fn job_loop(
    job: Arc<dyn MaintenanceJob>,
    every: Duration,
    is_shutdown: Arc<RwLock<bool>>,
) -> Result<(), MaintenanceError> {
    let kind = job.kind();
    if every.is_zero() {
        return Err(MaintenanceError::InvalidInterval(kind));
    }
    debug!("Job loop started: {} every {:?}", kind, every);

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wait_for_shutdown(&is_shutdown) => break,
        }

        match job.run().await {
            Ok(report) if report.failed > 0 => {
                warn!("Job {} finished with {} failures out of {}", kind, report.failed, report.matched);
            }
            Ok(report) => debug!("Job {} report: {:?}", kind, report),
            Err(e) => error!("Job {} failed: {}", kind, e),
        }
    }

    debug!("Job loop ended: {}", kind);
    Ok(())
}

async fn wait_for_shutdown(is_shutdown: &RwLock<bool>) {
    loop {
        if *is_shutdown.read().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
