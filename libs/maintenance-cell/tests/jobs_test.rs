use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mockall::mock;
use tokio_test::assert_ok;
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus};
use appointment_cell::services::notifications::{
    BroadcastNotifier, CounterKind, EventReceiver, NotificationError, NotificationSink, SchedulingEvent,
};
use appointment_cell::services::store::{AppointmentStore, InMemoryAppointmentStore};
use maintenance_cell::*;
use shared_utils::clock::{Clock, FixedClock};
use shared_utils::test_utils::{clock_at, date, time};

struct JobSetup {
    clock: Arc<FixedClock>,
    store: Arc<InMemoryAppointmentStore>,
    notifier: Arc<BroadcastNotifier>,
    events: EventReceiver,
    doctor_id: Uuid,
}

impl JobSetup {
    fn at(day: NaiveDate, h: u32, m: u32) -> Self {
        let notifier = Arc::new(BroadcastNotifier::new());
        let events = notifier.subscribe();
        Self {
            clock: Arc::new(clock_at(day, h, m)),
            store: Arc::new(InMemoryAppointmentStore::new()),
            notifier,
            events,
            doctor_id: Uuid::new_v4(),
        }
    }

    fn local(&self, day: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        self.clock.instant_at(day, time(h, m))
    }

    async fn seed(&self, start_at: DateTime<Utc>, status: AppointmentStatus) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: self.doctor_id,
            start_at,
            duration_minutes: 30,
            status,
            reminder_sent: false,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            notes: None,
            created_at: start_at,
            updated_at: start_at,
        };
        self.store.seed(appointment.clone()).await;
        appointment
    }

    async fn status_of(&self, appointment: &Appointment) -> AppointmentStatus {
        self.store.get(appointment.id).await.unwrap().unwrap().status
    }

    fn drain_events(&mut self) -> Vec<SchedulingEvent> {
        let mut events = Vec::new();
        while let Ok(payload) = self.events.try_recv() {
            events.push(serde_json::from_str(&payload).unwrap());
        }
        events
    }

    fn expirer(&self) -> AppointmentExpirer {
        AppointmentExpirer::new(self.store.clone(), self.notifier.clone(), self.clock.clone())
    }

    fn reminders(&self) -> ReminderDispatcher {
        ReminderDispatcher::new(self.store.clone(), self.notifier.clone(), self.clock.clone())
    }
}

fn monday() -> NaiveDate {
    date(2025, 3, 3)
}

// ==============================================================================
// EXPIRER
// ==============================================================================

#[tokio::test]
async fn test_expirer_lapses_overdue_pending_and_approved() {
    let mut setup = JobSetup::at(monday(), 10, 0);
    let pending = setup.seed(setup.local(monday(), 9, 0), AppointmentStatus::Pending).await;
    let approved = setup.seed(setup.local(monday(), 9, 30), AppointmentStatus::Approved).await;
    let upcoming = setup.seed(setup.local(monday(), 11, 0), AppointmentStatus::Approved).await;
    let cancelled = setup.seed(setup.local(monday(), 8, 0), AppointmentStatus::Cancelled).await;
    let running = setup.seed(setup.local(monday(), 9, 45), AppointmentStatus::InProgress).await;

    let report = assert_ok!(setup.expirer().run().await);

    assert_eq!(report.job, JobKind::Expirer);
    assert_eq!((report.matched, report.processed, report.failed), (2, 2, 0));
    assert_eq!(setup.status_of(&pending).await, AppointmentStatus::Expired);
    assert_eq!(setup.status_of(&approved).await, AppointmentStatus::Expired);
    assert_eq!(setup.status_of(&upcoming).await, AppointmentStatus::Approved);
    assert_eq!(setup.status_of(&cancelled).await, AppointmentStatus::Cancelled);
    assert_eq!(setup.status_of(&running).await, AppointmentStatus::InProgress);

    let expired_events = setup
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, SchedulingEvent::Expired { .. }))
        .count();
    assert_eq!(expired_events, 2);
}

#[tokio::test]
async fn test_expirer_second_run_is_a_no_op() {
    let mut setup = JobSetup::at(monday(), 10, 0);
    setup.seed(setup.local(monday(), 9, 0), AppointmentStatus::Pending).await;

    setup.expirer().run().await.unwrap();
    setup.drain_events();

    let again = setup.expirer().run().await.unwrap();
    assert_eq!((again.matched, again.processed), (0, 0));
    assert!(setup.drain_events().is_empty());
}

#[tokio::test]
async fn test_expirer_skips_start_exactly_now() {
    let setup = JobSetup::at(monday(), 10, 0);
    let starting = setup.seed(setup.local(monday(), 10, 0), AppointmentStatus::Pending).await;

    let report = setup.expirer().run().await.unwrap();
    assert_eq!(report.matched, 0);
    assert_eq!(setup.status_of(&starting).await, AppointmentStatus::Pending);
}

// ==============================================================================
// REMINDERS
// ==============================================================================

#[tokio::test]
async fn test_reminder_window_is_half_open() {
    let mut setup = JobSetup::at(monday(), 10, 0);
    let due = setup.seed(setup.local(monday(), 10, 27), AppointmentStatus::Approved).await;
    let edge = setup.seed(setup.local(monday(), 10, 25), AppointmentStatus::Approved).await;
    let too_late = setup.seed(setup.local(monday(), 10, 30), AppointmentStatus::Approved).await;
    let too_soon = setup.seed(setup.local(monday(), 10, 24), AppointmentStatus::Approved).await;
    let unapproved = setup.seed(setup.local(monday(), 10, 28), AppointmentStatus::Pending).await;

    let report = setup.reminders().run().await.unwrap();
    assert_eq!((report.matched, report.processed, report.failed), (2, 2, 0));

    let reminded: Vec<Uuid> = setup
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            SchedulingEvent::Reminder { appointment_id, .. } => Some(appointment_id),
            _ => None,
        })
        .collect();
    assert_eq!(reminded.len(), 2);
    assert!(reminded.contains(&due.id));
    assert!(reminded.contains(&edge.id));

    for untouched in [&too_late, &too_soon, &unapproved] {
        assert!(!setup.store.get(untouched.id).await.unwrap().unwrap().reminder_sent);
    }
}

#[tokio::test]
async fn test_reminder_is_sent_exactly_once() {
    let mut setup = JobSetup::at(monday(), 10, 0);
    let due = setup.seed(setup.local(monday(), 10, 27), AppointmentStatus::Approved).await;

    let first = setup.reminders();
    let second = setup.reminders();
    let (a, b) = tokio::join!(first.run(), second.run());
    assert_eq!(a.unwrap().processed + b.unwrap().processed, 1);

    // A later run inside the same window finds nothing left to do.
    setup.clock.advance(chrono::Duration::minutes(1));
    let again = setup.reminders().run().await.unwrap();
    assert_eq!(again.matched, 0);

    let reminders = setup
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, SchedulingEvent::Reminder { .. }))
        .count();
    assert_eq!(reminders, 1);
    assert!(setup.store.get(due.id).await.unwrap().unwrap().reminder_sent);
}

/// Cancels every candidate right after the reminder query returns, as a
/// patient acting between the read and the claim would.
struct CancelAfterQuery {
    inner: Arc<InMemoryAppointmentStore>,
}

#[async_trait]
impl AppointmentStore for CancelAfterQuery {
    async fn insert_exclusive(&self, appointment: Appointment, margin_minutes: i64) -> Result<Appointment, AppointmentError> {
        self.inner.insert_exclusive(appointment, margin_minutes).await
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        self.inner.get(appointment_id).await
    }

    async fn update_if_status(&self, appointment: Appointment, expected: AppointmentStatus) -> Result<Option<Appointment>, AppointmentError> {
        self.inner.update_if_status(appointment, expected).await
    }

    async fn claim_reminder(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        self.inner.claim_reminder(appointment_id).await
    }

    async fn release_reminder(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        self.inner.release_reminder(appointment_id).await
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        self.inner.delete(appointment_id).await
    }

    async fn for_doctor_between(&self, doctor_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.for_doctor_between(doctor_id, from, to).await
    }

    async fn for_patient_from(&self, patient_id: Uuid, from: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.for_patient_from(patient_id, from).await
    }

    async fn with_status_before(&self, statuses: &[AppointmentStatus], before: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.with_status_before(statuses, before).await
    }

    async fn reminder_candidates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        let due = self.inner.reminder_candidates(from, to).await?;
        for appointment in &due {
            let mut cancelled = appointment.clone();
            cancelled.status = AppointmentStatus::Cancelled;
            self.inner.update_if_status(cancelled, AppointmentStatus::Approved).await?;
        }
        Ok(due)
    }

    async fn count_for_doctor(&self, doctor_id: Uuid, status: AppointmentStatus) -> Result<u64, AppointmentError> {
        self.inner.count_for_doctor(doctor_id, status).await
    }

    async fn purge(&self, statuses: &[AppointmentStatus], before: DateTime<Utc>) -> Result<u64, AppointmentError> {
        self.inner.purge(statuses, before).await
    }
}

#[tokio::test]
async fn test_reminder_skips_appointment_cancelled_mid_run() {
    let mut setup = JobSetup::at(monday(), 10, 0);
    let due = setup.seed(setup.local(monday(), 10, 27), AppointmentStatus::Approved).await;

    let store = Arc::new(CancelAfterQuery { inner: setup.store.clone() });
    let dispatcher = ReminderDispatcher::new(store, setup.notifier.clone(), setup.clock.clone());
    let report = dispatcher.run().await.unwrap();

    assert_eq!((report.matched, report.processed, report.failed), (1, 0, 0));
    assert_eq!(report.skipped(), 1);

    let stored = setup.store.get(due.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
    assert!(!stored.reminder_sent);
    assert!(!setup
        .drain_events()
        .iter()
        .any(|event| matches!(event, SchedulingEvent::Reminder { .. })));
}

#[tokio::test]
async fn test_claim_requires_approved_status() {
    let setup = JobSetup::at(monday(), 10, 0);
    let pending = setup.seed(setup.local(monday(), 10, 27), AppointmentStatus::Pending).await;
    let approved = setup.seed(setup.local(monday(), 10, 28), AppointmentStatus::Approved).await;

    assert!(!setup.store.claim_reminder(pending.id).await.unwrap());
    assert!(setup.store.claim_reminder(approved.id).await.unwrap());
    assert!(!setup.store.claim_reminder(approved.id).await.unwrap());
}

mock! {
    pub Sink {}

    impl NotificationSink for Sink {
        fn notify_counter(&self, kind: CounterKind, count: u64, doctor_id: Uuid) -> Result<(), NotificationError>;
        fn notify_calendar_changed(&self, doctor_id: Uuid) -> Result<(), NotificationError>;
        fn notify_status_changed(&self, appointment: &Appointment, old_status: AppointmentStatus, new_status: AppointmentStatus) -> Result<(), NotificationError>;
        fn notify_expired(&self, appointment: &Appointment) -> Result<(), NotificationError>;
        fn notify_reminder(&self, appointment: &Appointment) -> Result<(), NotificationError>;
        fn send_confirmation(&self, appointment: &Appointment) -> Result<(), NotificationError>;
        fn send_cancellation(&self, appointment: &Appointment) -> Result<(), NotificationError>;
    }
}

#[tokio::test]
async fn test_failed_reminder_is_released_for_retry() {
    let setup = JobSetup::at(monday(), 10, 0);
    let due = setup.seed(setup.local(monday(), 10, 27), AppointmentStatus::Approved).await;
    let other = setup.seed(setup.local(monday(), 10, 28), AppointmentStatus::Approved).await;

    let failing_id = due.id;
    let mut sink = MockSink::new();
    sink.expect_notify_reminder()
        .times(2)
        .returning(move |appointment| {
            if appointment.id == failing_id {
                Err(NotificationError::Delivery("sms gateway timeout".to_string()))
            } else {
                Ok(())
            }
        });

    let dispatcher = ReminderDispatcher::new(setup.store.clone(), Arc::new(sink), setup.clock.clone());
    let report = dispatcher.run().await.unwrap();

    assert_eq!((report.matched, report.processed, report.failed), (2, 1, 1));
    assert!(!setup.store.get(due.id).await.unwrap().unwrap().reminder_sent);
    assert!(setup.store.get(other.id).await.unwrap().unwrap().reminder_sent);

    // The next run picks the released row up again.
    let retry = setup.reminders().run().await.unwrap();
    assert_eq!((retry.matched, retry.processed), (1, 1));
}

// ==============================================================================
// RETENTION
// ==============================================================================

#[tokio::test]
async fn test_retention_purges_old_expired_and_cancelled() {
    let setup = JobSetup::at(date(2025, 9, 3), 10, 0);
    let old_expired = setup.seed(setup.local(date(2025, 3, 1), 9, 0), AppointmentStatus::Expired).await;
    let old_cancelled = setup.seed(setup.local(date(2025, 2, 1), 9, 0), AppointmentStatus::Cancelled).await;
    let old_completed = setup.seed(setup.local(date(2025, 1, 10), 9, 0), AppointmentStatus::Completed).await;
    let recent_expired = setup.seed(setup.local(date(2025, 3, 5), 9, 0), AppointmentStatus::Expired).await;

    let purger = RetentionPurger::new(setup.store.clone(), setup.clock.clone());
    let report = purger.run().await.unwrap();

    assert_eq!(report.job, JobKind::RetentionPurge);
    assert_eq!(report.processed, 2);
    assert!(setup.store.get(old_expired.id).await.unwrap().is_none());
    assert!(setup.store.get(old_cancelled.id).await.unwrap().is_none());
    assert!(setup.store.get(old_completed.id).await.unwrap().is_some());
    assert!(setup.store.get(recent_expired.id).await.unwrap().is_some());
}

// ==============================================================================
// SCHEDULER
// ==============================================================================

#[tokio::test]
async fn test_run_once_reports_every_job() {
    let setup = JobSetup::at(monday(), 10, 0);
    setup.seed(setup.local(monday(), 9, 0), AppointmentStatus::Pending).await;

    let scheduler = MaintenanceScheduler::standard(
        setup.store.clone(),
        setup.notifier.clone(),
        setup.clock.clone(),
        &MaintenanceConfig::default(),
    );

    let kinds: Vec<JobKind> = scheduler
        .run_once()
        .await
        .into_iter()
        .map(|result| result.unwrap().job)
        .collect();
    assert_eq!(kinds, vec![JobKind::Expirer, JobKind::Reminder, JobKind::RetentionPurge]);
}

#[tokio::test]
async fn test_scheduler_runs_jobs_until_shutdown() {
    let setup = JobSetup::at(monday(), 10, 0);
    let overdue = setup.seed(setup.local(monday(), 9, 0), AppointmentStatus::Pending).await;

    let config = MaintenanceConfig {
        expirer_interval: StdDuration::from_millis(50),
        reminder_interval: StdDuration::from_millis(50),
        retention_interval: StdDuration::from_millis(50),
    };
    let scheduler = Arc::new(MaintenanceScheduler::standard(
        setup.store.clone(),
        setup.notifier.clone(),
        setup.clock.clone(),
        &config,
    ));

    let running = Arc::clone(&scheduler);
    let handle = tokio::spawn(async move { running.start().await });

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    scheduler.shutdown().await;

    let stopped = tokio::time::timeout(StdDuration::from_secs(2), handle).await;
    assert_matches!(stopped, Ok(Ok(Ok(()))));
    assert_eq!(setup.status_of(&overdue).await, AppointmentStatus::Expired);
}

#[tokio::test]
async fn test_scheduler_stops_when_a_job_loop_dies() {
    let setup = JobSetup::at(monday(), 10, 0);

    let scheduler = MaintenanceScheduler::new()
        .with_job(Arc::new(setup.expirer()), StdDuration::ZERO)
        .with_job(Arc::new(setup.reminders()), StdDuration::from_millis(50));

    // No shutdown is requested; start() must return on its own.
    let stopped = tokio::time::timeout(StdDuration::from_secs(2), scheduler.start()).await;
    assert_matches!(stopped, Ok(Err(MaintenanceError::InvalidInterval(JobKind::Expirer))));
}

#[test]
fn test_zero_intervals_keep_default_cadence() {
    let app_config = shared_config::AppConfig {
        expirer_interval_seconds: 0,
        reminder_interval_seconds: 90,
        ..Default::default()
    };

    let config = MaintenanceConfig::from_app_config(&app_config);
    assert_eq!(config.expirer_interval, MaintenanceConfig::default().expirer_interval);
    assert_eq!(config.reminder_interval, StdDuration::from_secs(90));
}
