#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus, BookAppointmentRequest, AppointmentError};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::identity::InMemoryDirectory;
use appointment_cell::services::notifications::{
    BroadcastNotifier, EventReceiver, NotificationSink, SchedulingEvent,
};
use appointment_cell::services::store::InMemoryAppointmentStore;
use doctor_cell::models::{CreateScheduleRuleRequest, RuleKind, ScheduleRule, TimeWindow};
use doctor_cell::services::rules::ScheduleRuleService;
use doctor_cell::services::store::InMemoryScheduleRuleStore;
use shared_models::auth::UserRole;
use shared_utils::clock::{Clock, FixedClock};
use shared_utils::test_utils::{clock_at, date, time, TestUser};

/// 2025-03-03 is a Monday.
pub fn monday() -> NaiveDate {
    date(2025, 3, 3)
}

pub fn tuesday() -> NaiveDate {
    date(2025, 3, 4)
}

pub struct TestSetup {
    pub clock: Arc<FixedClock>,
    pub rules: ScheduleRuleService,
    pub store: Arc<InMemoryAppointmentStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub service: Arc<AppointmentBookingService>,
    pub events: EventReceiver,
    pub doctor: TestUser,
    pub patient: TestUser,
    pub admin: TestUser,
}

impl TestSetup {
    pub async fn new() -> Self {
        let notifier = Arc::new(BroadcastNotifier::new());
        let events = notifier.subscribe();
        Self::build(notifier, events).await
    }

    /// Same wiring with a caller-provided notification sink.
    pub async fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        let events = BroadcastNotifier::new().subscribe();
        Self::build(sink, events).await
    }

    async fn build(sink: Arc<dyn NotificationSink>, events: EventReceiver) -> Self {
        // Monday 08:00 clinic time.
        let clock = Arc::new(clock_at(monday(), 8, 0));
        let rule_store = Arc::new(InMemoryScheduleRuleStore::new());
        let store = Arc::new(InMemoryAppointmentStore::new());
        let directory = Arc::new(InMemoryDirectory::new());

        let doctor = TestUser::doctor();
        let patient = TestUser::patient();
        let admin = TestUser::admin();
        directory.register(doctor.id, UserRole::Doctor).await;
        directory.register(patient.id, UserRole::Patient).await;
        directory.register(admin.id, UserRole::Admin).await;

        let service = AppointmentBookingService::new(
            rule_store.clone(),
            store.clone(),
            directory.clone(),
            sink,
            clock.clone(),
        );

        Self {
            rules: ScheduleRuleService::new(rule_store, clock.clone()),
            clock,
            store,
            directory,
            service: Arc::new(service),
            events,
            doctor,
            patient,
            admin,
        }
    }

    /// Weekly hours for the test doctor, 30-minute slots.
    pub async fn weekly_hours(&self, day_of_week: u8, from: (u32, u32), to: (u32, u32)) -> ScheduleRule {
        self.rules
            .create_rule(self.rule_request(
                RuleKind::WeeklyRecurring { day_of_week },
                vec![TimeWindow::new(time(from.0, from.1), time(to.0, to.1))],
            ))
            .await
            .unwrap()
    }

    /// Monday 09:00-17:00 with 30-minute slots.
    pub async fn monday_hours(&self) -> ScheduleRule {
        self.weekly_hours(1, (9, 0), (17, 0)).await
    }

    pub fn rule_request(&self, kind: RuleKind, time_slots: Vec<TimeWindow>) -> CreateScheduleRuleRequest {
        CreateScheduleRuleRequest {
            doctor_id: self.doctor.id,
            kind,
            is_available: true,
            time_slots,
            break_window: None,
            slot_duration: 30,
            buffer_time: None,
            max_appointments: None,
            priority: None,
        }
    }

    pub fn at(&self, day: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        self.clock.instant_at(day, time(h, m))
    }

    pub fn request(&self, start_at: DateTime<Utc>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id: self.patient.id,
            doctor_id: self.doctor.id,
            start_at,
            duration_minutes: Some(30),
            notes: None,
        }
    }

    pub async fn book(&self, start_at: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
        self.service.book_appointment(self.request(start_at)).await
    }

    /// Register an extra user with the directory.
    pub async fn user(&self, role: UserRole) -> TestUser {
        let user = TestUser::new(role);
        self.directory.register(user.id, role).await;
        user
    }

    /// Store an appointment directly, bypassing booking checks.
    pub async fn seed(&self, start_at: DateTime<Utc>, status: AppointmentStatus) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: self.patient.id,
            doctor_id: self.doctor.id,
            start_at,
            duration_minutes: 30,
            status,
            reminder_sent: false,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            notes: None,
            created_at: self.clock.now(),
            updated_at: self.clock.now(),
        };
        self.store.seed(appointment.clone()).await;
        appointment
    }

    /// Every event published since the last drain.
    pub fn drain_events(&mut self) -> Vec<SchedulingEvent> {
        let mut events = Vec::new();
        while let Ok(payload) = self.events.try_recv() {
            events.push(serde_json::from_str(&payload).unwrap());
        }
        events
    }
}
