// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use std::sync::Arc;

use doctor_cell::models::{BookedInterval, DayAvailability, ScheduleRule};
use doctor_cell::services::availability::{AvailabilityCalculator, REQUEST_CONFLICT_MARGIN_MINUTES};
use doctor_cell::services::resolver::RuleResolver;
use doctor_cell::services::store::ScheduleRuleStore;
use shared_models::auth::{Actor, UserRole};
use shared_utils::clock::Clock;
use shared_utils::time::MINUTES_PER_DAY;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentValidationRules,
    BookAppointmentRequest, TransitionExtra,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::identity::IdentityLookup;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifications::{log_failure, CounterKind, NotificationSink};
use crate::services::store::AppointmentStore;

pub struct AppointmentBookingService {
    resolver: RuleResolver,
    calculator: AvailabilityCalculator,
    store: Arc<dyn AppointmentStore>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    identity: Arc<dyn IdentityLookup>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    validation_rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    pub fn new(
        rule_store: Arc<dyn ScheduleRuleStore>,
        store: Arc<dyn AppointmentStore>,
        identity: Arc<dyn IdentityLookup>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver: RuleResolver::new(rule_store),
            calculator: AvailabilityCalculator::new(Arc::clone(&clock)),
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            store,
            identity,
            notifier,
            clock,
            validation_rules: AppointmentValidationRules::default(),
        }
    }

    pub fn with_validation_rules(mut self, validation_rules: AppointmentValidationRules) -> Self {
        self.validation_rules = validation_rules;
        self
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    /// Book a new appointment. The request is re-validated against the
    /// latest stored appointments and persisted through the store's atomic
    /// check-and-insert, so two racing requests for the same slot cannot
    /// both succeed.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Booking request for doctor {} by patient {} at {}",
               request.doctor_id, request.patient_id, request.start_at);

        self.require_role(request.doctor_id, UserRole::Doctor).await?;
        self.require_role(request.patient_id, UserRole::Patient).await?;

        let duration_minutes = request
            .duration_minutes
            .unwrap_or(self.validation_rules.default_duration_minutes);
        self.validate_timing(request.start_at, duration_minutes)?;

        let end_at = request.start_at + Duration::minutes(i64::from(duration_minutes));
        let rule = self.ensure_open_window(request.doctor_id, request.start_at, end_at).await?;
        self.ensure_daily_capacity(&rule, request.start_at).await?;

        let conflicts = self.conflict_service
            .check_request(request.doctor_id, request.start_at, end_at, None)
            .await?;
        if conflicts.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            start_at: request.start_at,
            duration_minutes,
            status: AppointmentStatus::Pending,
            reminder_sent: false,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        let appointment = self.store
            .insert_exclusive(appointment, REQUEST_CONFLICT_MARGIN_MINUTES)
            .await?;

        info!("Appointment {} booked with doctor {} at {}",
              appointment.id, appointment.doctor_id, appointment.start_at);

        self.publish_pending_counter(appointment.doctor_id).await;
        log_failure("calendar_changed", self.notifier.notify_calendar_changed(appointment.doctor_id));

        Ok(appointment)
    }

    async fn require_role(&self, user_id: Uuid, expected: UserRole) -> Result<(), AppointmentError> {
        match self.identity.role_of(user_id).await? {
            Some(role) if role == expected => Ok(()),
            Some(role) => {
                warn!("User {} has role {}, expected {}", user_id, role, expected);
                Err(AppointmentError::InvalidRequest(format!(
                    "User {} is not a {}", user_id, expected
                )))
            }
            None => Err(AppointmentError::UserNotFound(user_id)),
        }
    }

    fn validate_timing(&self, start_at: DateTime<Utc>, duration_minutes: u32) -> Result<(), AppointmentError> {
        if duration_minutes == 0 {
            return Err(AppointmentError::InvalidRequest(
                "Duration must be positive".to_string(),
            ));
        }

        if duration_minutes > self.validation_rules.max_duration_minutes {
            return Err(AppointmentError::InvalidRequest(format!(
                "Duration cannot exceed {} minutes",
                self.validation_rules.max_duration_minutes
            )));
        }

        let earliest = self.clock.now() + Duration::minutes(self.validation_rules.min_lead_time_minutes);
        if start_at < earliest {
            warn!("Requested start {} is before earliest bookable {}", start_at, earliest);
            return Err(AppointmentError::LeadTimeViolation {
                minimum_minutes: self.validation_rules.min_lead_time_minutes,
            });
        }

        Ok(())
    }

    /// The requested interval must sit inside one window of the governing
    /// rule on a single local day.
    async fn ensure_open_window(
        &self,
        doctor_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<ScheduleRule, AppointmentError> {
        let date = self.clock.local_date(start_at);

        let rule = self.resolver.resolve(doctor_id, date).await?.ok_or_else(|| {
            AppointmentError::NoOpenWindow(format!("no schedule on {}", date))
        })?;

        let start_seconds = self.clock.local_time(start_at).num_seconds_from_midnight();
        let length_seconds = (end_at - start_at).num_seconds().max(0) as u32;
        let start_minute = start_seconds / 60;
        let end_minute = (start_seconds + length_seconds).div_ceil(60);

        if end_minute > MINUTES_PER_DAY {
            return Err(AppointmentError::NoOpenWindow(format!(
                "appointment on {} runs past midnight", date
            )));
        }

        if !rule.covers(start_minute, end_minute) {
            return Err(AppointmentError::NoOpenWindow(format!(
                "{} is outside the doctor's hours on {}",
                self.clock.local_time(start_at).format("%H:%M"),
                date
            )));
        }

        Ok(rule)
    }

    async fn ensure_daily_capacity(
        &self,
        rule: &ScheduleRule,
        start_at: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if !rule.has_daily_cap() {
            return Ok(());
        }

        let date = self.clock.local_date(start_at);
        let booked = self.active_on_day(rule.doctor_id, date).await?.len();
        if booked >= rule.max_appointments as usize {
            warn!("Doctor {} is at capacity ({}) on {}", rule.doctor_id, rule.max_appointments, date);
            return Err(AppointmentError::DailyCapacityReached(rule.max_appointments));
        }

        Ok(())
    }

    /// Calendar-blocking appointments starting on local `date`.
    async fn active_on_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let (day_start, day_end) = self.clock.day_bounds(date);
        let appointments = self.store.for_doctor_between(doctor_id, day_start, day_end).await?;

        Ok(appointments
            .into_iter()
            .filter(|appointment| appointment.blocks_calendar())
            .filter(|appointment| self.clock.local_date(appointment.start_at) == date)
            .collect())
    }

    // ==============================================================================
    // AVAILABILITY
    // ==============================================================================

    /// Resolve the rule for `date`, load the day's bookings and lay out the
    /// slot grid.
    pub async fn day_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        requested_duration: Option<u32>,
    ) -> Result<DayAvailability, AppointmentError> {
        let rule = self.resolver.resolve(doctor_id, date).await?;

        let (day_start, day_end) = self.clock.day_bounds(date);
        let booked: Vec<BookedInterval> = self.store
            .for_doctor_between(doctor_id, day_start, day_end)
            .await?
            .iter()
            .filter(|appointment| appointment.blocks_calendar())
            .map(Appointment::interval)
            .collect();

        let slots = self.calculator.compute_day(rule.as_ref(), &booked, date, requested_duration);

        let at_capacity = match &rule {
            Some(rule) if rule.has_daily_cap() => {
                self.active_on_day(doctor_id, date).await?.len() >= rule.max_appointments as usize
            }
            _ => false,
        };

        Ok(DayAvailability {
            doctor_id,
            date,
            rule_id: rule.map(|rule| rule.id),
            slots,
            at_capacity,
        })
    }

    // ==============================================================================
    // LIFECYCLE
    // ==============================================================================

    pub async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor: &Actor,
        extra: TransitionExtra,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        let old_status = current.status;

        self.lifecycle_service.authorize(actor, &current, new_status)?;
        self.lifecycle_service.validate_status_transition(old_status, new_status)?;

        let now = self.clock.now();
        let mut updated = current;
        updated.status = new_status;
        updated.updated_at = now;

        match new_status {
            AppointmentStatus::Approved => {
                updated.approved_at = Some(now);
                updated.approved_by = Some(actor.user_id);
            }
            AppointmentStatus::Cancelled | AppointmentStatus::Rejected => {
                updated.rejection_reason = extra.reason;
            }
            _ => {}
        }

        let updated = self.store
            .update_if_status(updated, old_status)
            .await?
            .ok_or(AppointmentError::ConcurrentModification)?;

        info!("Appointment {} moved {} -> {} by {} {}",
              appointment_id, old_status, new_status, actor.role, actor.user_id);

        match new_status {
            AppointmentStatus::Approved => {
                log_failure("confirmation", self.notifier.send_confirmation(&updated));
            }
            AppointmentStatus::Cancelled | AppointmentStatus::Rejected => {
                log_failure("cancellation", self.notifier.send_cancellation(&updated));
            }
            _ => {}
        }

        if self.lifecycle_service.should_notify_status_change(old_status, new_status) {
            log_failure(
                "status_changed",
                self.notifier.notify_status_changed(&updated, old_status, new_status),
            );
        }

        if old_status.blocks_calendar() && !new_status.blocks_calendar() {
            log_failure("calendar_changed", self.notifier.notify_calendar_changed(updated.doctor_id));
        }

        if old_status == AppointmentStatus::Pending {
            self.publish_pending_counter(updated.doctor_id).await;
        }

        Ok(updated)
    }

    pub async fn delete_appointment(&self, appointment_id: Uuid, actor: &Actor) -> Result<(), AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;
        self.lifecycle_service.authorize_delete(actor, &appointment)?;

        if !self.store.delete(appointment_id).await? {
            return Err(AppointmentError::NotFound(appointment_id));
        }

        info!("Appointment {} deleted by {} {}", appointment_id, actor.role, actor.user_id);

        log_failure("calendar_changed", self.notifier.notify_calendar_changed(appointment.doctor_id));
        if appointment.status == AppointmentStatus::Pending {
            self.publish_pending_counter(appointment.doctor_id).await;
        }

        Ok(())
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    pub async fn doctor_appointments(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if from >= to {
            return Err(AppointmentError::InvalidRequest(
                "Range start must precede its end".to_string(),
            ));
        }
        self.store.for_doctor_between(doctor_id, from, to).await
    }

    /// Future appointments of a patient that can still take place.
    pub async fn patient_upcoming(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.store.for_patient_from(patient_id, self.clock.now()).await?;
        Ok(appointments
            .into_iter()
            .filter(|appointment| !appointment.status.is_terminal())
            .collect())
    }

    async fn publish_pending_counter(&self, doctor_id: Uuid) {
        match self.store.count_for_doctor(doctor_id, AppointmentStatus::Pending).await {
            Ok(count) => log_failure(
                "pending_counter",
                self.notifier.notify_counter(CounterKind::PendingAppointments, count, doctor_id),
            ),
            Err(e) => warn!("Could not refresh pending counter for doctor {}: {}", doctor_id, e),
        }
    }
}
