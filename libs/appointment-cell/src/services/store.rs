// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::time::{overlaps, widen};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::conflict::find_conflicts;

/// Persistence boundary for appointments.
///
/// Writes that depend on the current state are conditional so that callers
/// never need exclusive access to the table.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert unless an appointment blocking the doctor's calendar overlaps
    /// the new one widened by `margin_minutes`. Check and insert are atomic;
    /// a collision fails with [`AppointmentError::ConflictDetected`].
    async fn insert_exclusive(
        &self,
        appointment: Appointment,
        margin_minutes: i64,
    ) -> Result<Appointment, AppointmentError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Replace the record only if its stored status is still `expected`.
    async fn update_if_status(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Flip `reminder_sent` from false to true while the appointment is still
    /// approved. Returns whether this caller won the claim.
    async fn claim_reminder(&self, appointment_id: Uuid) -> Result<bool, AppointmentError>;

    async fn release_reminder(&self, appointment_id: Uuid) -> Result<(), AppointmentError>;

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, AppointmentError>;

    /// Appointments of any status whose interval intersects `[from, to)`.
    async fn for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn for_patient_from(
        &self,
        patient_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Appointments in one of `statuses` starting strictly before `before`.
    async fn with_status_before(
        &self,
        statuses: &[AppointmentStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Approved appointments without a reminder starting in `[from, to)`.
    async fn reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn count_for_doctor(
        &self,
        doctor_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<u64, AppointmentError>;

    /// Hard-delete appointments in one of `statuses` starting before `before`.
    async fn purge(
        &self,
        statuses: &[AppointmentStatus],
        before: DateTime<Utc>,
    ) -> Result<u64, AppointmentError>;
}

fn by_start(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|appointment| (appointment.start_at, appointment.id));
    appointments
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Process-local store. A single mutex serializes every write, which makes
/// `insert_exclusive` a true check-and-insert.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: Mutex<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, bypassing conflict checks. Used to seed history.
    pub async fn seed(&self, appointment: Appointment) {
        self.appointments.lock().await.insert(appointment.id, appointment);
    }

    pub async fn all(&self) -> Vec<Appointment> {
        by_start(self.appointments.lock().await.values().cloned().collect())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert_exclusive(
        &self,
        appointment: Appointment,
        margin_minutes: i64,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        let existing: Vec<Appointment> = appointments
            .values()
            .filter(|other| other.doctor_id == appointment.doctor_id && other.blocks_calendar())
            .cloned()
            .collect();

        let (wide_start, wide_end) = widen(appointment.start_at, appointment.end_at(), margin_minutes);
        if !find_conflicts(wide_start, wide_end, &existing).is_empty() {
            warn!("Rejected insert of appointment {}: slot already taken", appointment.id);
            return Err(AppointmentError::ConflictDetected);
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().await.get(&appointment_id).cloned())
    }

    async fn update_if_status(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut appointments = self.appointments.lock().await;
        match appointments.get_mut(&appointment.id) {
            Some(stored) if stored.status == expected => {
                *stored = appointment.clone();
                Ok(Some(appointment))
            }
            Some(_) => Ok(None),
            None => Err(AppointmentError::NotFound(appointment.id)),
        }
    }

    async fn claim_reminder(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let mut appointments = self.appointments.lock().await;
        match appointments.get_mut(&appointment_id) {
            Some(stored) if stored.status == AppointmentStatus::Approved && !stored.reminder_sent => {
                stored.reminder_sent = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppointmentError::NotFound(appointment_id)),
        }
    }

    async fn release_reminder(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let mut appointments = self.appointments.lock().await;
        let stored = appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound(appointment_id))?;
        stored.reminder_sent = false;
        Ok(())
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        Ok(self.appointments.lock().await.remove(&appointment_id).is_some())
    }

    async fn for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(by_start(
            appointments
                .values()
                .filter(|a| a.doctor_id == doctor_id && overlaps(a.start_at, a.end_at(), from, to))
                .cloned()
                .collect(),
        ))
    }

    async fn for_patient_from(
        &self,
        patient_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(by_start(
            appointments
                .values()
                .filter(|a| a.patient_id == patient_id && a.start_at >= from)
                .cloned()
                .collect(),
        ))
    }

    async fn with_status_before(
        &self,
        statuses: &[AppointmentStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(by_start(
            appointments
                .values()
                .filter(|a| statuses.contains(&a.status) && a.start_at < before)
                .cloned()
                .collect(),
        ))
    }

    async fn reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(by_start(
            appointments
                .values()
                .filter(|a| {
                    a.status == AppointmentStatus::Approved
                        && !a.reminder_sent
                        && from <= a.start_at
                        && a.start_at < to
                })
                .cloned()
                .collect(),
        ))
    }

    async fn count_for_doctor(
        &self,
        doctor_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<u64, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.status == status)
            .count() as u64)
    }

    async fn purge(
        &self,
        statuses: &[AppointmentStatus],
        before: DateTime<Utc>,
    ) -> Result<u64, AppointmentError> {
        let mut appointments = self.appointments.lock().await;
        let before_count = appointments.len();
        appointments.retain(|_, a| !(statuses.contains(&a.status) && a.start_at < before));
        Ok((before_count - appointments.len()) as u64)
    }
}

// ==============================================================================
// SUPABASE STORE
// ==============================================================================

/// Appointments in the `appointments` table behind PostgREST. The table is
/// expected to carry a generated `end_at` column and an exclusion constraint
/// on `(doctor_id, tstzrange(start_at, end_at))` for calendar-blocking rows;
/// `rpc/book_appointment` performs the widened check and the insert in one
/// transaction and reports collisions as HTTP 409.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn timestamp(instant: DateTime<Utc>) -> String {
        instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn status_list(statuses: &[AppointmentStatus]) -> String {
        let names: Vec<String> = statuses.iter().map(|status| status.to_string()).collect();
        format!("in.({})", names.join(","))
    }

    fn encode(appointment: &Appointment) -> Result<Value, AppointmentError> {
        serde_json::to_value(appointment)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to encode appointment: {}", e)))
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Fetching appointments: {}", path);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, path, None).await?;
        Ok(rows)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert_exclusive(
        &self,
        appointment: Appointment,
        margin_minutes: i64,
    ) -> Result<Appointment, AppointmentError> {
        let body = json!({
            "appointment": Self::encode(&appointment)?,
            "margin_minutes": margin_minutes,
        });

        let stored: Appointment = self.supabase.request(
            Method::POST,
            "/rest/v1/rpc/book_appointment",
            Some(body),
        ).await?;

        Ok(stored)
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn update_if_status(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, expected
        );

        let rows: Vec<Appointment> = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(Self::encode(&appointment)?),
        ).await?;

        Ok(rows.into_iter().next())
    }

    async fn claim_reminder(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.approved&reminder_sent=eq.false",
            appointment_id
        );

        let rows: Vec<Value> = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(json!({ "reminder_sent": true })),
        ).await?;

        Ok(!rows.is_empty())
    }

    async fn release_reminder(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let _: Vec<Value> = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(json!({ "reminder_sent": false })),
        ).await?;

        Ok(())
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase.request_returning(Method::DELETE, &path, None).await?;
        Ok(!rows.is_empty())
    }

    async fn for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&start_at=lt.{}&end_at=gt.{}&order=start_at.asc",
            doctor_id,
            Self::timestamp(to),
            Self::timestamp(from)
        );
        self.fetch(&path).await
    }

    async fn for_patient_from(
        &self,
        patient_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&start_at=gte.{}&order=start_at.asc",
            patient_id,
            Self::timestamp(from)
        );
        self.fetch(&path).await
    }

    async fn with_status_before(
        &self,
        statuses: &[AppointmentStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?status={}&start_at=lt.{}&order=start_at.asc",
            Self::status_list(statuses),
            Self::timestamp(before)
        );
        self.fetch(&path).await
    }

    async fn reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?status=eq.{}&reminder_sent=eq.false&start_at=gte.{}&start_at=lt.{}&order=start_at.asc",
            AppointmentStatus::Approved,
            Self::timestamp(from),
            Self::timestamp(to)
        );
        self.fetch(&path).await
    }

    async fn count_for_doctor(
        &self,
        doctor_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<u64, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.{}&select=id",
            doctor_id, status
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.len() as u64)
    }

    async fn purge(
        &self,
        statuses: &[AppointmentStatus],
        before: DateTime<Utc>,
    ) -> Result<u64, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?status={}&start_at=lt.{}",
            Self::status_list(statuses),
            Self::timestamp(before)
        );
        let rows: Vec<Value> = self.supabase.request_returning(Method::DELETE, &path, None).await?;
        Ok(rows.len() as u64)
    }
}
