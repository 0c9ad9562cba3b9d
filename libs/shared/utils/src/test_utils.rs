use chrono::{FixedOffset, NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Actor, UserRole};

use crate::clock::FixedClock;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            ..AppConfig::default()
        }
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl TestUser {
    pub fn new(role: UserRole) -> Self {
        Self { id: Uuid::new_v4(), role }
    }

    pub fn doctor() -> Self {
        Self::new(UserRole::Doctor)
    }

    pub fn patient() -> Self {
        Self::new(UserRole::Patient)
    }

    pub fn admin() -> Self {
        Self::new(UserRole::Admin)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// UTC-05:00, the clinic's civil offset.
pub fn clinic_offset() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).expect("valid offset")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

/// A clock frozen at local `h:m` on the given civil date.
pub fn clock_at(day: NaiveDate, h: u32, m: u32) -> FixedClock {
    FixedClock::at_local(day, time(h, m), clinic_offset())
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn weekly_rule_response(rule_id: Uuid, doctor_id: Uuid, day_of_week: u8) -> serde_json::Value {
        json!({
            "id": rule_id,
            "doctor_id": doctor_id,
            "type": "weekly_recurring",
            "day_of_week": day_of_week,
            "is_available": true,
            "time_slots": [
                { "start_time": "09:00:00", "end_time": "17:00:00", "label": "Consultas" }
            ],
            "break_window": null,
            "slot_duration": 30,
            "buffer_time": 0,
            "max_appointments": 0,
            "priority": 4,
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        appointment_id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
        start_at: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "start_at": start_at,
            "duration_minutes": 30,
            "status": status,
            "reminder_sent": false,
            "approved_by": null,
            "approved_at": null,
            "rejection_reason": null,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn profile_response(user_id: Uuid, role: &str) -> serde_json::Value {
        json!({
            "id": user_id,
            "role": role
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
