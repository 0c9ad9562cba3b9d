use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Colombia has no daylight saving time, so a fixed offset is exact.
pub const DEFAULT_CLINIC_UTC_OFFSET_MINUTES: i32 = -300;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub clinic_utc_offset_minutes: i32,
    pub expirer_interval_seconds: u64,
    pub reminder_interval_seconds: u64,
    pub retention_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            clinic_utc_offset_minutes: DEFAULT_CLINIC_UTC_OFFSET_MINUTES,
            expirer_interval_seconds: 600,
            reminder_interval_seconds: 300,
            retention_interval_seconds: 86_400,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset_minutes: parse_var(
                "CLINIC_UTC_OFFSET_MINUTES",
                defaults.clinic_utc_offset_minutes,
            ),
            expirer_interval_seconds: parse_interval(
                "EXPIRER_INTERVAL_SECONDS",
                defaults.expirer_interval_seconds,
            ),
            reminder_interval_seconds: parse_interval(
                "REMINDER_INTERVAL_SECONDS",
                defaults.reminder_interval_seconds,
            ),
            retention_interval_seconds: parse_interval(
                "RETENTION_INTERVAL_SECONDS",
                defaults.retention_interval_seconds,
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }

    pub fn expirer_interval(&self) -> Duration {
        Duration::from_secs(self.expirer_interval_seconds)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_seconds)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_seconds)
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Like [`parse_var`], but a zero interval falls back to the default.
fn parse_interval(name: &str, default: u64) -> u64 {
    match parse_var(name, default) {
        0 => {
            warn!("{} must be greater than zero, using default {}", name, default);
            default
        }
        seconds => seconds,
    }
}
