use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shared_config::AppConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Expirer,
    Reminder,
    RetentionPurge,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Expirer => write!(f, "expirer"),
            JobKind::Reminder => write!(f, "reminder"),
            JobKind::RetentionPurge => write!(f, "retention_purge"),
        }
    }
}

/// Outcome of one job run. Rows that matched but were neither processed nor
/// failed were taken over by a concurrent writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobReport {
    pub job: JobKind,
    pub matched: usize,
    pub processed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
}

impl JobReport {
    pub fn new(job: JobKind, started_at: DateTime<Utc>) -> Self {
        Self {
            job,
            matched: 0,
            processed: 0,
            failed: 0,
            started_at,
        }
    }

    pub fn skipped(&self) -> usize {
        self.matched.saturating_sub(self.processed + self.failed)
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub expirer_interval: Duration,
    pub reminder_interval: Duration,
    pub retention_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            expirer_interval: Duration::from_secs(10 * 60),
            reminder_interval: Duration::from_secs(5 * 60),
            retention_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl MaintenanceConfig {
    /// Zero intervals keep the default cadence.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            expirer_interval: non_zero_or(config.expirer_interval(), defaults.expirer_interval),
            reminder_interval: non_zero_or(config.reminder_interval(), defaults.reminder_interval),
            retention_interval: non_zero_or(config.retention_interval(), defaults.retention_interval),
        }
    }
}

fn non_zero_or(interval: Duration, default: Duration) -> Duration {
    if interval.is_zero() {
        default
    } else {
        interval
    }
}
