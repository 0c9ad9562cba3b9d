use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use tracing::warn;

use shared_config::AppConfig;

/// Source of "now" and of civil-date conversion in the clinic's timezone.
///
/// Instants are always stored as UTC; every date or time-of-day comparison
/// goes through the clock's fixed offset so that no component depends on
/// process-wide timezone state.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn offset(&self) -> FixedOffset;

    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&self.offset())
    }

    fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset()).date_naive()
    }

    fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.offset()).time()
    }

    /// The UTC instant of `time` on civil `date` in the clinic's timezone.
    fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        local_to_utc(date, time, self.offset())
    }

    /// Start of the civil day `date` and of the day after, as UTC instants.
    fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.instant_at(date, NaiveTime::MIN);
        (start, start + Duration::days(1))
    }
}

/// Civil `time` on `date` at a fixed `offset`, as a UTC instant. Fixed
/// offsets have no gaps or folds, so the mapping is total.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&(date.and_time(time) - shift))
}

/// Wall clock pinned to the clinic's fixed civil offset.
#[derive(Debug, Clone, Copy)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_offset_minutes(config.clinic_utc_offset_minutes).unwrap_or_else(|| {
            warn!(
                "Invalid clinic offset {} minutes, falling back to UTC",
                config.clinic_utc_offset_minutes
            );
            Self::new(Utc.fix())
        })
    }
}

impl Clock for ClinicClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Manually driven clock for tests and job replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { now: Mutex::new(now), offset }
    }

    /// Clock whose current time is `time` on civil `date` at `offset`.
    pub fn at_local(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Self {
        Self::new(local_to_utc(date, time, offset), offset)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
