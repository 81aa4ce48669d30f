//! Wall-clock access and school-day arithmetic.
//!
//! Every time-driven rule reads "now" through [`Clock`] so jobs and lifecycle
//! checks can be driven deterministically. Day boundaries are computed in the
//! school's fixed UTC offset, not in UTC.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Calendar helpers bound to the school's UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SchoolCalendar {
    offset: FixedOffset,
}

impl SchoolCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar date of `instant`.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// `[00:00, 24:00)` of `date` in school time, as UTC instants.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.midnight(date);
        (start, start + Duration::days(1))
    }

    /// First instant after the school day containing `instant`.
    pub fn end_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.day_bounds(self.date_of(instant)).1
    }

    /// Window covering the whole of tomorrow relative to `now`.
    pub fn tomorrow(&self, now: DateTime<Utc>) -> (NaiveDate, DateTime<Utc>, DateTime<Utc>) {
        let date = self.date_of(now) + Duration::days(1);
        let (start, end) = self.day_bounds(date);
        (date, start, end)
    }

    /// Formats an instant as a local `dd/mm/yyyy` string for messages.
    pub fn format_date(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset).format("%d/%m/%Y").to_string()
    }

    fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        // Fixed offsets have no gaps, so the local midnight always exists.
        self.offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc())
    }
}
