//! Calendar-day deadline arithmetic and the injectable clock
use super::error::ValidationError;
use chrono::{DateTime, Days, TimeZone, Utc};
use std::sync::RwLock;

/// Clause 20.2.4: fully detailed claim within 84 days of the notice.
pub const CLAIM_DETAILS_PERIOD_DAYS: u32 = 84;
/// Clause 5.1: the Engineer's review period for a contractor's document.
pub const DOCUMENT_REVIEW_PERIOD_DAYS: u32 = 21;
/// Clause 3.7.3: time limit for agreement or determination.
pub const AGREEMENT_PERIOD_DAYS: u32 = 42;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Panics on an impossible calendar date; intended for fixtures and tests.
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Source of wall-clock time for every transition.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp {
        TimeStamp::new()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<TimeStamp>,
}

impl FixedClock {
    pub fn new(now: TimeStamp) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }
    pub fn set(&self, now: TimeStamp) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }
    pub fn advance_days(&self, days: u32) -> Result<TimeStamp, ValidationError> {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = add_days(*guard, days)?;
        Ok(*guard)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> TimeStamp {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn add_days(date: TimeStamp, days: u32) -> Result<TimeStamp, ValidationError> {
    date.0
        .checked_add_days(Days::new(u64::from(days)))
        .map(TimeStamp)
        .ok_or(ValidationError::DateOutOfRange)
}

/// Whole calendar days from `now` until `deadline`; negative once overdue.
pub fn days_remaining(deadline: TimeStamp, now: TimeStamp) -> i64 {
    (deadline.0.date_naive() - now.0.date_naive()).num_days()
}

/// `true` once `now` is past `deadline`, unless `status` is one of `exempt`.
pub fn is_overdue<S: PartialEq>(deadline: TimeStamp, now: TimeStamp, status: &S, exempt: &[S]) -> bool {
    if exempt.contains(status) {
        return false;
    }
    now > deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn leap_year_claim_window() {
        let notice = TimeStamp::new_with(2024, 1, 1, 0, 0, 0);
        let due = add_days(notice, CLAIM_DETAILS_PERIOD_DAYS).unwrap();
        assert_eq!(due, TimeStamp::new_with(2024, 3, 25, 0, 0, 0));
    }

    #[test]
    fn days_remaining_ignores_time_of_day() {
        let deadline = TimeStamp::new_with(2024, 1, 22, 9, 0, 0);
        let now = TimeStamp::new_with(2024, 1, 20, 23, 59, 0);
        assert_eq!(days_remaining(deadline, now), 2);
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(TimeStamp::new_with(2024, 1, 1, 0, 0, 0));
        clock.advance_days(21).unwrap();
        assert_eq!(clock.now(), TimeStamp::new_with(2024, 1, 22, 0, 0, 0));
    }
}
