//! Time zone aware truncation.
//!
//! Sub-day grains are truncated in absolute time. Day and coarser grains are
//! truncated on the wall clock of the calendar's zone and mapped back to an
//! instant: ambiguous local times resolve to the earliest instant, local times
//! inside a gap resolve to the first valid instant after it.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use chrono_tz::Tz;

use super::{GrainError, TimeGrain};

/// Longest DST gap searched when resolving a nonexistent local time.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Calendar settings for bucketing: zone, week start and year start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    tz: Tz,
    first_day_of_week: u32,
    first_month_of_year: u32,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl Calendar {
    /// Out-of-range week and month starts fall back to Monday and January.
    pub fn new(tz: Tz, first_day_of_week: u32, first_month_of_year: u32) -> Self {
        Self {
            tz,
            first_day_of_week: if (1..=7).contains(&first_day_of_week) {
                first_day_of_week
            } else {
                1
            },
            first_month_of_year: if (1..=12).contains(&first_month_of_year) {
                first_month_of_year
            } else {
                1
            },
        }
    }

    pub fn utc() -> Self {
        Self::new(Tz::UTC, 1, 1)
    }

    /// Build a calendar from an IANA zone name. An empty name means UTC.
    pub fn parse(
        time_zone: &str,
        first_day_of_week: u32,
        first_month_of_year: u32,
    ) -> Result<Self, GrainError> {
        let tz = parse_time_zone(time_zone)?;
        Ok(Self::new(tz, first_day_of_week, first_month_of_year))
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn first_day_of_week(&self) -> u32 {
        self.first_day_of_week
    }

    pub fn first_month_of_year(&self) -> u32 {
        self.first_month_of_year
    }

    /// Start of the bucket containing `instant`.
    pub fn truncate(
        &self,
        instant: DateTime<Utc>,
        grain: TimeGrain,
    ) -> Result<DateTime<Utc>, GrainError> {
        if let Some(step) = grain.fixed_millis() {
            let rem = instant.timestamp_millis().rem_euclid(step);
            return Ok(instant - Duration::milliseconds(rem));
        }
        let local = instant.with_timezone(&self.tz).date_naive();
        let start = self.truncate_local(local, grain)?;
        self.localize(start.and_time(chrono::NaiveTime::MIN))
    }

    /// Wall-clock date on which the bucket containing `date` starts.
    pub(crate) fn truncate_local(
        &self,
        date: NaiveDate,
        grain: TimeGrain,
    ) -> Result<NaiveDate, GrainError> {
        let (year, month) = (date.year(), date.month());
        let m0 = self.first_month_of_year;
        match grain {
            TimeGrain::Week => {
                let weekday = date.weekday().number_from_monday() as i64;
                let back = (weekday - self.first_day_of_week as i64).rem_euclid(7);
                Ok(date - Duration::days(back))
            }
            TimeGrain::Month => first_of_month(year, month),
            TimeGrain::Quarter => {
                let rel = (month as i32 - m0 as i32).rem_euclid(12);
                let start = (m0 as i32 - 1 + rel / 3 * 3) % 12 + 1;
                let year = if start > month as i32 { year - 1 } else { year };
                first_of_month(year, start as u32)
            }
            TimeGrain::Year => {
                let year = if month < m0 { year - 1 } else { year };
                first_of_month(year, m0)
            }
            // Day, and the sub-day grains when asked for their local date
            _ => Ok(date),
        }
    }

    /// Local midnight `k` buckets after `start`.
    pub(crate) fn step_local(
        &self,
        start: NaiveDate,
        grain: TimeGrain,
        k: u32,
    ) -> Result<NaiveDate, GrainError> {
        let stepped = match grain {
            TimeGrain::Week => start.checked_add_days(chrono::Days::new(7 * k as u64)),
            _ => match grain.months() {
                Some(months) => start.checked_add_months(Months::new(months * k)),
                None => start.checked_add_days(chrono::Days::new(k as u64)),
            },
        };
        stepped.ok_or(GrainError::OutOfRange)
    }

    /// Map a local wall-clock time in the calendar zone to an instant.
    pub fn localize(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, GrainError> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(a, b) => Ok(a.min(b).with_timezone(&Utc)),
            LocalResult::None => {
                // Inside a gap: the first wall-clock minute that exists is the
                // instant the gap ends.
                for minutes in 1..=MAX_GAP_MINUTES {
                    let probe = local + Duration::minutes(minutes);
                    if let Some(t) = self.tz.from_local_datetime(&probe).earliest() {
                        return Ok(t.with_timezone(&Utc));
                    }
                }
                Err(GrainError::OutOfRange)
            }
        }
    }
}

/// Start of the bucket containing `instant`, with Monday weeks and January years.
pub fn truncate(
    instant: DateTime<Utc>,
    grain: TimeGrain,
    tz: Tz,
) -> Result<DateTime<Utc>, GrainError> {
    Calendar::new(tz, 1, 1).truncate(instant, grain)
}

/// Parse an IANA zone name. Empty means UTC.
pub fn parse_time_zone(name: &str) -> Result<Tz, GrainError> {
    if name.is_empty() {
        return Ok(Tz::UTC);
    }
    name.parse::<Tz>()
        .map_err(|_| GrainError::UnknownTimeZone(name.to_string()))
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, GrainError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(GrainError::OutOfRange)
}
