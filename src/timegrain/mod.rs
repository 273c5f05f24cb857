//! Time grain engine: bucket alignment and dense bucket series.
//!
//! The engine answers two questions for a grain and a calendar (time zone,
//! first day of week, first month of year):
//!
//! - where does the bucket containing an instant start ([`Calendar::truncate`])
//! - which buckets cover a half-open range ([`Calendar::bucket_series`])
//!
//! The same rules are rendered into SQL by each dialect's `time_floor`, so
//! backend buckets line up with the series used for gap filling.

mod calendar;
mod grain;
mod series;

pub use calendar::{parse_time_zone, truncate, Calendar};
pub use grain::TimeGrain;
pub use series::DEFAULT_MAX_BUCKETS;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while aligning or enumerating buckets.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GrainError {
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("time range start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("time range produces more than {max} buckets")]
    TooManyBuckets { max: usize },

    #[error("bucket series is not strictly increasing at {at}")]
    NonMonotonic { at: DateTime<Utc> },

    #[error("timestamp out of supported range")]
    OutOfRange,
}

impl GrainError {
    /// Errors caused by the request rather than the engine.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, GrainError::NonMonotonic { .. })
    }
}
