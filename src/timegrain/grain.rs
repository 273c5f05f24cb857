//! Time grain levels.

use serde::{Deserialize, Serialize};

/// Bucket granularity, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGrain {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeGrain {
    pub const ALL: [TimeGrain; 9] = [
        TimeGrain::Millisecond,
        TimeGrain::Second,
        TimeGrain::Minute,
        TimeGrain::Hour,
        TimeGrain::Day,
        TimeGrain::Week,
        TimeGrain::Month,
        TimeGrain::Quarter,
        TimeGrain::Year,
    ];

    /// Parse a grain from its lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "millisecond" => Some(TimeGrain::Millisecond),
            "second" => Some(TimeGrain::Second),
            "minute" => Some(TimeGrain::Minute),
            "hour" => Some(TimeGrain::Hour),
            "day" => Some(TimeGrain::Day),
            "week" => Some(TimeGrain::Week),
            "month" => Some(TimeGrain::Month),
            "quarter" => Some(TimeGrain::Quarter),
            "year" => Some(TimeGrain::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGrain::Millisecond => "millisecond",
            TimeGrain::Second => "second",
            TimeGrain::Minute => "minute",
            TimeGrain::Hour => "hour",
            TimeGrain::Day => "day",
            TimeGrain::Week => "week",
            TimeGrain::Month => "month",
            TimeGrain::Quarter => "quarter",
            TimeGrain::Year => "year",
        }
    }

    /// Grains up to and including hour step in absolute time.
    pub fn is_sub_day(&self) -> bool {
        *self <= TimeGrain::Hour
    }

    /// Fixed width in milliseconds for sub-day grains.
    pub fn fixed_millis(&self) -> Option<i64> {
        match self {
            TimeGrain::Millisecond => Some(1),
            TimeGrain::Second => Some(1_000),
            TimeGrain::Minute => Some(60_000),
            TimeGrain::Hour => Some(3_600_000),
            _ => None,
        }
    }

    /// Calendar months per bucket for month and coarser grains.
    pub(crate) fn months(&self) -> Option<u32> {
        match self {
            TimeGrain::Month => Some(1),
            TimeGrain::Quarter => Some(3),
            TimeGrain::Year => Some(12),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
