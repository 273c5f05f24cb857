//! Dense bucket series over a half-open time range.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use super::{Calendar, GrainError, TimeGrain};

/// Default cap on the number of buckets a single series may produce.
pub const DEFAULT_MAX_BUCKETS: usize = 5000;

impl Calendar {
    /// Every bucket start from `truncate(start)` whose start is before `end`.
    ///
    /// Buckets are computed as `first + k * grain` rather than by repeated
    /// addition, so month-end and DST shifts never accumulate.
    pub fn bucket_series(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        grain: TimeGrain,
        max_buckets: usize,
    ) -> Result<Vec<DateTime<Utc>>, GrainError> {
        if start > end {
            return Err(GrainError::InvalidRange { start, end });
        }
        if start == end {
            return Ok(Vec::new());
        }

        let first = self.truncate(start, grain)?;
        let mut buckets: Vec<DateTime<Utc>> = Vec::new();

        match grain.fixed_millis() {
            Some(step) => {
                let span = (end - first).num_milliseconds();
                let count = (span + step - 1) / step;
                if count > max_buckets as i64 {
                    return Err(GrainError::TooManyBuckets { max: max_buckets });
                }
                for k in 0..count {
                    buckets.push(first + Duration::milliseconds(k * step));
                }
            }
            None => {
                let local_start = self.truncate_local(first.with_timezone(&self.tz()).date_naive(), grain)?;
                let mut k: u32 = 0;
                loop {
                    let date = self.step_local(local_start, grain, k)?;
                    let bucket = self.localize(date.and_time(NaiveTime::MIN))?;
                    if bucket >= end {
                        break;
                    }
                    if buckets.len() == max_buckets {
                        return Err(GrainError::TooManyBuckets { max: max_buckets });
                    }
                    if let Some(prev) = buckets.last() {
                        if bucket <= *prev {
                            return Err(GrainError::NonMonotonic { at: bucket });
                        }
                    }
                    buckets.push(bucket);
                    k += 1;
                }
            }
        }

        Ok(buckets)
    }
}
