#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use mantis_metrics::timegrain::{Calendar, GrainError, TimeGrain, DEFAULT_MAX_BUCKETS};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn series(cal: &Calendar, start: &str, end: &str, grain: TimeGrain) -> Vec<DateTime<Utc>> {
        cal.bucket_series(utc(start), utc(end), grain, DEFAULT_MAX_BUCKETS)
            .unwrap()
    }

    #[test]
    fn test_spring_forward_day_has_23_hours() {
        let cal = Calendar::parse("America/New_York", 1, 1).unwrap();
        let hours = series(
            &cal,
            "2023-03-12T05:00:00Z",
            "2023-03-13T04:00:00Z",
            TimeGrain::Hour,
        );
        assert_eq!(hours.len(), 23);
    }

    #[test]
    fn test_fall_back_day_has_25_hours() {
        let cal = Calendar::parse("America/New_York", 1, 1).unwrap();
        let hours = series(
            &cal,
            "2023-11-05T04:00:00Z",
            "2023-11-06T05:00:00Z",
            TimeGrain::Hour,
        );
        assert_eq!(hours.len(), 25);
    }

    #[test]
    fn test_days_across_dst_follow_local_midnight() {
        let cal = Calendar::parse("America/New_York", 1, 1).unwrap();
        let days = series(
            &cal,
            "2023-03-11T05:00:00Z",
            "2023-03-14T04:00:00Z",
            TimeGrain::Day,
        );
        assert_eq!(
            days,
            vec![
                utc("2023-03-11T05:00:00Z"),
                utc("2023-03-12T05:00:00Z"),
                utc("2023-03-13T04:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_months_do_not_drift() {
        let cal = Calendar::utc();
        let months = series(
            &cal,
            "2023-01-31T00:00:00Z",
            "2023-05-01T00:00:00Z",
            TimeGrain::Month,
        );
        assert_eq!(
            months,
            vec![
                utc("2023-01-01T00:00:00Z"),
                utc("2023-02-01T00:00:00Z"),
                utc("2023-03-01T00:00:00Z"),
                utc("2023-04-01T00:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_series_is_dense_and_aligned_for_every_grain() {
        let zones = ["UTC", "America/New_York", "Australia/Lord_Howe", "Asia/Kathmandu"];
        let ranges = [
            (TimeGrain::Millisecond, "2023-11-05T05:59:59Z", "2023-11-05T06:00:01Z"),
            (TimeGrain::Second, "2023-11-05T05:30:00Z", "2023-11-05T06:30:00Z"),
            (TimeGrain::Minute, "2023-11-05T03:00:00Z", "2023-11-05T07:00:00Z"),
            (TimeGrain::Hour, "2023-10-01T00:00:00Z", "2023-11-10T00:00:00Z"),
            (TimeGrain::Day, "2023-01-01T00:00:00Z", "2024-01-01T00:00:00Z"),
            (TimeGrain::Week, "2023-01-01T00:00:00Z", "2024-01-01T00:00:00Z"),
            (TimeGrain::Month, "2020-01-15T00:00:00Z", "2024-01-01T00:00:00Z"),
            (TimeGrain::Quarter, "2020-01-15T00:00:00Z", "2024-01-01T00:00:00Z"),
            (TimeGrain::Year, "2000-06-01T00:00:00Z", "2024-01-01T00:00:00Z"),
        ];

        for zone in zones {
            let cal = Calendar::parse(zone, 7, 4).unwrap();
            for (grain, start, end) in ranges {
                let buckets = series(&cal, start, end, grain);
                assert!(!buckets.is_empty());
                assert_eq!(buckets[0], cal.truncate(utc(start), grain).unwrap());
                assert!(*buckets.last().unwrap() < utc(end));
                for pair in buckets.windows(2) {
                    assert!(pair[0] < pair[1], "{} {} not increasing", zone, grain);
                    // No slot is skipped between neighbours
                    let prev = cal
                        .truncate(pair[1] - Duration::milliseconds(1), grain)
                        .unwrap();
                    assert_eq!(prev, pair[0], "{} {} gap at {}", zone, grain, pair[0]);
                }
                for b in &buckets {
                    assert_eq!(cal.truncate(*b, grain).unwrap(), *b);
                }
            }
        }
    }

    #[test]
    fn test_max_buckets_is_enforced() {
        let cal = Calendar::utc();
        let err = cal
            .bucket_series(
                utc("2023-01-01T00:00:00Z"),
                utc("2023-01-01T00:00:10Z"),
                TimeGrain::Millisecond,
                DEFAULT_MAX_BUCKETS,
            )
            .unwrap_err();
        assert_eq!(err, GrainError::TooManyBuckets { max: 5000 });

        let err = cal
            .bucket_series(
                utc("2000-01-01T00:00:00Z"),
                utc("2030-01-01T00:00:00Z"),
                TimeGrain::Day,
                365,
            )
            .unwrap_err();
        assert_eq!(err, GrainError::TooManyBuckets { max: 365 });
    }

    #[test]
    fn test_start_equal_end_is_empty() {
        let cal = Calendar::utc();
        assert!(series(&cal, "2023-01-01T00:00:00Z", "2023-01-01T00:00:00Z", TimeGrain::Hour)
            .is_empty());
    }
}
