#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use mantis_metrics::engine::Identity;
    use mantis_metrics::model::{FilterExpression, Operator, TimeRange, TimeSeriesQuery};
    use mantis_metrics::result::{Column, DataType, RawValue, Value};
    use mantis_metrics::sql::Dialect;
    use mantis_metrics::timegrain::TimeGrain;
    use mantis_metrics::{MetricsService, QueryError};

    use super::common::{catalog, sqlite_service, utc, Script, ScriptedEngine};

    fn request(grain: TimeGrain, start: &str, end: &str) -> TimeSeriesQuery {
        TimeSeriesQuery {
            view: "sales".into(),
            measures: vec!["orders".into(), "revenue".into()],
            filter: None,
            time_range: TimeRange::new(utc(start), utc(end)).with_grain(grain),
        }
    }

    fn values(result: &mantis_metrics::QueryResult, name: &str) -> Vec<Value> {
        result
            .rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    #[tokio::test]
    async fn test_daily_series_fills_gaps() {
        let service = sqlite_service();
        let result = service
            .time_series(
                &Identity::anonymous(),
                request(TimeGrain::Day, "2024-01-01T00:00:00Z", "2024-01-06T00:00:00Z"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            values(&result, "created_at"),
            vec![
                Value::from("2024-01-01T00:00:00Z"),
                Value::from("2024-01-02T00:00:00Z"),
                Value::from("2024-01-03T00:00:00Z"),
                Value::from("2024-01-04T00:00:00Z"),
                Value::from("2024-01-05T00:00:00Z"),
            ]
        );
        assert_eq!(
            values(&result, "orders"),
            vec![Value::Int(1), Value::Int(2), Value::Null, Value::Int(2), Value::Int(1)]
        );
        assert_eq!(
            values(&result, "revenue"),
            vec![Value::Int(10), Value::Int(25), Value::Null, Value::Int(10), Value::Int(1)]
        );
        assert_eq!(result.columns[0].data_type, DataType::Timestamp);
        assert_eq!(result.columns[1].data_type, DataType::Int);
    }

    #[tokio::test]
    async fn test_series_respects_filter() {
        let service = sqlite_service();
        let mut q = request(TimeGrain::Day, "2024-01-04T00:00:00Z", "2024-01-06T00:00:00Z");
        q.filter = Some(FilterExpression::compare(Operator::Eq, "channel", "app"));
        let result = service
            .time_series(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(values(&result, "orders"), vec![Value::Int(1), Value::Null]);
    }

    #[tokio::test]
    async fn test_empty_range_has_no_buckets() {
        let service = sqlite_service();
        let result = service
            .time_series(
                &Identity::anonymous(),
                request(TimeGrain::Day, "2024-01-02T00:00:00Z", "2024-01-02T00:00:00Z"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_rejects_local_time_zone() {
        let service = sqlite_service();
        let mut q = request(TimeGrain::Day, "2024-01-01T00:00:00Z", "2024-01-06T00:00:00Z");
        q.time_range = q.time_range.with_time_zone("Europe/Oslo");
        let err = service
            .time_series(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_client_fault(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_time_zone_is_invalid() {
        let service = sqlite_service();
        let mut q = request(TimeGrain::Day, "2024-01-01T00:00:00Z", "2024-01-06T00:00:00Z");
        q.time_range = q.time_range.with_time_zone("Mars/Olympus");
        let err = service
            .time_series(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_client_fault(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_oslo_months_from_backend_timestamps() {
        let columns = vec![
            Column::new("created_at", DataType::Unknown),
            Column::new("orders", DataType::Unknown),
            Column::new("revenue", DataType::Unknown),
        ];
        let rows = vec![vec![
            RawValue::Timestamp(utc("2024-01-31T23:00:00Z")),
            RawValue::Int(3),
            RawValue::Int(30),
        ]];
        let engine = ScriptedEngine::new(Dialect::DuckDb).then(Script::Rows(columns, rows));
        let service = MetricsService::new(Arc::new(catalog()), Arc::new(engine));

        let mut q = request(TimeGrain::Month, "2024-01-15T00:00:00Z", "2024-03-15T00:00:00Z");
        q.time_range = q.time_range.with_time_zone("Europe/Oslo");
        let result = service
            .time_series(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            values(&result, "created_at"),
            vec![
                Value::from("2023-12-31T23:00:00Z"),
                Value::from("2024-01-31T23:00:00Z"),
                Value::from("2024-02-29T23:00:00Z"),
            ]
        );
        assert_eq!(values(&result, "orders"), vec![Value::Null, Value::Int(3), Value::Null]);
    }

    #[tokio::test]
    async fn test_misaligned_backend_bucket_is_internal() {
        let columns = vec![
            Column::new("created_at", DataType::Unknown),
            Column::new("orders", DataType::Unknown),
            Column::new("revenue", DataType::Unknown),
        ];
        let rows = vec![vec![
            RawValue::Text("2024-01-02 06:00:00".into()),
            RawValue::Int(1),
            RawValue::Int(1),
        ]];
        let engine = ScriptedEngine::new(Dialect::DuckDb).then(Script::Rows(columns, rows));
        let service = MetricsService::new(Arc::new(catalog()), Arc::new(engine));
        let err = service
            .time_series(
                &Identity::anonymous(),
                request(TimeGrain::Day, "2024-01-01T00:00:00Z", "2024-01-06T00:00:00Z"),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)), "{:?}", err);
    }
}
