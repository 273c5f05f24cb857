#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use mantis_metrics::engine::Identity;
    use mantis_metrics::model::{
        AggregationQuery, DimensionSelection, FilterExpression, MetricsQuery, Operator, Sort,
        TimeRange, ToplistQuery, TotalsQuery,
    };
    use mantis_metrics::query::{compile_statement, QueryContext};
    use mantis_metrics::result::Value;
    use mantis_metrics::sql::Dialect;
    use mantis_metrics::timegrain::TimeGrain;
    use mantis_metrics::QueryError;

    use super::common::{sales_view, sqlite_service, utc};

    fn toplist(limit: Option<u64>) -> ToplistQuery {
        ToplistQuery {
            view: "sales".into(),
            dimension: "country".into(),
            measures: vec!["revenue".into(), "orders".into()],
            filter: None,
            time_range: None,
            sort: vec![],
            limit,
            offset: None,
        }
    }

    fn aggregation(dimensions: Vec<DimensionSelection>, measures: &[&str]) -> AggregationQuery {
        AggregationQuery {
            view: "sales".into(),
            dimensions,
            measures: measures.iter().map(|m| m.to_string()).collect(),
            filter: None,
            having: None,
            time_range: None,
            sort: vec![],
            limit: None,
            offset: None,
        }
    }

    fn column(result: &mantis_metrics::QueryResult, name: &str) -> Vec<Value> {
        result
            .rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    #[tokio::test]
    async fn test_toplist_defaults_to_first_measure_desc() {
        let service = sqlite_service();
        let result = service
            .toplist(&Identity::anonymous(), toplist(None), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            column(&result, "country"),
            vec![Value::from("NO"), Value::from("SE"), Value::Null, Value::from("DK")]
        );
        assert_eq!(
            column(&result, "revenue"),
            vec![Value::Int(30), Value::Int(12), Value::Int(3), Value::Int(1)]
        );
        assert_eq!(result.columns.len(), 3);
    }

    #[tokio::test]
    async fn test_toplist_limit_offset_and_filter() {
        let service = sqlite_service();
        let mut q = toplist(Some(1));
        q.offset = Some(1);
        q.filter = Some(FilterExpression::compare(Operator::Eq, "channel", "web"));
        let result = service
            .toplist(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        // web revenue: SE 12, NO 10, DK 1
        assert_eq!(column(&result, "country"), vec![Value::from("NO")]);
        assert_eq!(column(&result, "orders"), vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn test_toplist_time_range_is_half_open() {
        let service = sqlite_service();
        let mut q = toplist(None);
        q.time_range = Some(TimeRange::new(
            utc("2024-01-02T00:00:00Z"),
            utc("2024-01-04T08:00:00Z"),
        ));
        let result = service
            .toplist(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(column(&result, "country"), vec![Value::from("NO"), Value::from("SE")]);
        assert_eq!(column(&result, "revenue"), vec![Value::Int(20), Value::Int(5)]);
    }

    #[tokio::test]
    async fn test_toplist_rejects_zero_limit_and_unknown_measure() {
        let service = sqlite_service();
        let err = service
            .toplist(&Identity::anonymous(), toplist(Some(0)), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_client_fault());

        let mut q = toplist(None);
        q.measures = vec!["profit".into()];
        let err = service
            .toplist(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_totals() {
        let service = sqlite_service();
        let q = TotalsQuery {
            view: "sales".into(),
            measures: vec!["orders".into(), "revenue".into()],
            filter: Some(FilterExpression::compare(Operator::Eq, "channel", "web")),
            time_range: None,
        };
        let result = service
            .totals(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(4)));
        assert_eq!(result.rows[0].get("revenue"), Some(&Value::Int(23)));
    }

    #[tokio::test]
    async fn test_time_range_applies_to_every_branch_of_an_or_filter() {
        let service = sqlite_service();
        let q = TotalsQuery {
            view: "sales".into(),
            measures: vec!["orders".into()],
            filter: Some(FilterExpression::or(vec![
                FilterExpression::compare(Operator::Eq, "country", "SE"),
                FilterExpression::compare(Operator::Eq, "country", "DK"),
            ])),
            time_range: Some(TimeRange::new(
                utc("2024-01-01T00:00:00Z"),
                utc("2024-01-03T00:00:00Z"),
            )),
        };
        let result = service
            .totals(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        // order 3 is the only SE or DK order before Jan 3
        assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_totals_over_empty_range() {
        let service = sqlite_service();
        let q = TotalsQuery {
            view: "sales".into(),
            measures: vec!["orders".into(), "revenue".into()],
            filter: None,
            time_range: Some(TimeRange::new(
                utc("2023-01-01T00:00:00Z"),
                utc("2023-02-01T00:00:00Z"),
            )),
        };
        let result = service
            .totals(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(0)));
        assert_eq!(result.rows[0].get("revenue"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_aggregation_having() {
        let service = sqlite_service();
        let mut q = aggregation(vec!["country".into()], &["revenue"]);
        q.having = Some(FilterExpression::compare(Operator::Gte, "revenue", 10));
        q.sort = vec![Sort::asc("country")];
        let result = service
            .aggregation(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(column(&result, "country"), vec![Value::from("NO"), Value::from("SE")]);
    }

    #[tokio::test]
    async fn test_aggregation_multi_valued_dimension() {
        let service = sqlite_service();
        let mut q = aggregation(vec!["tags".into()], &["orders"]);
        q.sort = vec![Sort::desc("orders")];
        let result = service
            .aggregation(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            column(&result, "tags"),
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
        assert_eq!(
            column(&result, "orders"),
            vec![Value::Int(2), Value::Int(2), Value::Int(1)]
        );
    }

    #[tokio::test]
    async fn test_aggregation_by_day() {
        let service = sqlite_service();
        let mut q = aggregation(
            vec![DimensionSelection::new("created_at").with_grain(TimeGrain::Day)],
            &["orders"],
        );
        q.sort = vec![Sort::asc("created_at")];
        let result = service
            .aggregation(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            column(&result, "created_at"),
            vec![
                Value::from("2024-01-01T00:00:00Z"),
                Value::from("2024-01-02T00:00:00Z"),
                Value::from("2024-01-04T00:00:00Z"),
                Value::from("2024-01-05T00:00:00Z"),
            ]
        );
        assert_eq!(
            column(&result, "orders"),
            vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(1)]
        );
    }

    #[tokio::test]
    async fn test_aggregation_without_dimensions_is_totals() {
        let service = sqlite_service();
        let q = aggregation(vec![], &["orders"]);
        let result = service
            .aggregation(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(6)));
    }

    #[test]
    fn test_grain_on_plain_dimension_is_invalid() {
        let view = sales_view();
        let ctx = QueryContext::new(&view, Dialect::DuckDb);
        let q = aggregation(
            vec![DimensionSelection::new("country").with_grain(TimeGrain::Day)],
            &["orders"],
        );
        let err = compile_statement(&ctx, &MetricsQuery::Aggregation(q)).unwrap_err();
        assert!(err.is_client_fault());
    }

    #[test]
    fn test_duckdb_day_grain_binds_time_zone() {
        let view = sales_view();
        let ctx = QueryContext::new(&view, Dialect::DuckDb);
        let mut q = aggregation(
            vec![DimensionSelection::new("created_at").with_grain(TimeGrain::Day)],
            &["orders"],
        );
        q.time_range = Some(
            TimeRange::new(utc("2024-01-01T00:00:00Z"), utc("2024-02-01T00:00:00Z"))
                .with_time_zone("Europe/Oslo"),
        );
        let (sql, args) = compile_statement(&ctx, &MetricsQuery::Aggregation(q))
            .unwrap()
            .to_sql_with_args(Dialect::DuckDb);
        assert!(sql.contains("DATE_TRUNC('day'"), "{}", sql);
        assert!(args.contains(&json!("Europe/Oslo")), "{:?}", args);
    }
}
