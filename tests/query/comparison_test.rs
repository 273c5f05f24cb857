#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use mantis_metrics::engine::Identity;
    use mantis_metrics::model::{ComparisonQuery, ComparisonSort, ComparisonSortKind, TimeRange};
    use mantis_metrics::query::{ComparisonPlan, QueryContext};
    use mantis_metrics::result::{Column, DataType, RawValue, Value};
    use mantis_metrics::sql::Dialect;
    use mantis_metrics::{MetricsService, QueryError};

    use super::common::{
        catalog, sqlite, sqlite_service, traffic_view, utc, Script, ScriptedEngine,
    };

    fn request(kind: ComparisonSortKind, limit: Option<u64>) -> ComparisonQuery {
        ComparisonQuery {
            view: "traffic".into(),
            dimension: "site".into(),
            measures: vec!["events".into()],
            filter: None,
            time_range: TimeRange::new(utc("2024-02-01T00:00:00Z"), utc("2024-03-01T00:00:00Z")),
            comparison_time_range: Some(TimeRange::new(
                utc("2024-01-01T00:00:00Z"),
                utc("2024-02-01T00:00:00Z"),
            )),
            sort: vec![ComparisonSort::new("events", kind, true)],
            limit,
            offset: None,
        }
    }

    #[test]
    fn test_joined_sql_snapshot() {
        let view = traffic_view();
        let ctx = QueryContext::new(&view, Dialect::DuckDb);
        let plan = ComparisonPlan::new(&ctx, &request(ComparisonSortKind::AbsDelta, Some(10)))
            .unwrap();
        let (sql, args) = plan.single_pass(&ctx).unwrap().to_sql_with_args(Dialect::DuckDb);
        insta::assert_snapshot!(sql, @r#"
        WITH "base" AS (
        SELECT
          "site" AS "site",
          COUNT(*) AS "events"
        FROM "events"
        WHERE ("ts" >= ? AND "ts" < ?)
        GROUP BY 1
        ),
        "comparison" AS (
        SELECT
          "site" AS "site",
          COUNT(*) AS "events"
        FROM "events"
        WHERE ("ts" >= ? AND "ts" < ?)
        GROUP BY 1
        )
        SELECT
          COALESCE("base"."site", "comparison"."site") AS "site",
          "base"."events" AS "events",
          "comparison"."events" AS "events__previous",
          "base"."events" - "comparison"."events" AS "events__delta_abs",
          CASE WHEN "comparison"."events" IS NULL OR "comparison"."events" = 0 THEN NULL ELSE CAST("base"."events" - "comparison"."events" AS DOUBLE) / "comparison"."events" END AS "events__delta_rel"
        FROM "base"
        FULL OUTER JOIN "comparison" ON ("base"."site" = "comparison"."site" OR ("base"."site" IS NULL AND "comparison"."site" IS NULL))
        ORDER BY "events__delta_abs" DESC NULLS LAST, "site" ASC NULLS LAST
        LIMIT ?
        "#);
        assert_eq!(args.len(), 5);
        assert_eq!(args[0], serde_json::json!("2024-02-01T00:00:00Z"));
        assert_eq!(args[3], serde_json::json!("2024-02-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_abs_delta_sort_on_sqlite() {
        let service = sqlite_service();
        let result = service
            .comparison(
                &Identity::anonymous(),
                request(ComparisonSortKind::AbsDelta, Some(10)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 2);
        let a = &result.rows[0];
        assert_eq!(a.get("site"), Some(&Value::from("A")));
        assert_eq!(a.get("events"), Some(&Value::Int(2)));
        assert_eq!(a.get("events__previous"), Some(&Value::Int(1)));
        assert_eq!(a.get("events__delta_abs"), Some(&Value::Int(1)));
        assert_eq!(a.get("events__delta_rel"), Some(&Value::Float(1.0)));

        let b = &result.rows[1];
        assert_eq!(b.get("site"), Some(&Value::from("B")));
        assert_eq!(b.get("events__delta_abs"), Some(&Value::Int(-1)));
        assert_eq!(b.get("events__delta_rel"), Some(&Value::Float(-0.5)));
    }

    #[tokio::test]
    async fn test_base_only_value_has_null_deltas_and_sorts_last() {
        let engine = sqlite();
        engine
            .execute_batch("INSERT INTO events VALUES (7, 'C', '2024-02-05T10:00:00Z');")
            .unwrap();
        let service = MetricsService::new(Arc::new(catalog()), Arc::new(engine));

        for kind in [
            ComparisonSortKind::AbsDelta,
            ComparisonSortKind::RelDelta,
            ComparisonSortKind::Comparison,
        ] {
            for desc in [false, true] {
                let mut q = request(kind, None);
                q.sort = vec![ComparisonSort::new("events", kind, desc)];
                let result = service
                    .comparison(&Identity::anonymous(), q, CancellationToken::new())
                    .await
                    .unwrap();

                assert_eq!(result.rows.len(), 3, "{:?} desc={}", kind, desc);
                let last = &result.rows[2];
                assert_eq!(last.get("site"), Some(&Value::from("C")), "{:?} desc={}", kind, desc);
                assert_eq!(last.get("events"), Some(&Value::Int(1)));
                assert_eq!(last.get("events__previous"), Some(&Value::Null));
                assert_eq!(last.get("events__delta_abs"), Some(&Value::Null));
                assert_eq!(last.get("events__delta_rel"), Some(&Value::Null));
            }
        }
    }

    #[tokio::test]
    async fn test_previous_sort_restricts_to_candidates() {
        let service = sqlite_service();
        let result = service
            .comparison(
                &Identity::anonymous(),
                request(ComparisonSortKind::Comparison, Some(1)),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("site"), Some(&Value::from("B")));
        assert_eq!(result.rows[0].get("events__previous"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_without_comparison_range_returns_base_values() {
        let service = sqlite_service();
        let mut q = request(ComparisonSortKind::Base, None);
        q.comparison_time_range = None;
        let result = service
            .comparison(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].get("site"), Some(&Value::from("A")));
        assert!(result.column("events__previous").is_none());
    }

    #[tokio::test]
    async fn test_two_pass_runs_candidates_first() {
        let site = Column::new("site", DataType::String);
        let events = Column::new("events", DataType::Int);
        let engine = Arc::new(
            ScriptedEngine::new(Dialect::DuckDb)
                .then(Script::Rows(
                    vec![site.clone(), events.clone()],
                    vec![
                        vec![RawValue::Text("A".into()), RawValue::Int(2)],
                        vec![RawValue::Text("B".into()), RawValue::Int(1)],
                    ],
                ))
                .then(Script::Rows(vec![site, events], Vec::new())),
        );
        let service = MetricsService::new(Arc::new(catalog()), engine.clone());
        service
            .comparison(
                &Identity::anonymous(),
                request(ComparisonSortKind::Base, Some(1)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let sql = engine.sql();
        assert_eq!(sql.len(), 2);
        assert!(!sql[0].starts_with("WITH"), "{}", sql[0]);
        assert!(sql[1].starts_with("WITH"), "{}", sql[1]);
        assert!(sql[1].contains("\"site\" IN (?, ?)"), "{}", sql[1]);
    }

    #[tokio::test]
    async fn test_duplicate_dimension_value_is_internal() {
        let row = vec![
            RawValue::Text("A".into()),
            RawValue::Int(1),
            RawValue::Int(1),
            RawValue::Int(0),
            RawValue::Float(0.0),
        ];
        let columns = ["site", "events", "events__previous", "events__delta_abs", "events__delta_rel"]
            .iter()
            .map(|name| Column::new(name, DataType::Unknown))
            .collect();
        let engine = ScriptedEngine::new(Dialect::DuckDb)
            .then(Script::Rows(columns, vec![row.clone(), row]));
        let service = MetricsService::new(Arc::new(catalog()), Arc::new(engine));

        let mut q = request(ComparisonSortKind::Base, None);
        q.sort = vec![ComparisonSort::new("site", ComparisonSortKind::Base, false)];
        let err = service
            .comparison(&Identity::anonymous(), q, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)), "{:?}", err);
    }

    #[test]
    fn test_mysql_cannot_compare() {
        let view = traffic_view();
        let ctx = QueryContext::new(&view, Dialect::MySql);
        let err = ComparisonPlan::new(&ctx, &request(ComparisonSortKind::Base, None)).unwrap_err();
        assert!(err.is_client_fault());
    }
}
