#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use mantis_metrics::engine::{Access, Identity, PolicyError};
    use mantis_metrics::model::{
        Dimension, FilterExpression, Measure, MetricsViewSpec, Operator, ToplistQuery,
    };
    use mantis_metrics::result::Value;
    use mantis_metrics::{MetricsService, QueryError};

    use super::common::{catalog, sqlite, sqlite_service, StaticPolicy};

    fn toplist(measures: &[&str]) -> ToplistQuery {
        ToplistQuery {
            view: "sales".into(),
            dimension: "country".into(),
            measures: measures.iter().map(|m| m.to_string()).collect(),
            filter: None,
            time_range: None,
            sort: vec![],
            limit: None,
            offset: None,
        }
    }

    fn service(policy: StaticPolicy) -> MetricsService {
        MetricsService::new(Arc::new(catalog()), Arc::new(sqlite())).with_security(Arc::new(policy))
    }

    #[tokio::test]
    async fn test_unknown_subject_is_denied() {
        let service = service(StaticPolicy::new().grant("ana", Access::allow_all()));
        let err = service
            .toplist(&Identity::new("bob"), toplist(&["orders"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, QueryError::Policy(PolicyError::Denied { .. })),
            "{:?}",
            err
        );
        assert!(err.is_client_fault());
    }

    #[tokio::test]
    async fn test_group_grant_applies_to_members() {
        let service = service(StaticPolicy::new().grant("group:analysts", Access::allow_all()));
        let member = Identity::new("carl").with_groups(vec!["staff".into(), "analysts".into()]);
        assert!(service
            .toplist(&member, toplist(&["orders"]), CancellationToken::new())
            .await
            .is_ok());

        let outsider = Identity::new("dora").with_groups(vec!["staff".into()]);
        let err = service
            .toplist(&outsider, toplist(&["orders"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Policy(PolicyError::Denied { .. })));
    }

    #[tokio::test]
    async fn test_field_restrictions_cover_filters() {
        let access = Access::allow_all().with_fields(vec!["country".into(), "orders".into()]);
        let service = service(StaticPolicy::new().grant("ana", access));
        let ana = Identity::new("ana");

        assert!(service
            .toplist(&ana, toplist(&["orders"]), CancellationToken::new())
            .await
            .is_ok());

        let err = service
            .toplist(&ana, toplist(&["orders", "revenue"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, QueryError::Policy(PolicyError::FieldNotAllowed { field, .. }) if field == "revenue"),
            "{:?}",
            err
        );

        let mut filtered = toplist(&["orders"]);
        filtered.filter = Some(FilterExpression::compare(Operator::Eq, "channel", "web"));
        let err = service
            .toplist(&ana, filtered, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, QueryError::Policy(PolicyError::FieldNotAllowed { .. })),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_row_filter_restricts_results() {
        let access = Access::allow_all()
            .with_row_filter(FilterExpression::compare(Operator::Eq, "channel", "app"));
        let service = service(StaticPolicy::new().grant("ana", access));
        let result = service
            .toplist(&Identity::new("ana"), toplist(&["revenue"]), CancellationToken::new())
            .await
            .unwrap();
        // app orders: NO 20, null 3
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].get("country"), Some(&Value::from("NO")));
        assert_eq!(result.rows[0].get("revenue"), Some(&Value::Int(20)));
        assert_eq!(result.rows[1].get("country"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_row_filter_combines_with_request_filter() {
        let access = Access::allow_all()
            .with_row_filter(FilterExpression::compare(Operator::Eq, "channel", "web"));
        let service = service(StaticPolicy::new().grant("ana", access));
        let mut q = toplist(&["orders"]);
        q.filter = Some(FilterExpression::compare(Operator::Eq, "country", "SE"));
        let result = service
            .toplist(&Identity::new("ana"), q, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_row_filter_binds_every_branch_of_an_or_filter() {
        let access = Access::allow_all()
            .with_row_filter(FilterExpression::compare(Operator::Eq, "channel", "app"));
        let service = service(StaticPolicy::new().grant("ana", access));
        let mut q = toplist(&["orders"]);
        q.dimension = "channel".into();
        q.filter = Some(FilterExpression::or(vec![
            FilterExpression::compare(Operator::Eq, "country", "SE"),
            FilterExpression::compare(Operator::Eq, "country", "NO"),
        ]));
        let result = service
            .toplist(&Identity::new("ana"), q, CancellationToken::new())
            .await
            .unwrap();
        // only order 2 is both app and SE/NO
        assert_eq!(result.rows.len(), 1, "{:?}", result.rows);
        assert_eq!(result.rows[0].get("channel"), Some(&Value::from("app")));
        assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_broken_row_filter_fails_closed() {
        let access = Access::allow_all()
            .with_row_filter(FilterExpression::compare(Operator::Eq, "tenant", "acme"));
        let service = service(StaticPolicy::new().grant("ana", access));
        let err = service
            .toplist(&Identity::new("ana"), toplist(&["orders"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, QueryError::Policy(PolicyError::RowFilter(_))),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_validate_view_reports_every_problem() {
        let service = sqlite_service();
        let view = MetricsViewSpec::new(
            "broken",
            "orders",
            Some("placed_at".into()),
            vec![
                Dimension::column("country", "country"),
                Dimension::column("region", "region"),
                Dimension::expression("upper_country", "UPPER(country)"),
            ],
            vec![
                Measure::count("orders"),
                Measure::expression("margin", "SUM(amount - cost)"),
            ],
        )
        .unwrap();

        let issues = service.validate_view(&view).await.unwrap();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["margin", "placed_at", "region"]);
    }

    #[tokio::test]
    async fn test_validate_view_missing_table() {
        let service = sqlite_service();
        let view = MetricsViewSpec::new(
            "ghost",
            "no_such_table",
            None,
            vec![Dimension::column("country", "country")],
            vec![Measure::count("orders")],
        )
        .unwrap();
        let issues = service.validate_view(&view).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("no_such_table"), "{:?}", issues);
    }

    #[tokio::test]
    async fn test_validate_view_accepts_fixture_views() {
        let service = sqlite_service();
        for view in [super::common::sales_view(), super::common::traffic_view()] {
            assert_eq!(service.validate_view(&view).await.unwrap(), vec![]);
        }
    }
}
