#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use mantis_metrics::config::Settings;
    use mantis_metrics::engine::Identity;
    use mantis_metrics::model::{MetricsQuery, ToplistQuery, TotalsQuery};
    use mantis_metrics::result::Value;
    use mantis_metrics::sql::Dialect;
    use mantis_metrics::{MetricsService, QueryError};

    use super::common::{catalog, sqlite_service, Script, ScriptedEngine};

    fn totals(view: &str) -> MetricsQuery {
        MetricsQuery::Totals(TotalsQuery {
            view: view.into(),
            measures: vec!["orders".into()],
            filter: None,
            time_range: None,
        })
    }

    fn toplist(measure: &str) -> MetricsQuery {
        MetricsQuery::Toplist(ToplistQuery {
            view: "sales".into(),
            dimension: "country".into(),
            measures: vec![measure.into()],
            filter: None,
            time_range: None,
            sort: vec![],
            limit: Some(2),
            offset: None,
        })
    }

    #[tokio::test]
    async fn test_batch_results_in_order_with_isolated_failures() {
        let service = Arc::new(sqlite_service());
        let items = service
            .dispatch_collect(
                Identity::anonymous(),
                vec![totals("sales"), toplist("profit"), toplist("orders")],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(
            items.iter().map(|i| i.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let total = items[0].result.as_ref().unwrap();
        assert_eq!(total.rows[0].get("orders"), Some(&Value::Int(6)));

        let err = items[1].result.as_ref().unwrap_err();
        assert!(err.is_client_fault(), "{:?}", err);

        let top = items[2].result.as_ref().unwrap();
        assert_eq!(top.rows.len(), 2);
        assert_eq!(top.rows[0].get("country"), Some(&Value::from("NO")));
    }

    #[tokio::test]
    async fn test_empty_batch_closes_channel() {
        let service = Arc::new(sqlite_service());
        let mut rx = service.dispatch(Identity::anonymous(), vec![], CancellationToken::new());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_view_fails_only_its_item() {
        let service = Arc::new(sqlite_service());
        let items = service
            .dispatch_collect(
                Identity::anonymous(),
                vec![totals("nope"), totals("sales")],
                CancellationToken::new(),
            )
            .await;
        assert!(items[0].result.as_ref().unwrap_err().is_client_fault());
        assert!(items[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_limit_queues_items() {
        let engine = Arc::new(ScriptedEngine::new(Dialect::DuckDb).then(Script::Hang));
        let mut settings = Settings::default();
        settings.batch.max_concurrency = 1;
        let service = Arc::new(
            MetricsService::new(Arc::new(catalog()), engine.clone())
                .with_settings(&settings)
                .unwrap(),
        );

        let cancel = CancellationToken::new();
        let mut rx = service.dispatch(
            Identity::anonymous(),
            vec![totals("sales"), totals("sales")],
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(service.running_queries().len(), 1);
        assert_eq!(engine.sql().len(), 1);

        cancel.cancel();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        assert_eq!(items.len(), 2);
        for item in items {
            assert!(
                matches!(item.result, Err(QueryError::Cancelled)),
                "{:?}",
                item.result
            );
        }
        assert!(service.running_queries().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_execution_error() {
        let engine = ScriptedEngine::new(Dialect::DuckDb).then(Script::Fail("disk on fire".into()));
        let service = Arc::new(MetricsService::new(Arc::new(catalog()), Arc::new(engine)));
        let items = service
            .dispatch_collect(Identity::anonymous(), vec![totals("sales")], CancellationToken::new())
            .await;
        let err = items[0].result.as_ref().unwrap_err();
        assert!(err.is_execution(), "{:?}", err);
        assert_eq!(err.phase(), Some("totals"));
    }
}
