#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use mantis_metrics::compiler::{compile, Scope};
    use mantis_metrics::engine::{Statement, StorageEngine};
    use mantis_metrics::model::{FilterExpression, Operator};
    use mantis_metrics::result::RawValue;
    use mantis_metrics::sql::Dialect;

    use super::common::{sales_view, sqlite};

    /// Ids of the orders matching a filter, evaluated by SQLite.
    async fn matching_ids(filter: FilterExpression) -> Vec<i64> {
        let view = sales_view();
        let (predicate, args) = compile(&filter, Scope::Where(&view), Dialect::Sqlite).unwrap();
        let sql = format!("SELECT \"id\" FROM \"orders\" WHERE {} ORDER BY \"id\"", predicate);

        let engine = sqlite();
        let mut stream = engine
            .execute(Statement::new(sql, args), CancellationToken::new())
            .await
            .unwrap();
        let mut ids = Vec::new();
        while let Some(row) = stream.rows.next().await {
            match row.unwrap().as_slice() {
                [RawValue::Int(id)] => ids.push(*id),
                other => panic!("unexpected row {:?}", other),
            }
        }
        ids
    }

    #[tokio::test]
    async fn test_in_with_null_matches_null_rows() {
        let filter = FilterExpression::in_list("country", vec![json!("NO"), Value::Null]);
        assert_eq!(matching_ids(filter).await, vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn test_not_in_keeps_null_rows() {
        let filter = FilterExpression::not_in_list("country", vec![json!("NO")]);
        assert_eq!(matching_ids(filter).await, vec![3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_not_in_with_null_drops_null_rows() {
        let filter = FilterExpression::not_in_list("country", vec![json!("NO"), Value::Null]);
        assert_eq!(matching_ids(filter).await, vec![3, 4, 6]);
    }

    #[tokio::test]
    async fn test_eq_null() {
        let filter = FilterExpression::compare(Operator::Eq, "country", Value::Null);
        assert_eq!(matching_ids(filter).await, vec![5]);
        let filter = FilterExpression::compare(Operator::Neq, "country", Value::Null);
        assert_eq!(matching_ids(filter).await, vec![1, 2, 3, 4, 6]);
    }

    #[tokio::test]
    async fn test_like_is_case_insensitive() {
        let filter = FilterExpression::compare(Operator::Like, "country", "n%");
        assert_eq!(matching_ids(filter).await, vec![1, 2]);
        let filter = FilterExpression::compare(Operator::NotLike, "country", "n%");
        assert_eq!(matching_ids(filter).await, vec![3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_multi_valued_dimension_matches_any_element() {
        let filter = FilterExpression::compare(Operator::Eq, "tags", "a");
        assert_eq!(matching_ids(filter).await, vec![1, 2]);
        let filter = FilterExpression::in_list("tags", vec![json!("b"), json!("c")]);
        assert_eq!(matching_ids(filter).await, vec![1, 4, 6]);
    }

    #[tokio::test]
    async fn test_multi_valued_negation_matches_no_element() {
        let filter = FilterExpression::not_in_list("tags", vec![json!("a")]);
        assert_eq!(matching_ids(filter).await, vec![3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_nested_junctions() {
        let filter = FilterExpression::or(vec![
            FilterExpression::and(vec![
                FilterExpression::compare(Operator::Eq, "channel", "web"),
                FilterExpression::compare(Operator::Gte, "created_at", "2024-01-04T00:00:00Z"),
            ]),
            FilterExpression::compare(Operator::Eq, "id", 2),
        ]);
        assert_eq!(matching_ids(filter).await, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_empty_in_matches_nothing() {
        let filter = FilterExpression::in_list("country", vec![]);
        assert!(matching_ids(filter).await.is_empty());
        let filter = FilterExpression::not_in_list("country", vec![]);
        assert_eq!(matching_ids(filter).await.len(), 6);
    }
}
