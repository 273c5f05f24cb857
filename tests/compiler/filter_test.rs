#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use mantis_metrics::compiler::{compile, CompileError, Scope};
    use mantis_metrics::model::{FilterExpression, Operator};
    use mantis_metrics::sql::Dialect;

    use super::common::sales_view;

    fn parse(value: serde_json::Value) -> FilterExpression {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_json_tree_compiles_with_numbered_placeholders() {
        let filter = parse(json!({
            "condition": {
                "op": "AND",
                "operands": [
                    {"condition": {"op": "IN", "operands": [
                        {"identifier": "country"},
                        {"literal": ["NO", null]}
                    ]}},
                    {"condition": {"op": "GT", "operands": [
                        {"identifier": "created_at"},
                        {"literal": "2024-01-01T00:00:00Z"}
                    ]}}
                ]
            }
        }));
        let view = sales_view();
        let (sql, args) = compile(&filter, Scope::Where(&view), Dialect::Postgres).unwrap();
        assert_eq!(
            sql,
            "((\"country\" IN ($1) OR \"country\" IS NULL)) AND (\"created_at\" > $2)"
        );
        assert_eq!(args, vec![json!("NO"), json!("2024-01-01T00:00:00Z")]);
    }

    #[test]
    fn test_identifiers_are_case_insensitive() {
        let view = sales_view();
        let filter = FilterExpression::compare(Operator::Eq, "COUNTRY", "NO");
        let (sql, _) = compile(&filter, Scope::Where(&view), Dialect::DuckDb).unwrap();
        assert_eq!(sql, "\"country\" = ?");
    }

    #[test]
    fn test_measures_are_not_filterable_in_where() {
        let view = sales_view();
        let filter = FilterExpression::compare(Operator::Gt, "revenue", 10);
        assert_eq!(
            compile(&filter, Scope::Where(&view), Dialect::DuckDb).unwrap_err(),
            CompileError::unknown_field("revenue")
        );
    }

    #[test]
    fn test_mysql_booleans_and_quoting() {
        let view = sales_view();
        let filter = FilterExpression::and(vec![
            FilterExpression::compare(Operator::Eq, "channel", "web"),
            FilterExpression::in_list("country", vec![]),
        ]);
        let (sql, args) = compile(&filter, Scope::Where(&view), Dialect::MySql).unwrap();
        assert_eq!(sql, "(`channel` = ?) AND (0)");
        assert_eq!(args, vec![json!("web")]);
    }

    #[test]
    fn test_same_tree_on_every_dialect() {
        let view = sales_view();
        let filter = FilterExpression::not_in_list("country", vec![json!("NO")]);
        for dialect in [Dialect::DuckDb, Dialect::Postgres, Dialect::MySql, Dialect::Sqlite] {
            let (sql, args) = compile(&filter, Scope::Where(&view), dialect).unwrap();
            assert!(sql.contains("NOT IN"), "{:?}: {}", dialect, sql);
            assert!(sql.contains("IS NULL"), "{:?}: {}", dialect, sql);
            assert_eq!(args, vec![json!("NO")]);
        }
    }

    #[test]
    fn test_sqlite_unnest_uses_json_each() {
        let view = sales_view();
        let filter = FilterExpression::compare(Operator::Eq, "tags", "a");
        let (sql, _) = compile(&filter, Scope::Where(&view), Dialect::Sqlite).unwrap();
        assert!(sql.starts_with("EXISTS (SELECT"), "{}", sql);
        assert!(sql.contains("JSON_EACH(\"tags\") AS \"tags__unnest\""), "{}", sql);
    }
}
