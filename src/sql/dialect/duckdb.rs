//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible with extensions:
//! - ANSI identifier quoting (`"`)
//! - `?` placeholders
//! - ILIKE and NULLS LAST
//! - `UNNEST` for list columns

use super::helpers;
use super::{SqlDialect, TimeFloor};
use crate::sql::expr::Expr;
use crate::sql::query::TableRef;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn time_floor(&self, expr: Expr, floor: &TimeFloor) -> Option<Expr> {
        Some(helpers::time_floor_at_time_zone(expr, floor))
    }

    fn unnest_source(&self, expr: Expr, alias: &str) -> Option<TableRef> {
        Some(helpers::unnest_function(expr, alias))
    }
}
