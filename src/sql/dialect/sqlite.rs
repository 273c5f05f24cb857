//! SQLite SQL dialect.
//!
//! Targets the bundled SQLite shipped with `rusqlite`:
//! - ANSI identifier quoting (`"`)
//! - `?` placeholders
//! - NULLS LAST (3.30+) and FULL OUTER JOIN (3.39+)
//! - `LIKE` is already ASCII case-insensitive, no ILIKE
//! - Timestamps stored as RFC3339 text, truncated with `strftime` in UTC
//! - `json_each` unnests JSON arrays

use super::helpers;
use super::{SqlDialect, TimeFloor};
use crate::sql::expr::{CastType, Expr};
use crate::sql::query::TableRef;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        match ty {
            CastType::Double => "REAL",
            CastType::TimestampTz => "TEXT",
        }
    }

    fn time_floor(&self, expr: Expr, floor: &TimeFloor) -> Option<Expr> {
        helpers::time_floor_strftime(expr, floor)
    }

    fn unnest_source(&self, expr: Expr, alias: &str) -> Option<TableRef> {
        Some(helpers::unnest_json_each(expr, alias))
    }
}
