//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Numbered placeholders (`$1`, `$2`, ...)
//! - ILIKE and NULLS LAST
//! - `unnest()` for arrays

use super::helpers;
use super::{SqlDialect, TimeFloor};
use crate::sql::expr::{CastType, Expr};
use crate::sql::query::TableRef;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        match ty {
            CastType::Double => "DOUBLE PRECISION",
            CastType::TimestampTz => "TIMESTAMPTZ",
        }
    }

    fn time_floor(&self, expr: Expr, floor: &TimeFloor) -> Option<Expr> {
        Some(helpers::time_floor_at_time_zone(expr, floor))
    }

    fn unnest_source(&self, expr: Expr, alias: &str) -> Option<TableRef> {
        Some(helpers::unnest_function(expr, alias))
    }
}
