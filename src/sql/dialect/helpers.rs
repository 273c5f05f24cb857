//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use serde_json::json;

use super::super::expr::{func, lit_str, CastType, Expr, ExprExt};
use super::super::query::TableRef;
use super::super::token::{Token, TokenStream};
use super::{IntervalUnit, TimeFloor};
use crate::timegrain::TimeGrain;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres, DuckDB
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: MySQL, SQLite
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... with bound values.
/// Used by: all dialects
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit).space().push(Token::Param(json!(lim)));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset).space().push(Token::Param(json!(off)));
    }

    ts
}

// =============================================================================
// Intervals
// =============================================================================

/// Emit `INTERVAL 'n unit'`.
/// Used by: Postgres, DuckDB
pub fn emit_interval_quoted(amount: i64, unit: IntervalUnit) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Interval)
        .space()
        .push(Token::LitString(format!("{} {}", amount, unit.as_str())));
    ts
}

// =============================================================================
// Time Floor
// =============================================================================

/// `date_trunc` unit name for a grain.
pub fn date_trunc_unit(grain: TimeGrain) -> &'static str {
    match grain {
        TimeGrain::Millisecond => "millisecond",
        TimeGrain::Second => "second",
        TimeGrain::Minute => "minute",
        TimeGrain::Hour => "hour",
        TimeGrain::Day => "day",
        TimeGrain::Week => "week",
        TimeGrain::Month => "month",
        TimeGrain::Quarter => "quarter",
        TimeGrain::Year => "year",
    }
}

/// Shift applied around `date_trunc` so that weeks start on the configured
/// day and quarters/years on the configured month.
fn floor_offset(floor: &TimeFloor) -> Option<(i64, IntervalUnit)> {
    match floor.grain {
        TimeGrain::Week if floor.first_day_of_week > 1 => {
            Some((i64::from(floor.first_day_of_week) - 1, IntervalUnit::Day))
        }
        TimeGrain::Quarter | TimeGrain::Year if floor.first_month_of_year > 1 => {
            Some((i64::from(floor.first_month_of_year) - 1, IntervalUnit::Month))
        }
        _ => None,
    }
}

/// `date_trunc(unit, local)` with the offset shift applied, if any.
fn date_trunc_shifted(local: Expr, floor: &TimeFloor) -> Expr {
    let unit = lit_str(date_trunc_unit(floor.grain));
    match floor_offset(floor) {
        Some((amount, unit_kind)) => {
            let shifted = local.sub(Expr::Interval {
                amount,
                unit: unit_kind,
            });
            func("date_trunc", vec![unit, shifted]).add(Expr::Interval {
                amount,
                unit: unit_kind,
            })
        }
        None => func("date_trunc", vec![unit, local]),
    }
}

/// Wall-clock truncation through `AT TIME ZONE`.
///
/// Sub-day grains truncate in UTC so that they stay in absolute time.
/// Renders `date_trunc(unit, CAST(x AS TIMESTAMPTZ) AT TIME ZONE ?) AT TIME ZONE ?`.
/// Used by: Postgres, DuckDB
pub fn time_floor_at_time_zone(expr: Expr, floor: &TimeFloor) -> Expr {
    let zone = if floor.grain.is_sub_day() {
        "UTC".to_string()
    } else {
        floor.time_zone.clone()
    };

    let local = Expr::AtTimeZone {
        expr: Box::new(expr.cast(CastType::TimestampTz)),
        zone: Box::new(Expr::Param(json!(zone))),
    };

    Expr::AtTimeZone {
        expr: Box::new(date_trunc_shifted(local, floor)),
        zone: Box::new(Expr::Param(json!(zone))),
    }
}

/// UTC-only truncation through `strftime`, producing RFC3339 text.
///
/// Weeks and quarters have no `strftime` form and are unsupported, as is
/// any zone other than UTC for day and coarser grains.
/// Used by: SQLite
pub fn time_floor_strftime(expr: Expr, floor: &TimeFloor) -> Option<Expr> {
    if !floor.grain.is_sub_day() && !floor.is_utc() {
        return None;
    }
    let format = match floor.grain {
        TimeGrain::Millisecond => "%Y-%m-%dT%H:%M:%fZ",
        TimeGrain::Second => "%Y-%m-%dT%H:%M:%SZ",
        TimeGrain::Minute => "%Y-%m-%dT%H:%M:00Z",
        TimeGrain::Hour => "%Y-%m-%dT%H:00:00Z",
        TimeGrain::Day => "%Y-%m-%dT00:00:00Z",
        TimeGrain::Month => "%Y-%m-01T00:00:00Z",
        TimeGrain::Year if floor.first_month_of_year <= 1 => "%Y-01-01T00:00:00Z",
        TimeGrain::Week | TimeGrain::Quarter | TimeGrain::Year => return None,
    };
    Some(func("strftime", vec![lit_str(format), expr]))
}

// =============================================================================
// Unnest
// =============================================================================

/// `UNNEST(expr) AS alias("value")`.
/// Used by: Postgres, DuckDB
pub fn unnest_function(expr: Expr, alias: &str) -> TableRef {
    TableRef::function(func("unnest", vec![expr]), alias, vec!["value"])
}

/// `json_each(expr) AS alias`, whose rows expose a `value` column.
/// Used by: SQLite
pub fn unnest_json_each(expr: Expr, alias: &str) -> TableRef {
    TableRef::function(func("json_each", vec![expr]), alias, vec![])
}
