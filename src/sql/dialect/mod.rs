//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (PG/DuckDB/SQLite), `` ` `` (MySQL)
//! - Bound parameter placeholders: `?` vs `$n`
//! - Case-insensitive matching: `ILIKE` vs `LOWER(..) LIKE LOWER(..)`
//! - NULLS LAST support
//! - Time truncation in a time zone
//! - Unnesting multi-valued dimensions
//!
//! # Usage
//!
//! ```ignore
//! use mantis_metrics::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! let ph = dialect.placeholder(2);                // $2
//! ```
//!
//! # Feature Matrix
//!
//! | Feature | DuckDB | PostgreSQL | SQLite | MySQL |
//! |---------|--------|------------|--------|-------|
//! | NULLS FIRST/LAST | ✓ | ✓ | 3.30+ | ❌ |
//! | ILIKE | ✓ | ✓ | ❌ | ❌ |
//! | FULL OUTER JOIN | ✓ | ✓ | 3.39+ | ❌ |
//! | Time floor in zone | ✓ | 12+ | UTC only | ❌ |
//! | Unnest | ✓ | ✓ | json_each | ❌ |
//!
//! Check the feature flags before generating SQL that relies on them.

mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod sqlite;

pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use serde::{Deserialize, Serialize};

use super::expr::{CastType, Expr};
use super::query::TableRef;
use super::token::TokenStream;
use crate::timegrain::TimeGrain;

/// Calendar parameters for truncating a timestamp expression in SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFloor {
    pub grain: TimeGrain,
    /// IANA zone name, bound as a parameter.
    pub time_zone: String,
    /// 1 = Monday … 7 = Sunday.
    pub first_day_of_week: u32,
    /// 1 = January … 12 = December.
    pub first_month_of_year: u32,
}

impl TimeFloor {
    pub fn is_utc(&self) -> bool {
        self.time_zone.eq_ignore_ascii_case("UTC") || self.time_zone.is_empty()
    }
}

/// Interval units used by time floor offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Day,
    Month,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Month => "month",
        }
    }
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// This is the only place identifiers are escaped.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// Only used for constants owned by the engine (grain units, formats).
    /// Request values are always bound parameters.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Placeholder for the `index`-th bound parameter (1-based).
    fn placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".into()
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET with bound values.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // Ordering and Matching
    // =========================================================================

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    ///
    /// Without it, the query builder emulates NULLS LAST with a leading
    /// `x IS NULL` sort key.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    /// Whether this dialect has a case-insensitive `ILIKE`.
    fn supports_ilike(&self) -> bool {
        false
    }

    /// Whether this dialect supports FULL OUTER JOIN.
    fn supports_full_outer_join(&self) -> bool {
        true
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Type name used in `CAST(x AS ...)`.
    fn cast_type_name(&self, ty: CastType) -> &'static str {
        match ty {
            CastType::Double => "DOUBLE",
            CastType::TimestampTz => "TIMESTAMPTZ",
        }
    }

    /// Emit an interval literal.
    fn emit_interval(&self, amount: i64, unit: IntervalUnit) -> TokenStream {
        helpers::emit_interval_quoted(amount, unit)
    }

    // =========================================================================
    // Time and Unnest
    // =========================================================================

    /// Truncate a timestamp expression to a grain in a time zone.
    ///
    /// Returns `None` when the dialect cannot express the truncation.
    fn time_floor(&self, expr: Expr, floor: &TimeFloor) -> Option<Expr> {
        let _ = (expr, floor);
        None
    }

    /// Table function that unnests a multi-valued expression into rows of a
    /// single `value` column.
    ///
    /// Returns `None` when the dialect has no unnest support.
    fn unnest_source(&self, expr: Expr, alias: &str) -> Option<TableRef> {
        let _ = (expr, alias);
        None
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
        }
    }

    /// Parse a dialect name as used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "duckdb" => Some(Dialect::DuckDb),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" => Some(Dialect::MySql),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }
}

// Delegate SqlDialect trait to the inner implementation
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn placeholder(&self, index: usize) -> String {
        self.dialect().placeholder(index)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }

    fn supports_ilike(&self) -> bool {
        self.dialect().supports_ilike()
    }

    fn supports_full_outer_join(&self) -> bool {
        self.dialect().supports_full_outer_join()
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        self.dialect().cast_type_name(ty)
    }

    fn emit_interval(&self, amount: i64, unit: IntervalUnit) -> TokenStream {
        self.dialect().emit_interval(amount, unit)
    }

    fn time_floor(&self, expr: Expr, floor: &TimeFloor) -> Option<Expr> {
        self.dialect().time_floor(expr, floor)
    }

    fn unnest_source(&self, expr: Expr, alias: &str) -> Option<TableRef> {
        self.dialect().unnest_source(expr, alias)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
