//! MySQL SQL dialect.
//!
//! MySQL differences:
//! - Backtick identifier quoting (`` ` ``)
//! - Numeric booleans (1/0)
//! - No NULLS FIRST/LAST, no FULL OUTER JOIN, no ILIKE
//! - No zone-aware date truncation without loaded time zone tables

use super::helpers;
use super::SqlDialect;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn supports_full_outer_join(&self) -> bool {
        false
    }
}
