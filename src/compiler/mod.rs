//! Filter expression compiler.
//!
//! Turns a [`FilterExpression`](crate::model::FilterExpression) into a
//! parameterized predicate. Null members of IN lists, equality against null,
//! case-insensitive LIKE and multi-valued dimensions are rewritten so that
//! the predicate means the same thing on every dialect.
//!
//! ```ignore
//! let (sql, args) = compile(&expr, Scope::Where(&view), Dialect::Postgres)?;
//! // ("country" IN ($1) OR "country" IS NULL), ["NO"]
//! ```

mod error;
mod filter;

pub use error::{CompileError, CompileResult};
pub use filter::{compile, compile_expr, dimension_expr, unnest_alias, Scope};
