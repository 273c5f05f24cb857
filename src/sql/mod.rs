//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations
//!
//! Request values never appear in SQL text: they are carried as bound
//! parameters and collected when a query is serialized.

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, IntervalUnit, SqlDialect, TimeFloor};
pub use expr::{
    coalesce, col, count_star, func, lit_bool, lit_int, lit_null, lit_str, param, raw_sql,
    table_col, BinaryOperator, CastType, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    Cte, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir,
    TableRef, TableSource,
};
pub use token::{Token, TokenStream};
