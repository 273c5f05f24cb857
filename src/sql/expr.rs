//! Expression AST - the core of SQL expression building.
//!
//! This module provides a strongly-typed AST for SQL expressions
//! with exhaustive pattern matching enforced by the compiler.
//! Values that originate from a request are carried as [`Expr::Param`]
//! and never inlined into the SQL text.

use serde_json::Value;

use super::dialect::{Dialect, IntervalUnit, SqlDialect};
use super::query::{Query, SelectExpr};
use super::token::{Token, TokenStream};

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens_for_dialect()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_table.column
    Column {
        table: Option<String>,
        column: String,
    },

    /// Literal values owned by the engine
    Literal(Literal),

    /// Bound parameter
    Param(Value),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation: op expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// Function call: name(args...)
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// CASE WHEN... THEN... ELSE... END
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// Subquery: (SELECT ...)
    Subquery(Box<Query>),

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Case-insensitive LIKE.
    ///
    /// Renders `ILIKE` where the dialect has it and
    /// `LOWER(expr) LIKE LOWER(pattern)` elsewhere.
    ILike {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },

    /// EXISTS (SELECT ...)
    Exists { subquery: Box<Query>, negated: bool },

    /// CAST(expr AS type)
    Cast { expr: Box<Expr>, ty: CastType },

    /// expr AT TIME ZONE zone
    AtTimeZone { expr: Box<Expr>, zone: Box<Expr> },

    /// Interval constant, rendered by the dialect
    Interval { amount: i64, unit: IntervalUnit },

    /// Wildcard: * or table.*
    Star { table: Option<String> },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Raw SQL expression passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized
    /// and can lead to SQL injection vulnerabilities. Only use with:
    /// - Trusted, static SQL fragments
    /// - Dimension and measure expressions from the metrics view definition
    ///
    /// For user-provided values, use `Expr::Param`.
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    String(String),
    Bool(bool),
    Null,
}

/// Target types for `CAST`. Each dialect supplies its own spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Double,
    TimestampTz,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    // String
    Like,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Convert this expression to a token stream for the default dialect.
    pub fn to_tokens(&self) -> TokenStream {
        self.to_tokens_for_dialect(Dialect::default())
    }

    /// Convert this expression to a token stream for a specific dialect.
    ///
    /// Dialect-dependent constructs (ILIKE fallback, cast type names,
    /// intervals) are resolved here.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::Param(value) => {
                ts.push(Token::Param(value.clone()));
            }

            Expr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens_for_dialect(dialect));
                ts.space();
                ts.push(binary_op_to_token(*op));
                ts.space();
                ts.append(&right.to_tokens_for_dialect(dialect));
            }

            Expr::UnaryOp { op, expr } => {
                ts.push(match op {
                    UnaryOperator::Not => Token::Not,
                    UnaryOperator::Minus => Token::Minus,
                });
                ts.space();
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens_for_dialect(dialect));
                }
                ts.rparen();
            }

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                if let Some(op) = operand {
                    ts.space().append(&op.to_tokens_for_dialect(dialect));
                }
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    ts.append(&when.to_tokens_for_dialect(dialect));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens_for_dialect(dialect));
                }
                if let Some(else_expr) = else_clause {
                    ts.space().push(Token::Else).space();
                    ts.append(&else_expr.to_tokens_for_dialect(dialect));
                }
                ts.space().push(Token::End);
            }

            Expr::Subquery(query) => {
                ts.lparen();
                ts.append(&query.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // "x IN ()" is invalid SQL: empty IN is FALSE, empty NOT IN is TRUE
                if values.is_empty() {
                    ts.push(if *negated { Token::True } else { Token::False });
                } else {
                    ts.append(&expr.to_tokens_for_dialect(dialect));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).space().lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens_for_dialect(dialect));
                    }
                    ts.rparen();
                }
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::ILike {
                expr,
                pattern,
                negated,
            } => {
                if dialect.supports_ilike() {
                    ts.append(&expr.to_tokens_for_dialect(dialect));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::ILike).space();
                    ts.append(&pattern.to_tokens_for_dialect(dialect));
                } else {
                    ts.append(&lower(expr).to_tokens_for_dialect(dialect));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::Like).space();
                    ts.append(&lower(pattern).to_tokens_for_dialect(dialect));
                }
            }

            Expr::Exists { subquery, negated } => {
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Exists).space().lparen();
                ts.append(&subquery.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::Cast { expr, ty } => {
                ts.push(Token::Cast).lparen();
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space().push(Token::As).space();
                ts.push(Token::Raw(dialect.cast_type_name(*ty).into()));
                ts.rparen();
            }

            Expr::AtTimeZone { expr, zone } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space().push(Token::AtTimeZone).space();
                ts.append(&zone.to_tokens_for_dialect(dialect));
            }

            Expr::Interval { amount, unit } => {
                ts.append(&dialect.emit_interval(*amount, *unit));
            }

            Expr::Star { table } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::Raw(sql) => {
                ts.push(Token::Raw(sql.clone()));
            }
        }

        ts
    }
}

fn lower(expr: &Expr) -> Expr {
    func("lower", vec![expr.clone()])
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Like => Token::Like,
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create a column reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

/// Create a qualified column reference (table.column).
pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

/// Create an integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

/// Create a string literal.
pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

/// Create a boolean literal.
pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

/// Create a NULL literal.
pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// Create a bound parameter.
pub fn param(value: impl Into<Value>) -> Expr {
    Expr::Param(value.into())
}

/// COUNT(*)
pub fn count_star() -> Expr {
    Expr::Function {
        name: "COUNT".into(),
        args: vec![Expr::Star { table: None }],
        distinct: false,
    }
}

/// COALESCE(args...)
pub fn coalesce(args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: "COALESCE".into(),
        args,
        distinct: false,
    }
}

/// Generic function call.
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

/// Create a raw SQL expression.
///
/// # Security Warning
///
/// **Never pass user input.** Only for expressions defined in a metrics view.
pub fn raw_sql(sql: &str) -> Expr {
    Expr::Raw(sql.into())
}

// =============================================================================
// Expression Builder Trait
// =============================================================================

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    // Comparison operators
    fn eq(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Eq, other.into())
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Ne, other.into())
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gt, other.into())
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gte, other.into())
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lt, other.into())
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lte, other.into())
    }

    // Logical operators

    /// `AND`; an `OR` on either side is parenthesized so it stays one operand.
    fn and(self, other: impl Into<Expr>) -> Expr {
        binary(
            group_or(self.into_expr()),
            BinaryOperator::And,
            group_or(other.into()),
        )
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Or, other.into())
    }

    fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.into_expr()),
        }
    }

    // Arithmetic operators
    fn add(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Plus, other.into())
    }

    fn sub(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Minus, other.into())
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Div, other.into())
    }

    // String matching
    fn ilike(self, pattern: impl Into<Expr>) -> Expr {
        Expr::ILike {
            expr: Box::new(self.into_expr()),
            pattern: Box::new(pattern.into()),
            negated: false,
        }
    }

    fn not_ilike(self, pattern: impl Into<Expr>) -> Expr {
        Expr::ILike {
            expr: Box::new(self.into_expr()),
            pattern: Box::new(pattern.into()),
            negated: true,
        }
    }

    // NULL checks
    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }

    // IN operator
    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: false,
        }
    }

    fn not_in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: true,
        }
    }

    fn cast(self, ty: CastType) -> Expr {
        Expr::Cast {
            expr: Box::new(self.into_expr()),
            ty,
        }
    }

    fn paren(self) -> Expr {
        Expr::Paren(Box::new(self.into_expr()))
    }

    /// Alias this expression (for SELECT list).
    fn alias(self, name: &str) -> SelectExpr {
        SelectExpr {
            expr: self.into_expr(),
            alias: Some(name.into()),
        }
    }
}

fn group_or(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOperator::Or,
            ..
        } => Expr::Paren(Box::new(expr)),
        other => other,
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        lit_int(n as i64)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Param(value)
    }
}

impl From<Query> for Expr {
    fn from(query: Query) -> Self {
        Expr::Subquery(Box::new(query))
    }
}

// =============================================================================
// Tests
// =============================================================================
