//! Query builder - construct SQL queries with a fluent API.

use serde_json::Value;

use super::dialect::{Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};

// =============================================================================
// Select Expression (column with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

// =============================================================================
// Table Reference
// =============================================================================

/// What a FROM item reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// schema.table
    Named {
        schema: Option<String>,
        table: String,
    },
    /// Table-valued function such as `UNNEST(x)`, with optional column aliases.
    Function { expr: Expr, columns: Vec<String> },
    /// Derived table: `(SELECT ...)`
    Subquery(Box<Query>),
}

/// A table reference with an optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub source: TableSource,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            source: TableSource::Named {
                schema: None,
                table: table.into(),
            },
            alias: None,
        }
    }

    /// A table function aliased as `alias(columns...)`.
    pub fn function(expr: Expr, alias: &str, columns: Vec<&str>) -> Self {
        Self {
            source: TableSource::Function {
                expr,
                columns: columns.into_iter().map(String::from).collect(),
            },
            alias: Some(alias.into()),
        }
    }

    /// A derived table, which must be aliased.
    pub fn subquery(query: Query, alias: &str) -> Self {
        Self {
            source: TableSource::Subquery(Box::new(query)),
            alias: Some(alias.into()),
        }
    }

    /// Parse `schema.table` or `table`.
    ///
    /// The name is split on the first dot only; each part is quoted on output.
    pub fn parse(name: &str) -> Self {
        match name.split_once('.') {
            Some((schema, table)) => Self::new(table).with_schema(schema),
            None => Self::new(name),
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        if let TableSource::Named { schema: s, .. } = &mut self.source {
            *s = Some(schema.into());
        }
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        match &self.source {
            TableSource::Named { schema, table } => {
                ts.push(Token::QualifiedIdent {
                    schema: schema.clone(),
                    name: table.clone(),
                });
            }
            TableSource::Function { expr, .. } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
            TableSource::Subquery(query) => {
                ts.lparen().newline();
                ts.append(&query.to_tokens_for_dialect(dialect));
                ts.newline().rparen();
            }
        }
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
            if let TableSource::Function { columns, .. } = &self.source {
                if !columns.is_empty() {
                    ts.lparen();
                    for (i, c) in columns.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.push(Token::Ident(c.clone()));
                    }
                    ts.rparen();
                }
            }
        }
        ts
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Full,
    Cross,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Option<Expr>,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Full => ts.push(Token::Full).space().push(Token::Outer),
            JoinType::Cross => ts.push(Token::Cross),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.table.to_tokens_for_dialect(dialect));

        if let Some(on) = &self.on {
            ts.space().push(Token::On).space();
            ts.append(&on.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: Option<SortDir>,
    pub nulls_last: bool,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Asc),
            nulls_last: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Desc),
            nulls_last: false,
        }
    }

    /// Ascending or descending by flag.
    pub fn by(expr: Expr, desc: bool) -> Self {
        if desc {
            Self::desc(expr)
        } else {
            Self::asc(expr)
        }
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }

    /// Convert to tokens for a specific dialect.
    ///
    /// Dialects without NULLS LAST get a leading `x IS NULL` key.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        if self.nulls_last && !dialect.supports_nulls_ordering() {
            ts.append(&self.expr.clone().is_null().to_tokens_for_dialect(dialect));
            ts.space().push(Token::Asc);
            ts.comma().space();
        }

        ts.append(&self.expr.to_tokens_for_dialect(dialect));

        if let Some(dir) = &self.dir {
            ts.space().push(match dir {
                SortDir::Asc => Token::Asc,
                SortDir::Desc => Token::Desc,
            });
        }

        if self.nulls_last && dialect.supports_nulls_ordering() {
            ts.space().push(Token::NullsLast);
        }

        ts
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// LIMIT and OFFSET clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    /// Delegates to `SqlDialect::emit_limit_offset()` for the actual formatting.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }
}

// =============================================================================
// Common Table Expressions
// =============================================================================

/// A Common Table Expression (WITH clause).
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct Cte {
    pub name: String,
    pub query: Box<Query>,
}

impl Cte {
    pub fn new(name: &str, query: Query) -> Self {
        Self {
            name: name.into(),
            query: Box::new(query),
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.name.clone()));
        ts.space()
            .push(Token::As)
            .space()
            .lparen()
            .newline()
            .append(&self.query.to_tokens_for_dialect(dialect))
            .newline()
            .rparen();
        ts
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// A SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until converted to SQL with to_sql() or to_tokens()"]
pub struct Query {
    pub with: Vec<Cte>,
    pub select: Vec<SelectExpr>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a CTE (WITH clause).
    pub fn with_cte(mut self, cte: Cte) -> Self {
        self.with.push(cte);
        self
    }

    /// Set the SELECT list.
    pub fn select(mut self, exprs: Vec<impl Into<SelectExpr>>) -> Self {
        self.select = exprs.into_iter().map(|e| e.into()).collect();
        self
    }

    /// Set the FROM table.
    pub fn from(mut self, table: TableRef) -> Self {
        self.from = Some(table);
        self
    }

    /// Add a JOIN.
    pub fn join(mut self, join_type: JoinType, table: TableRef, on: Expr) -> Self {
        self.joins.push(Join {
            join_type,
            table,
            on: Some(on),
        });
        self
    }

    /// Add a FULL OUTER JOIN.
    pub fn full_join(self, table: TableRef, on: Expr) -> Self {
        self.join(JoinType::Full, table, on)
    }

    /// Add a CROSS JOIN.
    pub fn cross_join(mut self, table: TableRef) -> Self {
        self.joins.push(Join {
            join_type: JoinType::Cross,
            table,
            on: None,
        });
        self
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).limit = Some(limit);
        self
    }

    /// Set OFFSET. An offset of zero is omitted.
    pub fn offset(mut self, offset: u64) -> Self {
        if offset > 0 {
            self.limit_offset.get_or_insert_with(LimitOffset::default).offset = Some(offset);
        }
        self
    }

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // WITH clause
        if !self.with.is_empty() {
            ts.push(Token::With).space();
            for (i, cte) in self.with.iter().enumerate() {
                if i > 0 {
                    ts.comma().newline();
                }
                ts.append(&cte.to_tokens_for_dialect(dialect));
            }
            ts.newline();
        }

        // SELECT
        ts.push(Token::Select);

        // Columns
        for (i, select_expr) in self.select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&select_expr.to_tokens_for_dialect(dialect));
        }

        // FROM
        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            ts.append(&from.to_tokens_for_dialect(dialect));
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens_for_dialect(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, order_expr) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order_expr.to_tokens_for_dialect(dialect));
            }
        }

        // LIMIT / OFFSET
        if let Some(lo) = &self.limit_offset {
            ts.newline();
            ts.append(&lo.to_tokens(dialect));
        }

        ts
    }

    /// Generate SQL string for a specific dialect, discarding bound values.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_sql_with_args(dialect).0
    }

    /// Generate SQL and its bound values, in placeholder order.
    pub fn to_sql_with_args(&self, dialect: Dialect) -> (String, Vec<Value>) {
        self.to_tokens_for_dialect(dialect).serialize_with_args(dialect)
    }
}

impl std::fmt::Display for Query {
    /// Formats the query using the default dialect (DuckDB).
    ///
    /// For dialect-specific SQL, use [`Query::to_sql`] instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(Dialect::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================
