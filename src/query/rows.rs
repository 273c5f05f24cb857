//! Raw rows with keyset pagination.
//!
//! Rows are ordered by the requested sort keys plus a tie-break, nulls last.
//! A page token holds the key values of the last row of the previous page;
//! the next page starts strictly after that row in the sort order.

use crate::error::{MetricsResult, QueryError};
use crate::model::RowsQuery;
use crate::pagination::{PageKey, PageToken};
use crate::result::QueryResult;
use crate::sql::{col, lit_bool, param, Expr, ExprExt, OrderByExpr, Query, SelectExpr};

use super::{dimension_sql, invalid, QueryContext};

/// One key of the keyset order.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Output name.
    pub name: String,
    /// Source expression, usable in WHERE.
    pub expr: Expr,
    pub desc: bool,
    /// Keys on the time dimension round-trip as timestamps.
    pub is_time: bool,
}

impl SortKey {
    /// Rows strictly after `value` on this key, nulls last.
    fn after(&self, value: &PageKey) -> Expr {
        if value.is_null() {
            return lit_bool(false);
        }
        let v = param(value.to_param());
        let beyond = if self.desc {
            self.expr.clone().lt(v)
        } else {
            self.expr.clone().gt(v)
        };
        beyond.or(self.expr.clone().is_null()).paren()
    }

    fn equal(&self, value: &PageKey) -> Expr {
        if value.is_null() {
            self.expr.clone().is_null()
        } else {
            self.expr.clone().eq(param(value.to_param()))
        }
    }
}

/// A compiled rows request.
#[derive(Debug, Clone)]
pub struct RowsPlan {
    pub query: Query,
    pub keys: Vec<SortKey>,
    pub limit: u64,
}

impl RowsPlan {
    pub fn new(ctx: &QueryContext<'_>, q: &RowsQuery) -> MetricsResult<Self> {
        if q.fields.is_empty() {
            return Err(invalid("rows need at least one field"));
        }

        let mut fields: Vec<(String, Expr, bool)> = Vec::with_capacity(q.fields.len());
        for name in &q.fields {
            let field = field(ctx, name)?;
            if fields.iter().any(|(n, _, _)| n.eq_ignore_ascii_case(&field.0)) {
                return Err(invalid(format!("field '{}' is selected more than once", field.0)));
            }
            fields.push(field);
        }

        let lookup = |name: &str| {
            fields
                .iter()
                .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
                .ok_or_else(|| invalid(format!("cannot sort by '{}': not selected", name)))
        };

        let mut keys: Vec<SortKey> = Vec::new();
        let push_key = |keys: &mut Vec<SortKey>, name: &str, desc: bool| -> MetricsResult<()> {
            let (n, expr, is_time) = lookup(name)?;
            if !keys.iter().any(|k| k.name.eq_ignore_ascii_case(n)) {
                keys.push(SortKey {
                    name: n.clone(),
                    expr: expr.clone(),
                    desc,
                    is_time: *is_time,
                });
            }
            Ok(())
        };
        for s in &q.sort {
            push_key(&mut keys, &s.name, s.desc)?;
        }
        match &q.tie_break {
            Some(tie) => push_key(&mut keys, tie, false)?,
            None => {
                for (name, _, _) in &fields {
                    push_key(&mut keys, name, false)?;
                }
            }
        }
        for key in &keys {
            if ctx.view.dimension(&key.name).is_some_and(|d| d.unnest) {
                return Err(invalid(format!(
                    "cannot sort by multi-valued dimension '{}'",
                    key.name
                )));
            }
        }

        let limit = ctx.resolve_limit(q.limit)?;
        let select: Vec<SelectExpr> = fields
            .iter()
            .map(|(name, expr, _)| expr.clone().alias(name))
            .collect();

        let mut query = Query::new().select(select).from(ctx.table());
        if let Some(predicate) = ctx.where_clause(q.filter.as_ref(), q.time_range.as_ref())? {
            query = query.filter(predicate);
        }
        if let Some(token) = &q.page_token {
            let token = PageToken::decode_for(token, keys.len())?;
            query = query.filter(keyset_predicate(&keys, &token.keys));
        }
        let order = keys
            .iter()
            .map(|k| OrderByExpr::by(col(&k.name), k.desc).nulls_last())
            .collect();

        Ok(Self {
            query: query.order_by(order).limit(limit),
            keys,
            limit,
        })
    }

    /// Token for the page after `result`, when the page is full.
    pub fn next_page_token(&self, result: &QueryResult) -> MetricsResult<Option<String>> {
        if (result.rows.len() as u64) < self.limit {
            return Ok(None);
        }
        let Some(last) = result.rows.last() else {
            return Ok(None);
        };
        let keys = self
            .keys
            .iter()
            .map(|k| {
                let value = last.get(&k.name).ok_or_else(|| {
                    QueryError::internal(format!("sort key '{}' missing from row", k.name))
                })?;
                PageKey::from_value(value, k.is_time).ok_or_else(|| {
                    QueryError::internal(format!("sort key '{}' has no page key form", k.name))
                })
            })
            .collect::<MetricsResult<Vec<_>>>()?;
        Ok(Some(PageToken::new(keys).encode()))
    }
}

/// `OR` over keys of (all earlier keys equal AND this key after).
fn keyset_predicate(keys: &[SortKey], values: &[PageKey]) -> Expr {
    let mut branches = Vec::with_capacity(keys.len());
    for i in 0..keys.len() {
        let mut branch = keys[i].after(&values[i]);
        for j in (0..i).rev() {
            branch = keys[j].equal(&values[j]).and(branch);
        }
        branches.push(match branch {
            Expr::Paren(_) => branch,
            other => other.paren(),
        });
    }
    branches
        .into_iter()
        .reduce(|acc, b| acc.or(b))
        .map(|e| e.paren())
        .unwrap_or_else(|| lit_bool(true))
}

/// Output name, source expression and time flag of a selected field.
fn field(ctx: &QueryContext<'_>, name: &str) -> MetricsResult<(String, Expr, bool)> {
    if let Some(dim) = ctx.view.dimension(name) {
        let is_time = dim.time_grain.is_some() || ctx.view.is_time_dimension(&dim.name);
        return Ok((dim.name.clone(), dimension_sql(dim), is_time));
    }
    if let Ok(time) = ctx.time_dimension() {
        if time.eq_ignore_ascii_case(name) {
            return Ok((time.to_string(), col(time), true));
        }
    }
    if ctx.view.measure(name).is_some() {
        return Err(invalid(format!("measure '{}' cannot be selected as a row field", name)));
    }
    Err(invalid(format!("unknown field '{}'", name)))
}
