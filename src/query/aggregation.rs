//! Grouped breakdowns: toplist, totals and general aggregation.

use crate::compiler::{compile_expr, unnest_alias, CompileError, Scope};
use crate::error::MetricsResult;
use crate::model::{
    AggregationQuery, DimensionSelection, FilterExpression, Sort, TimeRange, ToplistQuery,
    TotalsQuery,
};
use crate::sql::{col, lit_int, table_col, Expr, ExprExt, OrderByExpr, Query, SelectExpr, SqlDialect, TableRef};

use super::{dimension_sql, find_output, invalid, measure_expr, QueryContext};

/// Alias of the derived table that HAVING filters are applied to.
const AGGREGATE_ALIAS: &str = "agg";

/// A grouped query before it is rendered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationPlan {
    pub dimensions: Vec<DimensionSelection>,
    pub measures: Vec<String>,
    pub filter: Option<FilterExpression>,
    /// Filter on output aliases, applied after grouping.
    pub having: Option<FilterExpression>,
    pub time_range: Option<TimeRange>,
    pub sort: Vec<Sort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Single totals row: no sort, no limit.
    pub totals: bool,
}

impl AggregationPlan {
    /// One dimension, sorted by the first measure descending unless told otherwise.
    pub fn from_toplist(q: &ToplistQuery) -> Self {
        let sort = if q.sort.is_empty() {
            q.measures.first().map(|m| vec![Sort::desc(m)]).unwrap_or_default()
        } else {
            q.sort.clone()
        };
        Self {
            dimensions: vec![DimensionSelection::new(&q.dimension)],
            measures: q.measures.clone(),
            filter: q.filter.clone(),
            having: None,
            time_range: q.time_range.clone(),
            sort,
            limit: q.limit,
            offset: q.offset,
            totals: false,
        }
    }

    pub fn from_totals(q: &TotalsQuery) -> Self {
        Self {
            measures: q.measures.clone(),
            filter: q.filter.clone(),
            time_range: q.time_range.clone(),
            totals: true,
            ..Default::default()
        }
    }

    pub fn from_aggregation(q: &AggregationQuery) -> Self {
        Self {
            dimensions: q.dimensions.clone(),
            measures: q.measures.clone(),
            filter: q.filter.clone(),
            having: q.having.clone(),
            time_range: q.time_range.clone(),
            sort: q.sort.clone(),
            limit: q.limit,
            offset: q.offset,
            totals: q.dimensions.is_empty(),
        }
    }
}

/// Grouped SELECT without ordering or pagination.
#[derive(Debug, Clone)]
pub(crate) struct Grouped {
    pub query: Query,
    /// Dimension output names, in select order.
    pub dimensions: Vec<String>,
    /// Measure output names, in select order.
    pub measures: Vec<String>,
}

impl Grouped {
    pub fn outputs(&self) -> Vec<String> {
        self.dimensions.iter().chain(&self.measures).cloned().collect()
    }
}

/// Build the SQL for an aggregation plan.
pub fn build_aggregation(ctx: &QueryContext<'_>, plan: &AggregationPlan) -> MetricsResult<Query> {
    if plan.totals && !plan.dimensions.is_empty() {
        return Err(invalid("a totals query takes no dimensions"));
    }
    let grouped = grouped(ctx, plan)?;
    let outputs = grouped.outputs();

    let mut query = match &plan.having {
        Some(having) => {
            let predicate = compile_expr(having, Scope::Having(&outputs), ctx.dialect)?;
            Query::new()
                .select(vec![Expr::Star { table: None }])
                .from(TableRef::subquery(grouped.query, AGGREGATE_ALIAS))
                .filter(predicate)
        }
        None => grouped.query,
    };

    if plan.totals {
        return Ok(query);
    }

    query = query.order_by(order_by(&plan.sort, &outputs, &grouped.dimensions)?);
    let limit = ctx.resolve_limit(plan.limit)?;
    Ok(query.limit(limit).offset(plan.offset.unwrap_or(0)))
}

/// ORDER BY on output aliases, nulls last, with the dimensions appended as a
/// tiebreak so that pages are stable.
pub(crate) fn order_by(
    sort: &[Sort],
    outputs: &[String],
    dimensions: &[String],
) -> MetricsResult<Vec<OrderByExpr>> {
    let mut keys: Vec<&str> = Vec::new();
    let mut order = Vec::new();
    for s in sort {
        let name = find_output(outputs, &s.name)
            .ok_or_else(|| invalid(format!("cannot sort by '{}': not selected", s.name)))?;
        if keys.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            continue;
        }
        keys.push(name);
        order.push(OrderByExpr::by(col(name), s.desc).nulls_last());
    }
    for dim in dimensions {
        if !keys.iter().any(|k| k.eq_ignore_ascii_case(dim)) {
            order.push(OrderByExpr::asc(col(dim)).nulls_last());
        }
    }
    Ok(order)
}

pub(crate) fn grouped(ctx: &QueryContext<'_>, plan: &AggregationPlan) -> MetricsResult<Grouped> {
    if plan.dimensions.is_empty() && plan.measures.is_empty() {
        return Err(invalid("at least one dimension or measure is required"));
    }

    let time_zone = plan
        .time_range
        .as_ref()
        .map(|r| r.time_zone().to_string())
        .unwrap_or_else(|| "UTC".to_string());

    let mut select: Vec<SelectExpr> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut query = Query::new().from(ctx.table());

    for selection in &plan.dimensions {
        let (name, expr) = dimension_column(ctx, selection, &time_zone, &mut query)?;
        push_unique(&mut names, &name)?;
        select.push(expr.alias(&name));
    }
    let dimensions = names.clone();

    for measure_name in &plan.measures {
        let measure = ctx.measure(measure_name)?;
        push_unique(&mut names, &measure.name)?;
        select.push(measure_expr(measure).alias(&measure.name));
    }
    let measures = names[dimensions.len()..].to_vec();

    query = query.select(select);
    if let Some(predicate) = ctx.where_clause(plan.filter.as_ref(), plan.time_range.as_ref())? {
        query = query.filter(predicate);
    }
    if !dimensions.is_empty() {
        query = query.group_by((1..=dimensions.len() as i64).map(lit_int).collect());
    }

    Ok(Grouped {
        query,
        dimensions,
        measures,
    })
}

/// Output name and select expression of one dimension selection. Unnest
/// dimensions add a cross join to `query`.
fn dimension_column(
    ctx: &QueryContext<'_>,
    selection: &DimensionSelection,
    time_zone: &str,
    query: &mut Query,
) -> MetricsResult<(String, Expr)> {
    if let Some(dim) = ctx.view.dimension(&selection.name) {
        let mut expr = dimension_sql(dim);
        if let Some(grain) = selection.grain {
            let finest = match dim.time_grain {
                Some(g) => g,
                None if ctx.view.is_time_dimension(&dim.name) => grain,
                None => {
                    return Err(invalid(format!(
                        "dimension '{}' does not support a time grain",
                        dim.name
                    )))
                }
            };
            if grain < finest {
                return Err(invalid(format!(
                    "grain {} is finer than the {} grain of dimension '{}'",
                    grain, finest, dim.name
                )));
            }
            expr = ctx.time_floor(expr, grain, time_zone)?;
        }
        if dim.unnest {
            let alias = unnest_alias(dim);
            let source = ctx.dialect.unnest_source(expr, &alias).ok_or_else(|| {
                CompileError::UnsupportedUnnest {
                    name: dim.name.clone(),
                    dialect: ctx.dialect.name().to_string(),
                }
            })?;
            *query = std::mem::take(query).cross_join(source);
            expr = table_col(&alias, "value");
        }
        return Ok((dim.name.clone(), expr));
    }

    // The time dimension can be selected without being declared.
    let time = ctx.time_dimension().ok().filter(|t| t.eq_ignore_ascii_case(&selection.name));
    match time {
        Some(time) => {
            let expr = match selection.grain {
                Some(grain) => ctx.time_floor(col(time), grain, time_zone)?,
                None => col(time),
            };
            Ok((time.to_string(), expr))
        }
        None => Err(invalid(format!("unknown dimension '{}'", selection.name))),
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) -> MetricsResult<()> {
    if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        return Err(invalid(format!("field '{}' is selected more than once", name)));
    }
    names.push(name.to_string());
    Ok(())
}
