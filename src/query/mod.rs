//! Query builders, one per request shape.
//!
//! Each builder validates its request against the view and produces a SQL
//! [`Query`](crate::sql::Query) plus whatever the service needs to finish
//! the result (gap filling, page tokens, a second comparison pass).
//! Building is pure; nothing here touches a backend.

pub mod aggregation;
pub mod comparison;
pub mod rows;
pub mod timeseries;

pub use aggregation::{build_aggregation, AggregationPlan};
pub use comparison::{
    check_unique_dimension, output_name, ComparisonPlan, ComparisonSortKey,
    DEFAULT_COMPARISON_HEADROOM,
};
pub use rows::{RowsPlan, SortKey};
pub use timeseries::{fill_gaps, TimeSeriesPlan};

use chrono::{DateTime, Utc};

use crate::compiler::{compile_expr, dimension_expr, Scope};
use crate::config::Settings;
use crate::error::{MetricsResult, QueryError, ValidationError};
use crate::model::{
    format_instant, Dimension, FilterExpression, Measure, MeasureKind, MetricsQuery, MetricsViewSpec,
    TimeRange,
};
use crate::sql::{
    col, count_star, param, raw_sql, Dialect, Expr, ExprExt, Query, SqlDialect, TableRef, TimeFloor,
};
use crate::timegrain::{parse_time_zone, Calendar, TimeGrain, DEFAULT_MAX_BUCKETS};

/// Default row cap when a request sets no limit.
pub const DEFAULT_LIMIT: u64 = 10_000;

/// Engine-side limits and calendar defaults applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Limit used when none is given, and the cap on requested limits.
    pub default_limit: u64,
    pub max_buckets: usize,
    /// Candidate multiplier for the first comparison pass.
    pub comparison_headroom: u64,
    pub first_day_of_week: u32,
    pub first_month_of_year: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_buckets: DEFAULT_MAX_BUCKETS,
            comparison_headroom: DEFAULT_COMPARISON_HEADROOM,
            first_day_of_week: 1,
            first_month_of_year: 1,
        }
    }
}

impl From<&Settings> for CompileOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            default_limit: settings.query.default_limit,
            max_buckets: settings.query.max_buckets,
            comparison_headroom: settings.query.comparison_headroom,
            first_day_of_week: settings.calendar.first_day_of_week,
            first_month_of_year: settings.calendar.first_month_of_year,
        }
    }
}

/// Everything a builder needs besides the request itself.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub view: &'a MetricsViewSpec,
    pub dialect: Dialect,
    pub options: CompileOptions,
    /// Policy filter ANDed into every statement.
    pub row_filter: Option<&'a FilterExpression>,
}

impl<'a> QueryContext<'a> {
    pub fn new(view: &'a MetricsViewSpec, dialect: Dialect) -> Self {
        Self {
            view,
            dialect,
            options: CompileOptions::default(),
            row_filter: None,
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_row_filter(mut self, filter: Option<&'a FilterExpression>) -> Self {
        self.row_filter = filter;
        self
    }

    pub fn table(&self) -> TableRef {
        TableRef::parse(&self.view.table)
    }

    pub fn dimension(&self, name: &str) -> MetricsResult<&'a Dimension> {
        self.view
            .dimension(name)
            .ok_or_else(|| invalid(format!("unknown dimension '{}'", name)))
    }

    pub fn measure(&self, name: &str) -> MetricsResult<&'a Measure> {
        self.view
            .measure(name)
            .ok_or_else(|| invalid(format!("unknown measure '{}'", name)))
    }

    /// Name of the view's time dimension.
    pub fn time_dimension(&self) -> MetricsResult<&'a str> {
        self.view.time_dimension.as_deref().ok_or_else(|| {
            invalid(format!(
                "view '{}' has no time dimension",
                self.view.name
            ))
        })
    }

    /// WHERE clause: request filter, policy filter and time range, ANDed.
    pub fn where_clause(
        &self,
        filter: Option<&FilterExpression>,
        time_range: Option<&TimeRange>,
    ) -> MetricsResult<Option<Expr>> {
        let mut parts = Vec::new();
        if let Some(filter) = filter {
            parts.push(compile_expr(filter, Scope::Where(self.view), self.dialect)?);
        }
        if let Some(row_filter) = self.row_filter {
            // Checked when the policy was resolved; a failure here is still a policy error.
            let expr = compile_expr(row_filter, Scope::Where(self.view), self.dialect)
                .map_err(crate::engine::PolicyError::RowFilter)?;
            parts.push(expr);
        }
        if let Some(range) = time_range {
            parts.push(self.time_range_predicate(range)?);
        }
        Ok(and_all(parts))
    }

    /// `time >= ? AND time < ?` with RFC3339 bounds.
    pub fn time_range_predicate(&self, range: &TimeRange) -> MetricsResult<Expr> {
        validate_range(range.start, range.end)?;
        let time = col(self.time_dimension()?);
        Ok(time
            .clone()
            .gte(param(format_instant(&range.start)))
            .and(time.lt(param(format_instant(&range.end))))
            .paren())
    }

    /// Limit after defaulting and clamping to the configured cap.
    pub fn resolve_limit(&self, limit: Option<u64>) -> MetricsResult<u64> {
        match limit {
            None => Ok(self.options.default_limit),
            Some(0) => Err(invalid("limit must be greater than zero")),
            Some(n) => Ok(n.min(self.options.default_limit)),
        }
    }

    /// Calendar for a request time zone.
    pub fn calendar(&self, time_zone: &str) -> MetricsResult<Calendar> {
        Ok(Calendar::parse(
            time_zone,
            self.options.first_day_of_week,
            self.options.first_month_of_year,
        )?)
    }

    /// Truncate a timestamp expression to a grain in the dialect.
    pub fn time_floor(&self, expr: Expr, grain: TimeGrain, time_zone: &str) -> MetricsResult<Expr> {
        let calendar = self.calendar(time_zone)?;
        let floor = TimeFloor {
            grain,
            time_zone: calendar.tz().name().to_string(),
            first_day_of_week: calendar.first_day_of_week(),
            first_month_of_year: calendar.first_month_of_year(),
        };
        self.dialect.time_floor(expr, &floor).ok_or_else(|| {
            invalid(format!(
                "the {} dialect cannot truncate to {} in time zone {}",
                self.dialect.name(),
                grain,
                floor.time_zone
            ))
        })
    }
}

/// The statement a request compiles to, without executing it.
///
/// Comparisons compile to their single-pass form.
pub fn compile_statement(ctx: &QueryContext<'_>, query: &MetricsQuery) -> MetricsResult<Query> {
    match query {
        MetricsQuery::Toplist(q) => build_aggregation(ctx, &AggregationPlan::from_toplist(q)),
        MetricsQuery::Totals(q) => build_aggregation(ctx, &AggregationPlan::from_totals(q)),
        MetricsQuery::Aggregation(q) => {
            build_aggregation(ctx, &AggregationPlan::from_aggregation(q))
        }
        MetricsQuery::TimeSeries(q) => Ok(TimeSeriesPlan::new(ctx, q)?.query),
        MetricsQuery::Rows(q) => Ok(RowsPlan::new(ctx, q)?.query),
        MetricsQuery::Comparison(q) => ComparisonPlan::new(ctx, q)?.single_pass(ctx),
    }
}

/// SQL for a measure.
pub fn measure_expr(measure: &Measure) -> Expr {
    match &measure.kind {
        MeasureKind::Count => count_star(),
        MeasureKind::Expression(sql) => raw_sql(sql),
    }
}

/// SQL for a dimension, re-exported for builders.
pub fn dimension_sql(dim: &Dimension) -> Expr {
    dimension_expr(dim)
}

fn and_all(parts: Vec<Expr>) -> Option<Expr> {
    parts.into_iter().reduce(|acc, e| acc.and(e))
}

pub(crate) fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> MetricsResult<()> {
    if start > end {
        return Err(invalid(format!(
            "time range start {} is after end {}",
            format_instant(&start),
            format_instant(&end)
        )));
    }
    Ok(())
}

/// Validate a time zone name early so SQL never binds an unknown zone.
pub(crate) fn check_time_zone(name: &str) -> MetricsResult<()> {
    parse_time_zone(name)?;
    Ok(())
}

pub(crate) fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::Validation(ValidationError::invalid(message))
}

/// Find an output name ignoring case, returning the canonical spelling.
pub(crate) fn find_output<'n>(outputs: &'n [String], name: &str) -> Option<&'n str> {
    outputs
        .iter()
        .find(|o| o.eq_ignore_ascii_case(name))
        .map(String::as_str)
}
