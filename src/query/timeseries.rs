//! Measures bucketed over time, gap-filled against the calendar.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{MetricsResult, QueryError};
use crate::model::{format_instant, TimeSeriesQuery};
use crate::result::{Column, DataType, QueryResult, Row, Value};
use crate::sql::{col, lit_int, ExprExt, OrderByExpr, Query, SelectExpr};

use super::{check_time_zone, invalid, measure_expr, validate_range, QueryContext};

/// A compiled time series request.
#[derive(Debug, Clone)]
pub struct TimeSeriesPlan {
    pub query: Query,
    /// Output name of the bucket column.
    pub time_column: String,
    pub measures: Vec<String>,
    /// Every bucket start the result must contain, ascending.
    pub buckets: Vec<DateTime<Utc>>,
}

impl TimeSeriesPlan {
    pub fn new(ctx: &QueryContext<'_>, q: &TimeSeriesQuery) -> MetricsResult<Self> {
        let range = &q.time_range;
        let grain = range
            .grain
            .ok_or_else(|| invalid("a time series needs a time grain"))?;
        if q.measures.is_empty() {
            return Err(invalid("a time series needs at least one measure"));
        }
        validate_range(range.start, range.end)?;
        check_time_zone(range.time_zone())?;
        let time = ctx.time_dimension()?;

        let calendar = ctx.calendar(range.time_zone())?;
        let buckets =
            calendar.bucket_series(range.start, range.end, grain, ctx.options.max_buckets)?;

        let mut select: Vec<SelectExpr> =
            vec![ctx.time_floor(col(time), grain, range.time_zone())?.alias(time)];
        let mut measures = Vec::with_capacity(q.measures.len());
        for name in &q.measures {
            let measure = ctx.measure(name)?;
            if measures.iter().any(|m: &String| m.eq_ignore_ascii_case(&measure.name)) {
                return Err(invalid(format!(
                    "field '{}' is selected more than once",
                    measure.name
                )));
            }
            select.push(measure_expr(measure).alias(&measure.name));
            measures.push(measure.name.clone());
        }

        let mut query = Query::new().select(select).from(ctx.table());
        if let Some(predicate) = ctx.where_clause(q.filter.as_ref(), Some(range))? {
            query = query.filter(predicate);
        }
        let query = query
            .group_by(vec![lit_int(1)])
            .order_by(vec![OrderByExpr::asc(col(time))]);

        Ok(Self {
            query,
            time_column: time.to_string(),
            measures,
            buckets,
        })
    }
}

/// Densify a backend result: one row per bucket, in order, with null
/// measures where the backend had no data.
///
/// A backend bucket that is not on the series means the SQL truncation and
/// the calendar disagree, which is an internal error.
pub fn fill_gaps(plan: &TimeSeriesPlan, result: QueryResult) -> MetricsResult<QueryResult> {
    let mut by_bucket: HashMap<DateTime<Utc>, Row> = HashMap::with_capacity(result.rows.len());
    for row in result.rows {
        let bucket = match row.get(&plan.time_column) {
            Some(value) => parse_bucket(value)?,
            None => {
                return Err(QueryError::internal(format!(
                    "time series row without column '{}'",
                    plan.time_column
                )))
            }
        };
        if plan.buckets.binary_search(&bucket).is_err() {
            tracing::error!(
                bucket = %format_instant(&bucket),
                "backend bucket is not aligned to the calendar"
            );
            return Err(QueryError::internal(format!(
                "backend returned bucket {} outside the series",
                format_instant(&bucket)
            )));
        }
        by_bucket.insert(bucket, row);
    }

    let rows = plan
        .buckets
        .iter()
        .map(|bucket| {
            let source = by_bucket.remove(bucket);
            let mut row = Row::new();
            row.insert(&plan.time_column, Value::String(format_instant(bucket)));
            for m in &plan.measures {
                let value = source
                    .as_ref()
                    .and_then(|r| r.get(m).cloned())
                    .unwrap_or(Value::Null);
                row.insert(m, value);
            }
            row
        })
        .collect();

    let mut columns = vec![Column::new(&plan.time_column, DataType::Timestamp)];
    for m in &plan.measures {
        let data_type = result
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(m))
            .map(|c| c.data_type)
            .unwrap_or_default();
        columns.push(Column::new(m, data_type));
    }

    Ok(QueryResult::new(columns, rows))
}

fn parse_bucket(value: &Value) -> MetricsResult<DateTime<Utc>> {
    let text = value
        .as_str()
        .ok_or_else(|| QueryError::internal(format!("bucket is not a timestamp: {}", value)))?;
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| QueryError::internal(format!("bucket is not a timestamp: {}", text)))
}
