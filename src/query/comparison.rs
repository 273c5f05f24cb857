//! Period-over-period comparison of one dimension.
//!
//! Both periods are grouped by the aggregation builder into the CTEs `base`
//! and `comparison`, then full outer joined on the dimension value with a
//! null-safe condition. For every measure `m` the joined query selects
//!
//! | column          | value                                   |
//! |-----------------|-----------------------------------------|
//! | `m`             | base value                              |
//! | `m__previous`   | comparison value                        |
//! | `m__delta_abs`  | `base - comparison`                     |
//! | `m__delta_rel`  | `(base - comparison) / comparison`      |
//!
//! A relative delta against a null or zero comparison is null.
//!
//! With a limit and a measure sort the service runs two passes: the first
//! finds candidate dimension values, the second runs the joined query
//! restricted to them. See [`ComparisonPlan::candidates_query`].

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{MetricsResult, QueryError};
use crate::model::{ComparisonQuery, ComparisonSortKind, DimensionSelection, FilterExpression, Sort, TimeRange};
use crate::result::QueryResult;
use crate::sql::{
    coalesce, lit_int, lit_null, table_col, CastType, Cte, Expr, ExprExt, OrderByExpr, Query,
    SelectExpr, SqlDialect, TableRef,
};

use super::aggregation::{build_aggregation, grouped, order_by, AggregationPlan};
use super::{invalid, QueryContext};

/// Candidate multiplier for the first pass when none is configured.
pub const DEFAULT_COMPARISON_HEADROOM: u64 = 2;

const BASE: &str = "base";
const COMPARISON: &str = "comparison";

/// One resolved sort key of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonSortKey {
    Dimension { desc: bool },
    Measure {
        name: String,
        kind: ComparisonSortKind,
        desc: bool,
    },
}

impl ComparisonSortKey {
    fn output(&self, dimension: &str) -> String {
        match self {
            ComparisonSortKey::Dimension { .. } => dimension.to_string(),
            ComparisonSortKey::Measure { name, kind, .. } => output_name(name, *kind),
        }
    }

    fn desc(&self) -> bool {
        match self {
            ComparisonSortKey::Dimension { desc } | ComparisonSortKey::Measure { desc, .. } => *desc,
        }
    }
}

/// Output column of a measure for a sort kind.
pub fn output_name(measure: &str, kind: ComparisonSortKind) -> String {
    match kind {
        ComparisonSortKind::Base => measure.to_string(),
        ComparisonSortKind::Comparison => format!("{}__previous", measure),
        ComparisonSortKind::AbsDelta => format!("{}__delta_abs", measure),
        ComparisonSortKind::RelDelta => format!("{}__delta_rel", measure),
    }
}

/// A validated comparison request.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPlan {
    /// Canonical dimension name.
    pub dimension: String,
    /// Canonical measure names, in request order.
    pub measures: Vec<String>,
    pub filter: Option<FilterExpression>,
    pub base: TimeRange,
    pub comparison: Option<TimeRange>,
    pub sort: Vec<ComparisonSortKey>,
    pub limit: u64,
    pub offset: u64,
    limited: bool,
    unnest: bool,
    headroom: u64,
}

impl ComparisonPlan {
    pub fn new(ctx: &QueryContext<'_>, q: &ComparisonQuery) -> MetricsResult<Self> {
        let dim = ctx.dimension(&q.dimension)?;
        if q.measures.is_empty() {
            return Err(invalid("a comparison needs at least one measure"));
        }
        let measures = q
            .measures
            .iter()
            .map(|m| ctx.measure(m).map(|m| m.name.clone()))
            .collect::<MetricsResult<Vec<_>>>()?;

        if q.sort.is_empty() {
            return Err(invalid("sorting is required"));
        }
        let mut sort = Vec::with_capacity(q.sort.len());
        let mut measure_sorts = 0;
        for s in &q.sort {
            if s.name.eq_ignore_ascii_case(&dim.name) {
                sort.push(ComparisonSortKey::Dimension { desc: s.desc });
                continue;
            }
            let measure = ctx.measure(&s.name)?;
            if !measures.iter().any(|m| m.eq_ignore_ascii_case(&measure.name)) {
                return Err(invalid(format!(
                    "sort measure '{}' is not among the selected measures",
                    measure.name
                )));
            }
            measure_sorts += 1;
            if measure_sorts > 1 {
                return Err(invalid("a comparison can be sorted by one measure only"));
            }
            if s.kind != ComparisonSortKind::Base && q.comparison_time_range.is_none() {
                return Err(invalid(format!(
                    "sorting '{}' by {:?} needs a comparison time range",
                    measure.name, s.kind
                )));
            }
            sort.push(ComparisonSortKey::Measure {
                name: measure.name.clone(),
                kind: s.kind,
                desc: s.desc,
            });
        }

        if q.comparison_time_range.is_some() && !ctx.dialect.supports_full_outer_join() {
            return Err(invalid(format!(
                "the {} dialect cannot run comparisons",
                ctx.dialect.name()
            )));
        }

        Ok(Self {
            dimension: dim.name.clone(),
            measures,
            filter: q.filter.clone(),
            base: q.time_range.clone(),
            comparison: q.comparison_time_range.clone(),
            sort,
            limit: ctx.resolve_limit(q.limit)?,
            offset: q.offset.unwrap_or(0),
            limited: q.limit.is_some(),
            unnest: dim.unnest,
            headroom: ctx.options.comparison_headroom.max(1),
        })
    }

    /// The measure sort key, if any.
    fn measure_sort(&self) -> Option<(&str, ComparisonSortKind, bool)> {
        self.sort.iter().find_map(|k| match k {
            ComparisonSortKey::Measure { name, kind, desc } => Some((name.as_str(), *kind, *desc)),
            ComparisonSortKey::Dimension { .. } => None,
        })
    }

    /// Whether the service should find candidates before the joined query.
    pub fn is_two_pass(&self) -> bool {
        self.comparison.is_some() && self.limited && !self.unnest && self.measure_sort().is_some()
    }

    /// Rows requested from the first pass.
    pub fn candidate_limit(&self) -> u64 {
        self.offset
            .saturating_add(self.limit)
            .saturating_mul(self.headroom)
    }

    /// The whole comparison as one statement.
    ///
    /// Without a comparison range this is a plain toplist of the base period.
    pub fn single_pass(&self, ctx: &QueryContext<'_>) -> MetricsResult<Query> {
        match &self.comparison {
            Some(_) => self.joined(ctx, None),
            None => {
                let plan = AggregationPlan {
                    dimensions: vec![DimensionSelection::new(&self.dimension)],
                    measures: self.measures.clone(),
                    filter: self.filter.clone(),
                    time_range: Some(self.base.clone()),
                    sort: self
                        .sort
                        .iter()
                        .map(|k| Sort {
                            name: k.output(&self.dimension),
                            desc: k.desc(),
                        })
                        .collect(),
                    limit: Some(self.limit),
                    offset: Some(self.offset),
                    ..Default::default()
                };
                build_aggregation(ctx, &plan)
            }
        }
    }

    /// First pass: the winning dimension values under the measure sort.
    pub fn candidates_query(&self, ctx: &QueryContext<'_>) -> MetricsResult<Query> {
        let (measure, kind, desc) = self
            .measure_sort()
            .ok_or_else(|| QueryError::internal("candidate pass without a measure sort"))?;
        let range = match kind {
            ComparisonSortKind::Base => Some(&self.base),
            ComparisonSortKind::Comparison => self.comparison.as_ref(),
            ComparisonSortKind::AbsDelta | ComparisonSortKind::RelDelta => {
                let narrowed = Self {
                    measures: vec![measure.to_string()],
                    sort: vec![ComparisonSortKey::Measure {
                        name: measure.to_string(),
                        kind,
                        desc,
                    }],
                    ..self.clone()
                };
                return narrowed.joined_with(ctx, None, self.candidate_limit(), 0);
            }
        };
        let plan = AggregationPlan {
            dimensions: vec![DimensionSelection::new(&self.dimension)],
            measures: vec![measure.to_string()],
            filter: self.filter.clone(),
            time_range: range.cloned(),
            sort: vec![Sort {
                name: measure.to_string(),
                desc,
            }],
            ..Default::default()
        };
        let query = build_aggregation(ctx, &plan)?;
        // The aggregation builder caps the limit; the candidate count may exceed it.
        Ok(Query {
            limit_offset: None,
            ..query
        }
        .limit(self.candidate_limit()))
    }

    /// Dimension values found by the first pass.
    pub fn candidate_values(&self, result: &QueryResult) -> Vec<Value> {
        result
            .rows
            .iter()
            .map(|row| row.get(&self.dimension).map(|v| v.to_json()).unwrap_or(Value::Null))
            .collect()
    }

    /// Second pass: the joined query, restricted when the first pass filled its limit.
    pub fn restricted_query(
        &self,
        ctx: &QueryContext<'_>,
        candidates: Vec<Value>,
    ) -> MetricsResult<Query> {
        if (candidates.len() as u64) < self.candidate_limit() {
            return self.joined(ctx, None);
        }
        self.joined(ctx, Some(candidates))
    }

    fn joined(&self, ctx: &QueryContext<'_>, restrict: Option<Vec<Value>>) -> MetricsResult<Query> {
        self.joined_with(ctx, restrict, self.limit, self.offset)
    }

    fn joined_with(
        &self,
        ctx: &QueryContext<'_>,
        restrict: Option<Vec<Value>>,
        limit: u64,
        offset: u64,
    ) -> MetricsResult<Query> {
        let comparison = self
            .comparison
            .as_ref()
            .ok_or_else(|| QueryError::internal("joined comparison without a comparison range"))?;

        let filter = match restrict {
            Some(values) => {
                let restriction = FilterExpression::in_list(&self.dimension, values);
                Some(match &self.filter {
                    Some(f) => FilterExpression::and(vec![f.clone(), restriction]),
                    None => restriction,
                })
            }
            None => self.filter.clone(),
        };

        let period = |range: &TimeRange| -> MetricsResult<Query> {
            let plan = AggregationPlan {
                dimensions: vec![DimensionSelection::new(&self.dimension)],
                measures: self.measures.clone(),
                filter: filter.clone(),
                time_range: Some(range.clone()),
                ..Default::default()
            };
            Ok(grouped(ctx, &plan)?.query)
        };

        let d = self.dimension.as_str();
        let mut select: Vec<SelectExpr> = vec![
            coalesce(vec![table_col(BASE, d), table_col(COMPARISON, d)]).alias(d),
        ];
        let mut outputs = vec![d.to_string()];
        for m in &self.measures {
            let base = table_col(BASE, m);
            let previous = table_col(COMPARISON, m);
            let delta = base.clone().sub(previous.clone());
            let relative = Expr::Case {
                operand: None,
                when_clauses: vec![(
                    previous
                        .clone()
                        .is_null()
                        .or(previous.clone().eq(lit_int(0))),
                    lit_null(),
                )],
                else_clause: Some(Box::new(delta.clone().cast(CastType::Double).div(previous.clone()))),
            };
            select.push(base.alias(m));
            select.push(previous.alias(&output_name(m, ComparisonSortKind::Comparison)));
            select.push(delta.alias(&output_name(m, ComparisonSortKind::AbsDelta)));
            select.push(relative.alias(&output_name(m, ComparisonSortKind::RelDelta)));
            for kind in [
                ComparisonSortKind::Base,
                ComparisonSortKind::Comparison,
                ComparisonSortKind::AbsDelta,
                ComparisonSortKind::RelDelta,
            ] {
                outputs.push(output_name(m, kind));
            }
        }

        let on = table_col(BASE, d).eq(table_col(COMPARISON, d)).or(table_col(BASE, d)
            .is_null()
            .and(table_col(COMPARISON, d).is_null())
            .paren());

        let sort: Vec<Sort> = self
            .sort
            .iter()
            .map(|k| Sort {
                name: k.output(d),
                desc: k.desc(),
            })
            .collect();
        let order: Vec<OrderByExpr> = order_by(&sort, &outputs, &[d.to_string()])?;

        Ok(Query::new()
            .with_cte(Cte::new(BASE, period(&self.base)?))
            .with_cte(Cte::new(COMPARISON, period(comparison)?))
            .select(select)
            .from(TableRef::new(BASE))
            .full_join(TableRef::new(COMPARISON), on.paren())
            .order_by(order)
            .limit(limit)
            .offset(offset))
    }
}

/// Fail when the joined output holds a dimension value twice.
pub fn check_unique_dimension(result: &QueryResult, dimension: &str) -> MetricsResult<()> {
    let mut seen = HashSet::new();
    for row in &result.rows {
        let key = row
            .get(dimension)
            .map(|v| v.to_json().to_string())
            .unwrap_or_else(|| "null".to_string());
        if !seen.insert(key.clone()) {
            return Err(QueryError::internal(format!(
                "comparison returned dimension value {} more than once",
                key
            )));
        }
    }
    Ok(())
}
