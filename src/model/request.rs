//! Query requests against a metrics view.
//!
//! Every request is a [`MetricsQuery`], tagged by `type`:
//!
//! ```json
//! {"type": "toplist", "view": "sales", "dimension": "country", "measures": ["revenue"], "limit": 10}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::filter::FilterExpression;
use crate::timegrain::TimeGrain;

/// Half-open time range `[start, end)` on the view's time dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub grain: Option<TimeGrain>,
    /// IANA zone for day and coarser grains. UTC when unset.
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            grain: None,
            time_zone: None,
        }
    }

    pub fn with_grain(mut self, grain: TimeGrain) -> Self {
        self.grain = Some(grain);
        self
    }

    pub fn with_time_zone(mut self, tz: &str) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    pub fn time_zone(&self) -> &str {
        self.time_zone.as_deref().unwrap_or("UTC")
    }
}

/// Format an instant the way it is bound as a parameter.
pub fn format_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Sort on an output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub name: String,
    #[serde(default)]
    pub desc: bool,
}

impl Sort {
    pub fn asc(name: &str) -> Self {
        Self {
            name: name.into(),
            desc: false,
        }
    }

    pub fn desc(name: &str) -> Self {
        Self {
            name: name.into(),
            desc: true,
        }
    }
}

/// Which value of a compared measure to sort on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonSortKind {
    #[default]
    Base,
    Comparison,
    AbsDelta,
    RelDelta,
}

/// Sort for comparison queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSort {
    pub name: String,
    #[serde(default)]
    pub kind: ComparisonSortKind,
    #[serde(default)]
    pub desc: bool,
}

impl ComparisonSort {
    pub fn new(name: &str, kind: ComparisonSortKind, desc: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            desc,
        }
    }
}

/// A dimension in an aggregation, optionally bucketed by a time grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSelection {
    pub name: String,
    #[serde(default)]
    pub grain: Option<TimeGrain>,
}

impl DimensionSelection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            grain: None,
        }
    }

    pub fn with_grain(mut self, grain: TimeGrain) -> Self {
        self.grain = Some(grain);
        self
    }
}

impl From<&str> for DimensionSelection {
    fn from(name: &str) -> Self {
        DimensionSelection::new(name)
    }
}

/// Top values of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToplistQuery {
    pub view: String,
    pub dimension: String,
    pub measures: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<FilterExpression>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Defaults to the first measure, descending.
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Measures bucketed over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesQuery {
    pub view: String,
    pub measures: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<FilterExpression>,
    /// Must carry a grain.
    pub time_range: TimeRange,
}

/// Measures over the whole filtered range, one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsQuery {
    pub view: String,
    pub measures: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<FilterExpression>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

/// One dimension compared across two time ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonQuery {
    pub view: String,
    pub dimension: String,
    pub measures: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<FilterExpression>,
    pub time_range: TimeRange,
    /// Without it the result only carries base values.
    #[serde(default)]
    pub comparison_time_range: Option<TimeRange>,
    pub sort: Vec<ComparisonSort>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Raw rows with keyset pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsQuery {
    pub view: String,
    /// Dimension names, or the time dimension.
    pub fields: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<FilterExpression>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    /// Final ordering key. Defaults to the selected fields not already sorted on.
    #[serde(default)]
    pub tie_break: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub page_token: Option<String>,
}

/// Grouped breakdown over any number of dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub view: String,
    #[serde(default)]
    pub dimensions: Vec<DimensionSelection>,
    pub measures: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<FilterExpression>,
    /// Filter on measure outputs.
    #[serde(default)]
    pub having: Option<FilterExpression>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Any query the engine serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsQuery {
    Toplist(ToplistQuery),
    TimeSeries(TimeSeriesQuery),
    Totals(TotalsQuery),
    Comparison(ComparisonQuery),
    Rows(RowsQuery),
    Aggregation(AggregationQuery),
}

impl MetricsQuery {
    /// Short name used in logs and error phases.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricsQuery::Toplist(_) => "toplist",
            MetricsQuery::TimeSeries(_) => "time_series",
            MetricsQuery::Totals(_) => "totals",
            MetricsQuery::Comparison(_) => "comparison",
            MetricsQuery::Rows(_) => "rows",
            MetricsQuery::Aggregation(_) => "aggregation",
        }
    }

    pub fn view(&self) -> &str {
        match self {
            MetricsQuery::Toplist(q) => &q.view,
            MetricsQuery::TimeSeries(q) => &q.view,
            MetricsQuery::Totals(q) => &q.view,
            MetricsQuery::Comparison(q) => &q.view,
            MetricsQuery::Rows(q) => &q.view,
            MetricsQuery::Aggregation(q) => &q.view,
        }
    }

    /// Every view field the request reads, for field-level access checks.
    ///
    /// The time dimension is reported by callers that know it; a time range
    /// alone does not name a field.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        let mut add = |name: &str| {
            if !fields.iter().any(|f| f.eq_ignore_ascii_case(name)) {
                fields.push(name.to_string());
            }
        };
        let filters: Vec<&FilterExpression> = match self {
            MetricsQuery::Toplist(q) => {
                add(&q.dimension);
                q.measures.iter().for_each(|m| add(m));
                q.filter.iter().collect()
            }
            MetricsQuery::TimeSeries(q) => {
                q.measures.iter().for_each(|m| add(m));
                q.filter.iter().collect()
            }
            MetricsQuery::Totals(q) => {
                q.measures.iter().for_each(|m| add(m));
                q.filter.iter().collect()
            }
            MetricsQuery::Comparison(q) => {
                add(&q.dimension);
                q.measures.iter().for_each(|m| add(m));
                q.filter.iter().collect()
            }
            MetricsQuery::Rows(q) => {
                q.fields.iter().for_each(|f| add(f));
                q.sort.iter().for_each(|s| add(&s.name));
                q.tie_break.iter().for_each(|t| add(t));
                q.filter.iter().collect()
            }
            MetricsQuery::Aggregation(q) => {
                q.dimensions.iter().for_each(|d| add(&d.name));
                q.measures.iter().for_each(|m| add(m));
                q.filter.iter().chain(q.having.iter()).collect()
            }
        };
        for filter in filters {
            for ident in filter.identifiers() {
                add(ident);
            }
        }
        fields
    }
}
