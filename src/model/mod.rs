//! Metrics views, filter trees, and query requests.

pub mod filter;
pub mod request;
pub mod view;

pub use filter::{FilterExpression, Operator};
pub use request::{
    format_instant, AggregationQuery, ComparisonQuery, ComparisonSort, ComparisonSortKind,
    DimensionSelection, MetricsQuery, RowsQuery, Sort, TimeRange, TimeSeriesQuery, ToplistQuery,
    TotalsQuery,
};
pub use view::{Dimension, DimensionSource, Measure, MeasureKind, MetricsViewSpec, ViewError};
