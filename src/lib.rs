//! # Mantis Metrics
//!
//! Compiles requests against declarative metrics views into parameterized,
//! dialect-specific SQL, executes them and returns typed results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │       MetricsQuery (toplist, time series, totals,        │
//! │         comparison, rows, aggregation)                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [service: catalog + access policy]
//! ┌─────────────────────────────────────────────────────────┐
//! │  MetricsViewSpec + Access (field check, row filter)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query builders + filter compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │          sql::Query  ──to_sql_with_args──▶ SQL + args    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [StorageEngine]
//! ┌─────────────────────────────────────────────────────────┐
//! │  QueryResult (typed columns, rows, next page token)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mantis_metrics::prelude::*;
//!
//! let catalog = Arc::new(InMemoryCatalog::new().with_view(view));
//! let engine = Arc::new(SqliteEngine::open_in_memory()?);
//! let service = MetricsService::new(catalog, engine);
//! let result = service
//!     .toplist(&Identity::anonymous(), query, CancellationToken::new())
//!     .await?;
//! ```

pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pagination;
pub mod query;
pub mod result;
pub mod service;
pub mod sql;
pub mod telemetry;
pub mod timegrain;

pub use error::{MetricsResult, QueryError, ValidationError};
pub use model::{FilterExpression, MetricsQuery, MetricsViewSpec};
pub use result::{QueryResult, Value};
pub use service::{MetricsService, QueryId};
pub use sql::Dialect;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::engine::{
        Access, CatalogProvider, Identity, InMemoryCatalog, SecurityResolver, SqliteEngine,
        StorageEngine,
    };
    pub use crate::error::{MetricsResult, QueryError};
    pub use crate::model::{
        AggregationQuery, ComparisonQuery, ComparisonSort, ComparisonSortKind, Dimension,
        DimensionSelection, FilterExpression, Measure, MetricsQuery, MetricsViewSpec, Operator,
        RowsQuery, Sort, TimeRange, TimeSeriesQuery, ToplistQuery, TotalsQuery,
    };
    pub use crate::result::{Column, DataType, QueryResult, Row, Value};
    pub use crate::service::{BatchItem, ExecuteOptions, MetricsService, QueryId};
    pub use crate::sql::Dialect;
    pub use crate::timegrain::TimeGrain;
    pub use tokio_util::sync::CancellationToken;
}
