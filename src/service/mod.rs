//! The metrics query service.
//!
//! [`MetricsService`] ties the catalog, access policy and storage engine
//! together. It executes single queries, batches of queries and keeps a
//! registry of what is running so that queries can be cancelled by id.

mod batch;
mod registry;
#[allow(clippy::module_inception)]
mod service;

pub use batch::BatchItem;
pub use registry::{CancelOutcome, QueryId, QueryRegistry, RegistrationGuard, RunningQuery};
pub use service::{ExecuteOptions, MetricsService, ViewIssue, DEFAULT_EXECUTION_TIMEOUT};
