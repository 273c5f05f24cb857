//! The query service: resolve, authorize, compile, execute, materialize.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::compiler::{compile_expr, Scope};
use crate::config::{Settings, SettingsError};
use crate::engine::{
    AllowAll, CatalogProvider, Identity, PolicyError, RowStream, SecurityResolver, Statement,
    StorageEngine, StorageError,
};
use crate::error::{MetricsResult, QueryError};
use crate::model::{
    AggregationQuery, ComparisonQuery, DimensionSource, MetricsQuery, MetricsViewSpec, RowsQuery,
    TimeSeriesQuery, ToplistQuery, TotalsQuery,
};
use crate::query::{
    build_aggregation, check_unique_dimension, dimension_sql, fill_gaps, measure_expr,
    AggregationPlan, CompileOptions, ComparisonPlan, QueryContext, RowsPlan, TimeSeriesPlan,
};
use crate::result::{materialize_all, QueryResult};
use crate::sql::{Dialect, ExprExt, Query};

use super::registry::{CancelOutcome, QueryId, QueryRegistry, RunningQuery};

/// Default per-statement timeout.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(180);

/// Concurrent dry-runs while validating a view.
const VALIDATION_CONCURRENCY: usize = 10;

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Passed through to the storage engine.
    pub priority: i32,
    /// Identifier to register the query under; generated when unset.
    pub query_id: Option<QueryId>,
}

impl ExecuteOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_query_id(mut self, id: QueryId) -> Self {
        self.query_id = Some(id);
        self
    }
}

/// A problem found while validating a view against its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewIssue {
    pub field: String,
    pub message: String,
}

/// Serves metrics queries against one storage engine.
pub struct MetricsService {
    catalog: Arc<dyn CatalogProvider>,
    engine: Arc<dyn StorageEngine>,
    security: Arc<dyn SecurityResolver>,
    options: CompileOptions,
    timeout: Duration,
    pub(super) max_concurrency: usize,
    registry: QueryRegistry,
}

impl MetricsService {
    /// A service with default settings that allows everything.
    pub fn new(catalog: Arc<dyn CatalogProvider>, engine: Arc<dyn StorageEngine>) -> Self {
        let settings = Settings::default();
        Self {
            catalog,
            engine,
            security: Arc::new(AllowAll),
            options: CompileOptions::from(&settings),
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            max_concurrency: settings.batch.max_concurrency,
            registry: QueryRegistry::new(),
        }
    }

    pub fn with_security(mut self, security: Arc<dyn SecurityResolver>) -> Self {
        self.security = security;
        self
    }

    /// Apply validated settings.
    pub fn with_settings(mut self, settings: &Settings) -> Result<Self, SettingsError> {
        settings.validate()?;
        self.options = CompileOptions::from(settings);
        self.timeout = settings.query.execution_timeout()?;
        self.max_concurrency = settings.batch.max_concurrency;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    /// Execute one query.
    pub async fn execute(
        &self,
        identity: &Identity,
        query: MetricsQuery,
        options: ExecuteOptions,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let started = Instant::now();
        let kind = query.kind();
        let id = options.query_id.unwrap_or_default();

        let spec = self.catalog.metrics_view(query.view()).await?;
        let view: &MetricsViewSpec = &spec;
        let access = self.security.resolve(identity, view).await?;
        access.check(&view.name, &query.referenced_fields())?;
        let dialect = self.engine.dialect();
        if let Some(row_filter) = &access.row_filter {
            compile_expr(row_filter, Scope::Where(view), dialect).map_err(PolicyError::RowFilter)?;
        }

        let token = cancel.child_token();
        let Some(_registration) = self
            .registry
            .register(RunningQuery::new(id, kind, &view.name, token.clone()))
        else {
            return Err(QueryError::invalid(format!("query id {} is already running", id)));
        };

        let ctx = QueryContext::new(view, dialect)
            .with_options(self.options)
            .with_row_filter(access.row_filter.as_ref());
        let executor = Executor {
            engine: self.engine.as_ref(),
            dialect,
            priority: options.priority,
            timeout: self.timeout,
            cancel: token,
            query_id: id,
        };

        let result = dispatch(&ctx, &executor, &query).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(r) => info!(
                query_id = %id,
                kind,
                view = %view.name,
                rows = r.rows.len(),
                elapsed_ms,
                "query completed"
            ),
            Err(QueryError::Cancelled) => {
                warn!(query_id = %id, kind, view = %view.name, elapsed_ms, "query cancelled")
            }
            Err(QueryError::Timeout { phase }) => {
                warn!(query_id = %id, kind, phase = %phase, elapsed_ms, "query timed out")
            }
            Err(QueryError::Internal(message)) => {
                error!(query_id = %id, kind, view = %view.name, error = %message, "query failed")
            }
            Err(e) => info!(query_id = %id, kind, view = %view.name, error = %e, "query rejected"),
        }
        result
    }

    pub async fn toplist(
        &self,
        identity: &Identity,
        query: ToplistQuery,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        self.execute(identity, MetricsQuery::Toplist(query), ExecuteOptions::default(), cancel)
            .await
    }

    pub async fn time_series(
        &self,
        identity: &Identity,
        query: TimeSeriesQuery,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        self.execute(identity, MetricsQuery::TimeSeries(query), ExecuteOptions::default(), cancel)
            .await
    }

    pub async fn totals(
        &self,
        identity: &Identity,
        query: TotalsQuery,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        self.execute(identity, MetricsQuery::Totals(query), ExecuteOptions::default(), cancel)
            .await
    }

    pub async fn comparison(
        &self,
        identity: &Identity,
        query: ComparisonQuery,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        self.execute(identity, MetricsQuery::Comparison(query), ExecuteOptions::default(), cancel)
            .await
    }

    pub async fn rows(
        &self,
        identity: &Identity,
        query: RowsQuery,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        self.execute(identity, MetricsQuery::Rows(query), ExecuteOptions::default(), cancel)
            .await
    }

    pub async fn aggregation(
        &self,
        identity: &Identity,
        query: AggregationQuery,
        cancel: CancellationToken,
    ) -> MetricsResult<QueryResult> {
        self.execute(identity, MetricsQuery::Aggregation(query), ExecuteOptions::default(), cancel)
            .await
    }

    /// Cancel a running query by id.
    pub fn cancel_query(&self, id: &QueryId) -> CancelOutcome {
        let outcome = self.registry.cancel(id, self.engine.supports_cancellation());
        debug!(query_id = %id, ?outcome, "cancel requested");
        outcome
    }

    pub fn running_queries(&self) -> Vec<RunningQuery> {
        self.registry.list()
    }

    /// Check a view against its backing table.
    ///
    /// Column-backed dimensions and the time dimension must exist; every
    /// measure and expression dimension is dry-run. All problems are
    /// reported, not just the first.
    pub async fn validate_view(&self, view: &MetricsViewSpec) -> MetricsResult<Vec<ViewIssue>> {
        let columns = match self.engine.describe(&view.table).await {
            Ok(columns) => columns,
            Err(StorageError::TableNotFound(table)) => {
                return Ok(vec![ViewIssue {
                    field: view.name.clone(),
                    message: format!("table '{}' not found", table),
                }])
            }
            Err(e) => return Err(QueryError::execution("describe", e)),
        };
        let has_column = |name: &str| columns.iter().any(|c| c.name.eq_ignore_ascii_case(name));

        let mut issues = Vec::new();
        let mut probes: Vec<(String, Query)> = Vec::new();
        let ctx = QueryContext::new(view, self.engine.dialect());

        if let Some(time) = &view.time_dimension {
            if !has_column(time) {
                issues.push(ViewIssue {
                    field: time.clone(),
                    message: format!("time column '{}' not found in '{}'", time, view.table),
                });
            }
        }
        for dim in &view.dimensions {
            match &dim.source {
                DimensionSource::Column(column) if !has_column(column) => issues.push(ViewIssue {
                    field: dim.name.clone(),
                    message: format!("column '{}' not found in '{}'", column, view.table),
                }),
                DimensionSource::Column(_) => {}
                DimensionSource::Expression(_) => probes.push((
                    dim.name.clone(),
                    Query::new()
                        .select(vec![dimension_sql(dim).alias(&dim.name)])
                        .from(ctx.table()),
                )),
            }
        }
        for measure in &view.measures {
            probes.push((
                measure.name.clone(),
                Query::new()
                    .select(vec![measure_expr(measure).alias(&measure.name)])
                    .from(ctx.table()),
            ));
        }

        let dialect = self.engine.dialect();
        let engine = self.engine.as_ref();
        let failures: Vec<ViewIssue> = stream::iter(probes)
            .map(move |(field, query)| async move {
                let (sql, args) = query.to_sql_with_args(dialect);
                let statement = Statement::new(sql, args).dry_run();
                match engine.execute(statement, CancellationToken::new()).await {
                    Ok(_) => None,
                    Err(e) => Some(ViewIssue {
                        field,
                        message: e.to_string(),
                    }),
                }
            })
            .buffer_unordered(VALIDATION_CONCURRENCY)
            .filter_map(|issue| async move { issue })
            .collect()
            .await;
        issues.extend(failures);
        issues.sort_by(|a, b| a.field.cmp(&b.field));
        Ok(issues)
    }
}

async fn dispatch(
    ctx: &QueryContext<'_>,
    executor: &Executor<'_>,
    query: &MetricsQuery,
) -> MetricsResult<QueryResult> {
    match query {
        MetricsQuery::Toplist(q) => {
            let plan = AggregationPlan::from_toplist(q);
            executor.run("toplist", &build_aggregation(ctx, &plan)?).await
        }
        MetricsQuery::Totals(q) => {
            let plan = AggregationPlan::from_totals(q);
            executor
                .run("totals", &build_aggregation(ctx, &plan)?)
                .await
                .and_then(|result| match result.rows.len() {
                    1 => Ok(result),
                    n => Err(QueryError::internal(format!("totals returned {} rows", n))),
                })
        }
        MetricsQuery::Aggregation(q) => {
            let plan = AggregationPlan::from_aggregation(q);
            executor.run("aggregation", &build_aggregation(ctx, &plan)?).await
        }
        MetricsQuery::TimeSeries(q) => {
            let plan = TimeSeriesPlan::new(ctx, q)?;
            let result = executor.run("time_series", &plan.query).await?;
            fill_gaps(&plan, result)
        }
        MetricsQuery::Rows(q) => {
            let plan = RowsPlan::new(ctx, q)?;
            let mut result = executor.run("rows", &plan.query).await?;
            result.next_page_token = plan.next_page_token(&result)?;
            Ok(result)
        }
        MetricsQuery::Comparison(q) => run_comparison(ctx, executor, q).await,
    }
}

async fn run_comparison(
    ctx: &QueryContext<'_>,
    executor: &Executor<'_>,
    q: &ComparisonQuery,
) -> MetricsResult<QueryResult> {
    let plan = ComparisonPlan::new(ctx, q)?;
    let result = if plan.is_two_pass() {
        let candidates = executor
            .run("comparison.pass1", &plan.candidates_query(ctx)?)
            .await?;
        let values = plan.candidate_values(&candidates);
        debug!(query_id = %executor.query_id, candidates = values.len(), "comparison candidates found");
        executor
            .run("comparison.pass2", &plan.restricted_query(ctx, values)?)
            .await?
    } else {
        executor.run("comparison", &plan.single_pass(ctx)?).await?
    };
    if plan.comparison.is_some() {
        check_unique_dimension(&result, &plan.dimension)?;
    }
    Ok(result)
}

/// Runs the statements of one query under its cancellation token and timeout.
struct Executor<'a> {
    engine: &'a dyn StorageEngine,
    dialect: Dialect,
    priority: i32,
    timeout: Duration,
    cancel: CancellationToken,
    query_id: QueryId,
}

impl Executor<'_> {
    async fn run(&self, phase: &str, query: &Query) -> MetricsResult<QueryResult> {
        let (sql, args) = query.to_sql_with_args(self.dialect);
        debug!(query_id = %self.query_id, phase, args = args.len(), sql = %sql, "executing statement");
        let statement = Statement::new(sql, args).with_priority(self.priority);
        self.execute(phase, statement).await
    }

    async fn execute(&self, phase: &str, statement: Statement) -> MetricsResult<QueryResult> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let token = self.cancel.child_token();
        let work = async {
            let RowStream { columns, mut rows } =
                self.engine.execute(statement, token.clone()).await?;
            let mut collected = Vec::new();
            while let Some(row) = rows.next().await {
                collected.push(row?);
            }
            Ok::<_, StorageError>((columns, collected))
        };

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(QueryError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, work) => outcome,
        };

        let (columns, rows) = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.is_interrupted() && self.cancel.is_cancelled() => {
                return Err(QueryError::Cancelled)
            }
            Ok(Err(e)) => return Err(QueryError::execution(phase, e)),
            Err(_) => {
                token.cancel();
                return Err(QueryError::Timeout {
                    phase: phase.to_string(),
                });
            }
        };
        debug!(query_id = %self.query_id, phase, rows = rows.len(), "statement finished");
        Ok(materialize_all(columns, rows)?)
    }
}
