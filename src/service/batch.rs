//! Concurrent execution of a batch of queries.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Identity;
use crate::error::{MetricsResult, QueryError};
use crate::model::MetricsQuery;
use crate::result::QueryResult;

use super::service::{ExecuteOptions, MetricsService};

/// The outcome of one query of a batch.
#[derive(Debug)]
pub struct BatchItem {
    /// Position of the query in the submitted batch.
    pub index: usize,
    pub result: MetricsResult<QueryResult>,
}

impl MetricsService {
    /// Run a batch of queries, at most `batch.max_concurrency` at a time.
    ///
    /// Items arrive on the returned channel as they complete, so not in
    /// batch order. A failing or panicking query only fails its own item.
    /// Cancelling `cancel` cancels every query still running.
    pub fn dispatch(
        self: &Arc<Self>,
        identity: Identity,
        queries: Vec<MetricsQuery>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<BatchItem> {
        let (tx, rx) = mpsc::channel(queries.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let identity = Arc::new(identity);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let total = queries.len();
            let mut tasks = JoinSet::new();
            for (index, query) in queries.into_iter().enumerate() {
                let service = Arc::clone(&service);
                let semaphore = Arc::clone(&semaphore);
                let identity = Arc::clone(&identity);
                let cancel = cancel.child_token();
                let tx = tx.clone();
                tasks.spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => run_guarded(&service, &identity, query, cancel).await,
                        Err(_) => Err(QueryError::internal("batch semaphore closed")),
                    };
                    // The receiver may be gone; remaining items are dropped.
                    let _ = tx.send(BatchItem { index, result }).await;
                });
            }
            drop(tx);

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "batch task failed");
                }
            }
            debug!(queries = total, "batch finished");
        });

        rx
    }

    /// Run a batch and return every result in batch order.
    pub async fn dispatch_collect(
        self: &Arc<Self>,
        identity: Identity,
        queries: Vec<MetricsQuery>,
        cancel: CancellationToken,
    ) -> Vec<BatchItem> {
        let mut rx = self.dispatch(identity, queries, cancel);
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items.sort_by_key(|item| item.index);
        items
    }
}

async fn run_guarded(
    service: &MetricsService,
    identity: &Identity,
    query: MetricsQuery,
    cancel: CancellationToken,
) -> MetricsResult<QueryResult> {
    let kind = query.kind();
    match AssertUnwindSafe(service.execute(identity, query, ExecuteOptions::default(), cancel))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(kind, "query panicked");
            Err(QueryError::internal(format!("{} query panicked", kind)))
        }
    }
}
