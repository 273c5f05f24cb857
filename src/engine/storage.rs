//! Storage engine abstraction.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::result::{Column, DataType, RawValue};
use crate::sql::Dialect;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by a storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend rejected or failed the statement.
    #[error("backend error: {0}")]
    Backend(String),

    /// The statement was interrupted through cancellation.
    #[error("statement interrupted")]
    Interrupted,

    /// `describe` found no such table.
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking task running the statement failed.
    #[error("execution task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Check if this error is the result of cancellation.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Interrupted => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::OperationInterrupted
            }
            _ => false,
        }
    }
}

/// A compiled statement with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    /// Values in placeholder order.
    pub args: Vec<serde_json::Value>,
    /// Scheduling hint; higher runs first on engines that queue.
    pub priority: i32,
    /// Prepare and validate only; no rows are produced.
    pub dry_run: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<serde_json::Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
            priority: 0,
            dry_run: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// A streamed result: column metadata up front, rows as they arrive.
pub struct RowStream {
    pub columns: Vec<Column>,
    pub rows: BoxStream<'static, StorageResult<Vec<RawValue>>>,
}

impl RowStream {
    /// A stream with no rows, as returned by dry runs.
    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Box::pin(futures::stream::empty()),
        }
    }

    /// A stream over rows that are already in memory.
    pub fn from_rows(columns: Vec<Column>, rows: Vec<Vec<RawValue>>) -> Self {
        Self {
            columns,
            rows: Box::pin(futures::stream::iter(rows.into_iter().map(Ok))),
        }
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Column of a backing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Database-specific type name.
    pub raw_type: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// A SQL-capable storage engine.
///
/// Implementations must stop producing rows once `cancel` fires. Engines
/// that can also abort a running statement report so through
/// [`supports_cancellation`](StorageEngine::supports_cancellation).
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// SQL dialect statements must be compiled for.
    fn dialect(&self) -> Dialect;

    /// Whether a running statement can be aborted server-side.
    fn supports_cancellation(&self) -> bool {
        false
    }

    /// Execute a statement.
    async fn execute(
        &self,
        statement: Statement,
        cancel: CancellationToken,
    ) -> StorageResult<RowStream>;

    /// Columns of a table, `schema.table` or `table`.
    async fn describe(&self, table: &str) -> StorageResult<Vec<ColumnInfo>>;
}
