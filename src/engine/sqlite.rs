//! SQLite storage engine.
//!
//! Statements run on a blocking thread and stream rows back over a bounded
//! channel. Cancellation is checked between rows and also fires SQLite's
//! interrupt so that a long-running step returns early. The interrupt is
//! connection-wide, so it only fires while the cancelled statement holds the
//! connection.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, InterruptHandle};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::storage::{ColumnInfo, RowStream, Statement, StorageEngine, StorageError, StorageResult};
use crate::result::{Column, DataType, RawValue};
use crate::sql::Dialect;

/// Rows buffered between the SQLite thread and the consumer.
const ROW_BUFFER: usize = 256;

/// SQLite-backed engine over a single connection.
#[derive(Clone)]
pub struct SqliteEngine {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteEngine {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        }
    }

    /// Run a batch of statements without results, e.g. to load fixtures.
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

fn lock(conn: &Mutex<Connection>) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StorageError::backend("SQLite connection lock poisoned"))
}

fn set_flag(flag: &Mutex<bool>, value: bool) {
    match flag.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Marks a statement as owning the connection until dropped.
struct Armed<'a>(&'a Mutex<bool>);

impl<'a> Armed<'a> {
    fn arm(flag: &'a Mutex<bool>) -> Self {
        set_flag(flag, true);
        Self(flag)
    }
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        set_flag(self.0, false);
    }
}

fn to_sql_value(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_raw(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Int(i),
        ValueRef::Real(f) => RawValue::Float(f),
        ValueRef::Text(t) => RawValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => RawValue::Bytes(b.to_vec()),
    }
}

/// Body of the blocking task: prepare, report columns, stream rows.
fn run_statement(
    conn: &Mutex<Connection>,
    armed: &Mutex<bool>,
    statement: &Statement,
    cancel: &CancellationToken,
    columns_tx: oneshot::Sender<StorageResult<Vec<Column>>>,
    rows_tx: &mpsc::Sender<StorageResult<Vec<RawValue>>>,
) {
    let conn = match lock(conn) {
        Ok(c) => c,
        Err(e) => {
            let _ = columns_tx.send(Err(e));
            return;
        }
    };
    // Disarmed before the connection is released.
    let _armed = Armed::arm(armed);
    if cancel.is_cancelled() {
        let _ = columns_tx.send(Err(StorageError::Interrupted));
        return;
    }
    let mut stmt = match conn.prepare(&statement.sql) {
        Ok(s) => s,
        Err(e) => {
            let _ = columns_tx.send(Err(e.into()));
            return;
        }
    };
    // Declared types need the column_decltype feature; types are inferred from values.
    let columns: Vec<Column> = stmt
        .column_names()
        .into_iter()
        .map(|name| Column::new(name, DataType::Unknown))
        .collect();
    let width = columns.len();
    if columns_tx.send(Ok(columns)).is_err() || statement.dry_run {
        return;
    }

    let args = statement.args.iter().map(to_sql_value);
    let mut rows = match stmt.query(params_from_iter(args)) {
        Ok(r) => r,
        Err(e) => {
            let _ = rows_tx.blocking_send(Err(e.into()));
            return;
        }
    };
    loop {
        if cancel.is_cancelled() {
            let _ = rows_tx.blocking_send(Err(StorageError::Interrupted));
            return;
        }
        let item = match rows.next() {
            Ok(Some(row)) => (0..width)
                .map(|i| row.get_ref(i).map(to_raw))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from),
            Ok(None) => return,
            Err(e) => Err(e.into()),
        };
        let failed = item.is_err();
        if rows_tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn supports_cancellation(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        statement: Statement,
        cancel: CancellationToken,
    ) -> StorageResult<RowStream> {
        if cancel.is_cancelled() {
            return Err(StorageError::Interrupted);
        }
        debug!(args = statement.args.len(), dry_run = statement.dry_run, "sqlite execute");

        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, mut rows_rx) = mpsc::channel(ROW_BUFFER);

        // Fires the SQLite interrupt on cancellation while this statement
        // owns the connection. A statement still waiting for the lock sees
        // the cancellation once it gets it.
        let armed = Arc::new(Mutex::new(false));
        let finished = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            let finished = finished.clone();
            let armed = Arc::clone(&armed);
            let interrupt = Arc::clone(&self.interrupt);
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let owns = match armed.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        if *owns {
                            interrupt.interrupt();
                        }
                    }
                    _ = finished.cancelled() => {}
                }
            })
        };

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let _done = finished.drop_guard();
            run_statement(&conn, &armed, &statement, &cancel, columns_tx, &rows_tx);
        });

        let columns = match columns_rx.await {
            Ok(result) => result?,
            Err(_) => {
                watcher.abort();
                return Err(StorageError::Task("statement task ended early".into()));
            }
        };

        let rows = futures::stream::poll_fn(move |cx| rows_rx.poll_recv(cx));
        Ok(RowStream {
            columns,
            rows: Box::pin(rows),
        })
    }

    async fn describe(&self, table: &str) -> StorageResult<Vec<ColumnInfo>> {
        let conn = Arc::clone(&self.conn);
        let table = table.to_string();
        tokio::task::spawn_blocking(move || -> StorageResult<Vec<ColumnInfo>> {
            let conn = lock(&conn)?;
            let (schema, name) = match table.split_once('.') {
                Some((s, t)) => (s.to_string(), t.to_string()),
                None => ("main".to_string(), table.clone()),
            };
            let mut stmt = conn.prepare(
                "SELECT name, type, \"notnull\" FROM pragma_table_info(?1, ?2) ORDER BY cid",
            )?;
            let columns = stmt
                .query_map([&name, &schema], |row| {
                    let raw_type: String = row.get(1)?;
                    let not_null: i64 = row.get(2)?;
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        data_type: DataType::from_sql_type(&raw_type),
                        raw_type,
                        nullable: not_null == 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            if columns.is_empty() {
                return Err(StorageError::TableNotFound(table));
            }
            Ok(columns)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}
