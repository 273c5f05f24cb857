//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use mantis_metrics::engine::{
    Access, ColumnInfo, Identity, InMemoryCatalog, PolicyError, RowStream, SecurityResolver,
    SqliteEngine, Statement, StorageEngine, StorageError, StorageResult,
};
use mantis_metrics::model::{Dimension, Measure, MetricsViewSpec};
use mantis_metrics::result::{Column, RawValue};
use mantis_metrics::sql::Dialect;
use mantis_metrics::MetricsService;

/// Orders and page-view events, timestamps as RFC3339 UTC text.
pub const FIXTURE_SQL: &str = r#"
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    country TEXT,
    channel TEXT NOT NULL,
    amount INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    tags TEXT
);
INSERT INTO orders VALUES
    (1, 'NO', 'web', 10, '2024-01-01T10:00:00Z', '["a","b"]'),
    (2, 'NO', 'app', 20, '2024-01-02T09:00:00Z', '["a"]'),
    (3, 'SE', 'web', 5, '2024-01-02T12:00:00Z', '[]'),
    (4, 'SE', 'web', 7, '2024-01-04T08:00:00Z', '["b"]'),
    (5, NULL, 'app', 3, '2024-01-04T09:00:00Z', NULL),
    (6, 'DK', 'web', 1, '2024-01-05T10:00:00Z', '["c"]');

CREATE TABLE events (
    id INTEGER PRIMARY KEY,
    site TEXT NOT NULL,
    ts TEXT NOT NULL
);
INSERT INTO events VALUES
    (1, 'A', '2024-02-03T10:00:00Z'),
    (2, 'A', '2024-02-10T10:00:00Z'),
    (3, 'B', '2024-02-11T10:00:00Z'),
    (4, 'A', '2024-01-05T10:00:00Z'),
    (5, 'B', '2024-01-06T10:00:00Z'),
    (6, 'B', '2024-01-20T10:00:00Z');
"#;

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn sales_view() -> MetricsViewSpec {
    MetricsViewSpec::new(
        "sales",
        "orders",
        Some("created_at".into()),
        vec![
            Dimension::column("country", "country"),
            Dimension::column("channel", "channel"),
            Dimension::column("id", "id"),
            Dimension::column("tags", "tags").with_unnest(),
        ],
        vec![
            Measure::count("orders"),
            Measure::expression("revenue", "SUM(amount)"),
        ],
    )
    .unwrap()
}

pub fn traffic_view() -> MetricsViewSpec {
    MetricsViewSpec::new(
        "traffic",
        "events",
        Some("ts".into()),
        vec![Dimension::column("site", "site")],
        vec![Measure::count("events")],
    )
    .unwrap()
}

pub fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_view(sales_view())
        .with_view(traffic_view())
}

pub fn sqlite() -> SqliteEngine {
    let engine = SqliteEngine::open_in_memory().unwrap();
    engine.execute_batch(FIXTURE_SQL).unwrap();
    engine
}

/// A service over the SQLite fixture that allows everything.
pub fn sqlite_service() -> MetricsService {
    MetricsService::new(Arc::new(catalog()), Arc::new(sqlite()))
}

/// Grants per subject, then per group; anyone else is denied.
#[derive(Default)]
pub struct StaticPolicy {
    grants: HashMap<String, Access>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, subject: &str, access: Access) -> Self {
        self.grants.insert(subject.into(), access);
        self
    }
}

#[async_trait]
impl SecurityResolver for StaticPolicy {
    async fn resolve(
        &self,
        identity: &Identity,
        _view: &MetricsViewSpec,
    ) -> Result<Access, PolicyError> {
        let by_group = || {
            identity
                .groups
                .iter()
                .find_map(|g| self.grants.get(&format!("group:{}", g)))
        };
        Ok(self
            .grants
            .get(&identity.subject)
            .or_else(by_group)
            .cloned()
            .unwrap_or_else(Access::deny))
    }
}

/// What a scripted engine does for each statement.
#[derive(Clone)]
pub enum Script {
    /// Return these columns and rows.
    Rows(Vec<Column>, Vec<Vec<RawValue>>),
    /// Fail with a backend error.
    Fail(String),
    /// Block until the statement is cancelled.
    Hang,
    /// Sleep, then return no rows.
    Sleep(Duration),
}

/// Engine that replays scripted responses and records what it was sent.
pub struct ScriptedEngine {
    dialect: Dialect,
    cancellable: bool,
    scripts: Mutex<Vec<Script>>,
    fallback: Script,
    pub statements: Mutex<Vec<Statement>>,
}

impl ScriptedEngine {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            cancellable: false,
            scripts: Mutex::new(Vec::new()),
            fallback: Script::Rows(Vec::new(), Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Responses for the next statements, in order.
    pub fn then(self, script: Script) -> Self {
        self.scripts.lock().unwrap().push(script);
        self
    }

    /// Response once the scripted ones are used up.
    pub fn otherwise(mut self, script: Script) -> Self {
        self.fallback = script;
        self
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }
}

#[async_trait]
impl StorageEngine for ScriptedEngine {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn supports_cancellation(&self) -> bool {
        self.cancellable
    }

    async fn execute(
        &self,
        statement: Statement,
        cancel: CancellationToken,
    ) -> StorageResult<RowStream> {
        self.statements.lock().unwrap().push(statement);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                self.fallback.clone()
            } else {
                scripts.remove(0)
            }
        };
        match script {
            Script::Rows(columns, rows) => Ok(RowStream::from_rows(columns, rows)),
            Script::Fail(message) => Err(StorageError::backend(message)),
            Script::Hang => {
                cancel.cancelled().await;
                Err(StorageError::Interrupted)
            }
            Script::Sleep(duration) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(StorageError::Interrupted),
                    _ = tokio::time::sleep(duration) => Ok(RowStream::empty(Vec::new())),
                }
            }
        }
    }

    async fn describe(&self, table: &str) -> StorageResult<Vec<ColumnInfo>> {
        Err(StorageError::TableNotFound(table.into()))
    }
}
