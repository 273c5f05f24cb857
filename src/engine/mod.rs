//! Collaborators of the query service: storage, access policy, catalog.
//!
//! Each is an async trait so that backends can be swapped without touching
//! query compilation. Bundled implementations:
//!
//! - [`SqliteEngine`] - rusqlite, cancellable through SQLite's interrupt
//! - [`InMemoryCatalog`]
//! - [`AllowAll`]

mod catalog;
mod security;
mod sqlite;
mod storage;

pub use catalog::{CatalogError, CatalogProvider, InMemoryCatalog};
pub use security::{Access, AllowAll, Identity, PolicyError, SecurityResolver};
pub use sqlite::SqliteEngine;
pub use storage::{
    ColumnInfo, RowStream, Statement, StorageEngine, StorageError, StorageResult,
};
