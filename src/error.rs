//! Crate-level errors.
//!
//! Every query failure is a [`QueryError`]. Validation errors are raised
//! before any backend call; execution errors name the phase that failed and
//! never carry the compiled SQL.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::engine::{CatalogError, PolicyError, StorageError};
use crate::model::ViewError;
use crate::pagination::PageTokenError;
use crate::result::MaterializeError;
use crate::timegrain::GrainError;

/// Result type for query operations.
pub type MetricsResult<T> = Result<T, QueryError>;

/// The request is malformed for the view it targets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Grain(GrainError),

    #[error(transparent)]
    PageToken(#[from] PageTokenError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Invalid(String),
}

impl ValidationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Errors surfaced by the query service.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    Validation(#[from] ValidationError),

    #[error("{phase} failed: {source}")]
    Execution {
        phase: String,
        #[source]
        source: StorageError,
    },

    #[error("{phase} timed out")]
    Timeout { phase: String },

    #[error("access policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::invalid(message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn execution(phase: &str, source: StorageError) -> Self {
        Self::Execution {
            phase: phase.into(),
            source,
        }
    }

    /// Check if the client caused this error.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Policy(_))
    }

    /// Check if this error came from running a statement.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Timeout { .. })
    }

    /// The phase of a failed execution, if any.
    pub fn phase(&self) -> Option<&str> {
        match self {
            Self::Execution { phase, .. } | Self::Timeout { phase } => Some(phase),
            _ => None,
        }
    }
}

impl From<CompileError> for QueryError {
    fn from(err: CompileError) -> Self {
        Self::Validation(err.into())
    }
}

impl From<PageTokenError> for QueryError {
    fn from(err: PageTokenError) -> Self {
        Self::Validation(err.into())
    }
}

impl From<GrainError> for QueryError {
    fn from(err: GrainError) -> Self {
        if err.is_client_fault() {
            Self::Validation(ValidationError::Grain(err))
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<CatalogError> for QueryError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => Self::Validation(err.into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MaterializeError> for QueryError {
    fn from(err: MaterializeError) -> Self {
        Self::Internal(err.to_string())
    }
}
