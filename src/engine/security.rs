//! Access policies.

use async_trait::async_trait;
use thiserror::Error;

use crate::compiler::CompileError;
use crate::model::{FilterExpression, MetricsViewSpec};

/// Errors raised by access policies. Requests fail closed on all of them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("access to view '{view}' denied")]
    Denied { view: String },

    #[error("field '{field}' of view '{view}' is not accessible")]
    FieldNotAllowed { field: String, view: String },

    /// The resolver itself failed.
    #[error("access policy could not be resolved: {0}")]
    Resolution(String),

    /// The policy's row filter does not compile against the view.
    #[error("invalid row filter in access policy: {0}")]
    RowFilter(#[source] CompileError),
}

/// Who is asking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.into(),
            groups: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}

/// Resolved access of one identity to one view.
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub allowed: bool,
    /// ANDed into every statement against the view.
    pub row_filter: Option<FilterExpression>,
    /// Accessible fields; `None` means all.
    pub fields: Option<Vec<String>>,
}

impl Access {
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            row_filter: None,
            fields: None,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            row_filter: None,
            fields: None,
        }
    }

    pub fn with_row_filter(mut self, filter: FilterExpression) -> Self {
        self.row_filter = Some(filter);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Case-insensitive field check.
    pub fn can_read(&self, field: &str) -> bool {
        match &self.fields {
            None => true,
            Some(fields) => fields.iter().any(|f| f.eq_ignore_ascii_case(field)),
        }
    }

    /// Check the request's fields, failing on the first one not accessible.
    pub fn check(&self, view: &str, fields: &[String]) -> Result<(), PolicyError> {
        if !self.allowed {
            return Err(PolicyError::Denied { view: view.into() });
        }
        match fields.iter().find(|f| !self.can_read(f)) {
            Some(field) => Err(PolicyError::FieldNotAllowed {
                field: field.clone(),
                view: view.into(),
            }),
            None => Ok(()),
        }
    }
}

/// Resolves the access of an identity to a view.
#[async_trait]
pub trait SecurityResolver: Send + Sync {
    async fn resolve(
        &self,
        identity: &Identity,
        view: &MetricsViewSpec,
    ) -> Result<Access, PolicyError>;
}

/// Grants everything to everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl SecurityResolver for AllowAll {
    async fn resolve(
        &self,
        _identity: &Identity,
        _view: &MetricsViewSpec,
    ) -> Result<Access, PolicyError> {
        Ok(Access::allow_all())
    }
}
