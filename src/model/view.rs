//! Metrics view definitions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::result::DataType;
use crate::timegrain::TimeGrain;

/// Errors raised while validating a view definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    #[error("view name must not be empty")]
    EmptyName,

    #[error("duplicate field name '{0}' (names are case-insensitive)")]
    DuplicateName(String),

    #[error("dimension '{0}' must set exactly one of column or expression")]
    InvalidSource(String),

    #[error("measure '{0}' must set an expression or builtin = \"count\"")]
    InvalidMeasure(String),
}

/// A metrics view: a table with named dimensions and measures.
///
/// Constructed through [`MetricsViewSpec::new`] or deserialization; both
/// validate that names are unique ignoring case.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ViewDef")]
pub struct MetricsViewSpec {
    pub name: String,
    /// Backing table, `schema.table` or `table`.
    pub table: String,
    /// Timestamp column used for time ranges and time series.
    pub time_dimension: Option<String>,
    pub dimensions: Vec<Dimension>,
    pub measures: Vec<Measure>,
}

#[derive(Deserialize)]
struct ViewDef {
    name: String,
    table: String,
    #[serde(default)]
    time_dimension: Option<String>,
    #[serde(default)]
    dimensions: Vec<Dimension>,
    #[serde(default)]
    measures: Vec<Measure>,
}

impl TryFrom<ViewDef> for MetricsViewSpec {
    type Error = ViewError;

    fn try_from(def: ViewDef) -> Result<Self, Self::Error> {
        MetricsViewSpec::new(
            def.name,
            def.table,
            def.time_dimension,
            def.dimensions,
            def.measures,
        )
    }
}

impl MetricsViewSpec {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        time_dimension: Option<String>,
        dimensions: Vec<Dimension>,
        measures: Vec<Measure>,
    ) -> Result<Self, ViewError> {
        let view = Self {
            name: name.into(),
            table: table.into(),
            time_dimension,
            dimensions,
            measures,
        };
        view.validate()?;
        Ok(view)
    }

    fn validate(&self) -> Result<(), ViewError> {
        if self.name.trim().is_empty() {
            return Err(ViewError::EmptyName);
        }
        // Dimensions and measures share the output namespace of a query.
        let mut seen = HashSet::new();
        let names = self
            .dimensions
            .iter()
            .map(|d| &d.name)
            .chain(self.measures.iter().map(|m| &m.name));
        for name in names {
            if !seen.insert(name.to_lowercase()) {
                return Err(ViewError::DuplicateName(name.clone()));
            }
        }
        Ok(())
    }

    /// Case-insensitive dimension lookup.
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive measure lookup.
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Whether `name` is the view's time dimension.
    pub fn is_time_dimension(&self, name: &str) -> bool {
        self.time_dimension
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(name))
    }
}

/// Where a dimension's values come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSource {
    Column(String),
    /// SQL expression owned by the view author.
    Expression(String),
}

/// A dimension of a metrics view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "DimensionDef")]
pub struct Dimension {
    pub name: String,
    pub source: DimensionSource,
    /// Multi-valued: each row holds a list that is unnested for grouping and filtering.
    pub unnest: bool,
    /// Finest grain the dimension supports. Set only for time dimensions.
    pub time_grain: Option<TimeGrain>,
}

#[derive(Deserialize)]
struct DimensionDef {
    name: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    unnest: bool,
    #[serde(default)]
    time_grain: Option<TimeGrain>,
}

impl TryFrom<DimensionDef> for Dimension {
    type Error = ViewError;

    fn try_from(def: DimensionDef) -> Result<Self, Self::Error> {
        let source = match (def.column, def.expression) {
            (Some(c), None) => DimensionSource::Column(c),
            (None, Some(e)) => DimensionSource::Expression(e),
            _ => return Err(ViewError::InvalidSource(def.name)),
        };
        Ok(Dimension {
            name: def.name,
            source,
            unnest: def.unnest,
            time_grain: def.time_grain,
        })
    }
}

impl Dimension {
    pub fn column(name: &str, column: &str) -> Self {
        Self {
            name: name.into(),
            source: DimensionSource::Column(column.into()),
            unnest: false,
            time_grain: None,
        }
    }

    pub fn expression(name: &str, expression: &str) -> Self {
        Self {
            name: name.into(),
            source: DimensionSource::Expression(expression.into()),
            unnest: false,
            time_grain: None,
        }
    }

    pub fn with_unnest(mut self) -> Self {
        self.unnest = true;
        self
    }

    pub fn with_time_grain(mut self, grain: TimeGrain) -> Self {
        self.time_grain = Some(grain);
        self
    }
}

/// How a measure is aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    /// Aggregate SQL expression, e.g. `SUM(revenue)`.
    Expression(String),
    /// `COUNT(*)`
    Count,
}

/// A measure of a metrics view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "MeasureDef")]
pub struct Measure {
    pub name: String,
    pub kind: MeasureKind,
    pub data_type: Option<DataType>,
}

#[derive(Deserialize)]
struct MeasureDef {
    name: String,
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    builtin: Option<String>,
    #[serde(default)]
    data_type: Option<DataType>,
}

impl TryFrom<MeasureDef> for Measure {
    type Error = ViewError;

    fn try_from(def: MeasureDef) -> Result<Self, Self::Error> {
        let kind = match (def.expression, def.builtin.as_deref()) {
            (Some(e), None) => MeasureKind::Expression(e),
            (None, Some(b)) if b.eq_ignore_ascii_case("count") => MeasureKind::Count,
            _ => return Err(ViewError::InvalidMeasure(def.name)),
        };
        Ok(Measure {
            name: def.name,
            kind,
            data_type: def.data_type,
        })
    }
}

impl Measure {
    pub fn expression(name: &str, expression: &str) -> Self {
        Self {
            name: name.into(),
            kind: MeasureKind::Expression(expression.into()),
            data_type: None,
        }
    }

    pub fn count(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: MeasureKind::Count,
            data_type: Some(DataType::Int),
        }
    }
}
