//! Result rows and values.
//!
//! Storage engines yield [`RawValue`]s; [`materialize`] turns them into
//! JSON-shaped [`Value`]s keyed by output field name.

mod materialize;
mod value;

pub use materialize::{
    infer_column_types, materialize, materialize_all, materialize_value, MaterializeError,
    QueryResult, Row,
};
pub use value::{Column, DataType, RawValue, Value};
