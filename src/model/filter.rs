//! Boolean filter trees supplied by clients and security policies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    And,
    Or,
    In,
    NotIn,
    Like,
    NotLike,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT_LIKE",
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
        }
    }

    /// The positive form of a negative operator.
    pub fn positive(&self) -> Option<Operator> {
        match self {
            Operator::NotIn => Some(Operator::In),
            Operator::NotLike => Some(Operator::Like),
            Operator::Neq => Some(Operator::Eq),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter expression node.
///
/// JSON form:
/// ```json
/// {"condition": {"op": "IN", "operands": [{"identifier": "country"}, {"literal": ["NO", null]}]}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpression {
    Identifier(String),
    /// String, number, bool, null, or a list of those.
    Literal(Value),
    Condition {
        op: Operator,
        #[serde(default)]
        operands: Vec<FilterExpression>,
    },
}

impl FilterExpression {
    pub fn ident(name: &str) -> Self {
        FilterExpression::Identifier(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        FilterExpression::Literal(value.into())
    }

    pub fn condition(op: Operator, operands: Vec<FilterExpression>) -> Self {
        FilterExpression::Condition { op, operands }
    }

    pub fn and(operands: Vec<FilterExpression>) -> Self {
        Self::condition(Operator::And, operands)
    }

    pub fn or(operands: Vec<FilterExpression>) -> Self {
        Self::condition(Operator::Or, operands)
    }

    /// `name <op> value` with an identifier on the left.
    pub fn compare(op: Operator, name: &str, value: impl Into<Value>) -> Self {
        Self::condition(op, vec![Self::ident(name), Self::lit(value)])
    }

    pub fn in_list(name: &str, values: Vec<Value>) -> Self {
        Self::compare(Operator::In, name, Value::Array(values))
    }

    pub fn not_in_list(name: &str, values: Vec<Value>) -> Self {
        Self::compare(Operator::NotIn, name, Value::Array(values))
    }

    /// Every identifier referenced in the tree, in first-seen order.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpression::Identifier(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            FilterExpression::Literal(_) => {}
            FilterExpression::Condition { operands, .. } => {
                for operand in operands {
                    operand.collect_identifiers(out);
                }
            }
        }
    }

    /// Compact JSON rendering used in error messages.
    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
