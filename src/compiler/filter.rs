//! Filter tree to SQL predicate.

use serde_json::Value;

use super::error::{CompileError, CompileResult};
use crate::model::{Dimension, DimensionSource, FilterExpression, MetricsViewSpec, Operator};
use crate::sql::{
    col, lit_bool, lit_int, param, raw_sql, table_col, BinaryOperator, Dialect, Expr, ExprExt, Query,
    SqlDialect,
};

/// What identifiers in a filter refer to.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Dimensions of a view, for WHERE clauses.
    Where(&'a MetricsViewSpec),
    /// Output aliases of an aggregation, for measure filters.
    Having(&'a [String]),
}

/// SQL expression for a dimension's values.
///
/// Expression-backed dimensions are parenthesized so they compose with
/// surrounding operators.
pub fn dimension_expr(dim: &Dimension) -> Expr {
    match &dim.source {
        DimensionSource::Column(column) => col(column),
        DimensionSource::Expression(sql) => raw_sql(sql).paren(),
    }
}

/// Alias of the unnest table function for a dimension.
pub fn unnest_alias(dim: &Dimension) -> String {
    format!("{}__unnest", dim.name)
}

/// Compile a filter into SQL text and its bound values.
pub fn compile(
    expr: &FilterExpression,
    scope: Scope<'_>,
    dialect: Dialect,
) -> CompileResult<(String, Vec<Value>)> {
    let predicate = compile_expr(expr, scope, dialect)?;
    Ok(predicate
        .to_tokens_for_dialect(dialect)
        .serialize_with_args(dialect))
}

/// Compile a filter into an expression for embedding into a query.
pub fn compile_expr(
    expr: &FilterExpression,
    scope: Scope<'_>,
    dialect: Dialect,
) -> CompileResult<Expr> {
    FilterCompiler {
        scope,
        dialect,
        unnested: None,
    }
    .compile(expr)
}

/// An unnest dimension bound to the value column of its table function.
#[derive(Clone)]
struct UnnestBinding {
    name: String,
    value: Expr,
}

struct FilterCompiler<'a> {
    scope: Scope<'a>,
    dialect: Dialect,
    unnested: Option<UnnestBinding>,
}

impl FilterCompiler<'_> {
    fn compile(&self, expr: &FilterExpression) -> CompileResult<Expr> {
        match expr {
            FilterExpression::Condition { op, operands } => self.compile_condition(*op, operands),
            FilterExpression::Identifier(name) => self.resolve(name),
            FilterExpression::Literal(value) => scalar_param(value, expr),
        }
    }

    fn compile_condition(&self, op: Operator, operands: &[FilterExpression]) -> CompileResult<Expr> {
        match op {
            Operator::And | Operator::Or => self.compile_junction(op, operands),
            _ => {
                if let Some(dim) = self.unnest_operand(operands)? {
                    return self.compile_unnest(dim, op, operands);
                }
                match op {
                    Operator::In | Operator::NotIn => self.compile_in(op, operands),
                    Operator::Like | Operator::NotLike => self.compile_like(op, operands),
                    _ => self.compile_comparison(op, operands),
                }
            }
        }
    }

    fn compile_junction(&self, op: Operator, operands: &[FilterExpression]) -> CompileResult<Expr> {
        let is_and = op == Operator::And;
        let mut parts = operands
            .iter()
            .map(|o| self.compile(o).map(|e| e.paren()));
        let Some(first) = parts.next() else {
            return Ok(lit_bool(is_and));
        };
        let mut combined = first?;
        for part in parts {
            let part = part?;
            combined = if is_and {
                combined.and(part)
            } else {
                combined.or(part)
            };
        }
        Ok(combined)
    }

    fn compile_in(&self, op: Operator, operands: &[FilterExpression]) -> CompileResult<Expr> {
        if operands.len() < 2 {
            return Err(wrong_arity(op, "at least 2", operands));
        }
        let target = self.identifier_operand(op, operands)?;

        let mut members = Vec::new();
        let mut has_null = false;
        for operand in &operands[1..] {
            let FilterExpression::Literal(value) = operand else {
                return Err(CompileError::InvalidOperand {
                    op: op.to_string(),
                    reason: "expects literal values after the identifier",
                    node: describe(op, operands),
                });
            };
            let items: &[Value] = match value {
                Value::Array(items) => items,
                scalar => std::slice::from_ref(scalar),
            };
            for item in items {
                match item {
                    Value::Null => has_null = true,
                    Value::Array(_) | Value::Object(_) => {
                        return Err(CompileError::UnsupportedLiteral {
                            node: describe(op, operands),
                        })
                    }
                    v => members.push(param(v.clone())),
                }
            }
        }

        let negated = op == Operator::NotIn;
        if members.is_empty() {
            return Ok(match (has_null, negated) {
                (true, false) => target.is_null(),
                (true, true) => target.is_not_null(),
                // No members at all: IN matches nothing, NOT IN everything.
                (false, negated) => lit_bool(negated),
            });
        }

        Ok(match (has_null, negated) {
            (false, false) => target.in_list(members),
            (true, false) => target.clone().in_list(members).or(target.is_null()).paren(),
            (true, true) => target
                .clone()
                .not_in_list(members)
                .and(target.is_not_null())
                .paren(),
            (false, true) => target
                .clone()
                .not_in_list(members)
                .or(target.is_null())
                .paren(),
        })
    }

    fn compile_like(&self, op: Operator, operands: &[FilterExpression]) -> CompileResult<Expr> {
        if operands.len() != 2 {
            return Err(wrong_arity(op, "2", operands));
        }
        let target = self.identifier_operand(op, operands)?;
        let pattern = match &operands[1] {
            FilterExpression::Literal(Value::String(p)) => param(p.clone()),
            _ => {
                return Err(CompileError::UnsupportedLiteral {
                    node: describe(op, operands),
                })
            }
        };
        Ok(match op {
            Operator::NotLike => target
                .clone()
                .not_ilike(pattern)
                .or(target.is_null())
                .paren(),
            _ => target.ilike(pattern),
        })
    }

    fn compile_comparison(&self, op: Operator, operands: &[FilterExpression]) -> CompileResult<Expr> {
        if operands.len() != 2 {
            return Err(wrong_arity(op, "2", operands));
        }

        // Comparing against null: EQ/NEQ become IS [NOT] NULL on the other side.
        let null_side = operands
            .iter()
            .position(|o| matches!(o, FilterExpression::Literal(Value::Null)));
        if let (Some(i), Operator::Eq | Operator::Neq) = (null_side, op) {
            let other = self.compile_operand(op, &operands[1 - i], operands)?;
            return Ok(if op == Operator::Eq {
                other.is_null()
            } else {
                other.is_not_null()
            });
        }

        let bin = match op {
            Operator::Eq => BinaryOperator::Eq,
            Operator::Neq => BinaryOperator::Ne,
            Operator::Lt => BinaryOperator::Lt,
            Operator::Lte => BinaryOperator::Lte,
            Operator::Gt => BinaryOperator::Gt,
            Operator::Gte => BinaryOperator::Gte,
            _ => {
                return Err(CompileError::InvalidOperand {
                    op: op.to_string(),
                    reason: "is not a comparison",
                    node: describe(op, operands),
                })
            }
        };
        let left = self.compile_operand(op, &operands[0], operands)?;
        let right = self.compile_operand(op, &operands[1], operands)?;
        Ok(Expr::BinaryOp {
            left: Box::new(left),
            op: bin,
            right: Box::new(right),
        })
    }

    /// `EXISTS (SELECT 1 FROM unnest(d) WHERE <positive predicate on value>)`.
    ///
    /// Negative operators become `NOT EXISTS` over their positive form, so a
    /// row matches only when none of its values do.
    fn compile_unnest(
        &self,
        dim: &Dimension,
        op: Operator,
        operands: &[FilterExpression],
    ) -> CompileResult<Expr> {
        let alias = unnest_alias(dim);
        let source = self
            .dialect
            .unnest_source(dimension_expr(dim), &alias)
            .ok_or_else(|| CompileError::UnsupportedUnnest {
                name: dim.name.clone(),
                dialect: self.dialect.name().to_string(),
            })?;

        let inner = FilterCompiler {
            scope: self.scope,
            dialect: self.dialect,
            unnested: Some(UnnestBinding {
                name: dim.name.clone(),
                value: table_col(&alias, "value"),
            }),
        };
        let (positive_op, negated) = match op.positive() {
            Some(p) => (p, true),
            None => (op, false),
        };
        let predicate = inner.compile_condition(positive_op, operands)?;
        let subquery = Query::new()
            .select(vec![lit_int(1)])
            .from(source)
            .filter(predicate);
        Ok(Expr::Exists {
            subquery: Box::new(subquery),
            negated,
        })
    }

    /// The first identifier operand that names an unnest dimension not yet bound.
    fn unnest_operand(&self, operands: &[FilterExpression]) -> CompileResult<Option<&Dimension>> {
        let Scope::Where(view) = self.scope else {
            return Ok(None);
        };
        for operand in operands {
            if let FilterExpression::Identifier(name) = operand {
                let Some(dim) = view.dimension(name) else {
                    continue;
                };
                let bound = self
                    .unnested
                    .as_ref()
                    .is_some_and(|b| b.name.eq_ignore_ascii_case(&dim.name));
                if dim.unnest && !bound {
                    return Ok(Some(dim));
                }
            }
        }
        Ok(None)
    }

    fn identifier_operand(&self, op: Operator, operands: &[FilterExpression]) -> CompileResult<Expr> {
        match &operands[0] {
            FilterExpression::Identifier(name) => self.resolve(name),
            _ => Err(CompileError::InvalidOperand {
                op: op.to_string(),
                reason: "requires an identifier as its first operand",
                node: describe(op, operands),
            }),
        }
    }

    /// A scalar comparison operand: identifier, scalar literal, or nested condition.
    fn compile_operand(
        &self,
        op: Operator,
        operand: &FilterExpression,
        operands: &[FilterExpression],
    ) -> CompileResult<Expr> {
        match operand {
            FilterExpression::Identifier(name) => self.resolve(name),
            FilterExpression::Literal(Value::Array(_) | Value::Object(_)) => {
                Err(CompileError::UnsupportedLiteral {
                    node: describe(op, operands),
                })
            }
            FilterExpression::Literal(value) => Ok(param(value.clone())),
            FilterExpression::Condition { .. } => Ok(self.compile(operand)?.paren()),
        }
    }

    fn resolve(&self, name: &str) -> CompileResult<Expr> {
        if let Some(binding) = &self.unnested {
            if binding.name.eq_ignore_ascii_case(name) {
                return Ok(binding.value.clone());
            }
        }
        match self.scope {
            Scope::Where(view) => {
                if let Some(dim) = view.dimension(name) {
                    return Ok(dimension_expr(dim));
                }
                match &view.time_dimension {
                    Some(time) if time.eq_ignore_ascii_case(name) => Ok(col(time)),
                    _ => Err(CompileError::unknown_field(name)),
                }
            }
            Scope::Having(aliases) => aliases
                .iter()
                .find(|a| a.eq_ignore_ascii_case(name))
                .map(|a| col(a))
                .ok_or_else(|| CompileError::unknown_field(name)),
        }
    }
}

fn scalar_param(value: &Value, node: &FilterExpression) -> CompileResult<Expr> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(CompileError::UnsupportedLiteral {
            node: node.describe(),
        }),
        v => Ok(param(v.clone())),
    }
}

fn describe(op: Operator, operands: &[FilterExpression]) -> String {
    FilterExpression::condition(op, operands.to_vec()).describe()
}

fn wrong_arity(op: Operator, expected: &'static str, operands: &[FilterExpression]) -> CompileError {
    CompileError::WrongArity {
        op: op.to_string(),
        expected,
        actual: operands.len(),
        node: describe(op, operands),
    }
}
