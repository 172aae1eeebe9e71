//! Predicate expression trees and their evaluator.
//!
//! The evaluator is a side-effect-free collaborator of the table scan: it
//! takes a decoded row and a schema (attribute names in record order) and
//! produces a [`Value`], with [`eval_bool`](EvalContext::eval_bool) as the
//! boolean-result entry point the scan consumes.


use common::{DbError, DbResult};
use std::cmp::Ordering;
use types::Value;

/// Binary comparison and logical operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators (currently just logical NOT).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
}

/// Expression abstract syntax tree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Reference to an attribute by name.
    Attr(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Shorthand for `Attr(op) Literal` comparisons, the common scan shape.
    pub fn cmp_attr(name: &str, op: BinaryOp, value: Value) -> Expr {
        Expr::Binary {
            left: Box::new(Expr::Attr(name.to_string())),
            op,
            right: Box::new(Expr::Literal(value)),
        }
    }
}

/// Evaluation context: the attribute names of the schema, in record order.
pub struct EvalContext<'a> {
    pub schema: &'a [String],
}

impl EvalContext<'_> {
    /// Evaluate an expression over a decoded row.
    pub fn eval(&self, expr: &Expr, row: &[Value]) -> DbResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Attr(name) => {
                let idx = self.find_attr(name)?;
                Ok(row[idx].clone())
            }
            Expr::Unary { op, expr } => {
                let v = self.eval(expr, row)?;
                match op {
                    UnaryOp::Not => {
                        let b = v.as_bool().ok_or(DbError::ExprNotBoolean)?;
                        Ok(Value::Bool(!b))
                    }
                }
            }
            Expr::Binary { left, op, right } => {
                let lv = self.eval(left, row)?;
                let rv = self.eval(right, row)?;
                eval_binary(&lv, *op, &rv)
            }
        }
    }

    /// Evaluate and require a boolean result.
    pub fn eval_bool(&self, expr: &Expr, row: &[Value]) -> DbResult<bool> {
        self.eval(expr, row)?
            .as_bool()
            .ok_or(DbError::ExprNotBoolean)
    }

    /// Resolve an attribute name to its ordinal. An unresolvable operand is
    /// reported as a differing-types comparison; the taxonomy is closed.
    fn find_attr(&self, name: &str) -> DbResult<usize> {
        self.schema
            .iter()
            .position(|attr| attr == name)
            .ok_or(DbError::CompareDifferingTypes)
    }
}

fn eval_binary(l: &Value, op: BinaryOp, r: &Value) -> DbResult<Value> {
    use BinaryOp::*;

    if let And | Or = op {
        let lb = l.as_bool().ok_or(DbError::ExprNotBoolean)?;
        let rb = r.as_bool().ok_or(DbError::ExprNotBoolean)?;
        return Ok(Value::Bool(match op {
            And => lb && rb,
            Or => lb || rb,
            _ => unreachable!(),
        }));
    }

    let ord = l.cmp_same_type(r).ok_or(DbError::CompareDifferingTypes)?;

    let result = match op {
        Eq => ord == Ordering::Equal,
        Ne => ord != Ordering::Equal,
        Lt => ord == Ordering::Less,
        Le => ord != Ordering::Greater,
        Gt => ord == Ordering::Greater,
        Ge => ord != Ordering::Less,
        _ => unreachable!(),
    };

    Ok(Value::Bool(result))
}
