use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::bindings::BindingSet;
use crate::parser;
use crate::parser::ParseError;
use crate::types::Value;

/// A parsed filter expression, e.g. `ref=='A' and interbase_start==100`.
///
/// Expressions are evaluated against a [`BindingSet`] resolved per record;
/// the grammar lives in the `parser` module.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    In,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::In => "in",
        };
        f.write_str(s)
    }
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_expression(s)
    }
}

/// A fault raised while evaluating an expression against a binding set.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown binding `{0}`")]
    UnknownBinding(String),
    #[error("no entry `{key}` in {container} value")]
    UnknownKey { container: &'static str, key: String },
    #[error("cannot apply `{op}` to {lhs} and {rhs}")]
    Type {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("list index {0} out of range")]
    IndexOutOfRange(i64),
}

/// What to do when evaluating a string expression faults.
///
/// `Raise` propagates the fault to the caller (diagnostic use). `Value`
/// substitutes a caller-chosen sentinel so a single malformed record does
/// not abort a batch run; opting in is always explicit.
#[derive(Debug, Clone)]
pub enum FaultPolicy {
    Raise,
    Value(Value),
}

/// Evaluate `expr` against `bindings`, applying the fault policy.
pub fn evaluate_expression(
    expr: &Expr,
    bindings: &BindingSet,
    policy: &FaultPolicy,
) -> Result<Value, EvalError> {
    match evaluate(expr, bindings) {
        Err(fault) => match policy {
            FaultPolicy::Raise => Err(fault),
            FaultPolicy::Value(sentinel) => {
                log::debug!("expression fault, substituting sentinel: {}", fault);
                Ok(sentinel.clone())
            }
        },
        ok => ok,
    }
}

/// Recursive evaluation; faults propagate unconditionally.
pub fn evaluate(expr: &Expr, bindings: &BindingSet) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownBinding(name.clone())),
        Expr::Attr(base, name) => match evaluate(base, bindings)? {
            Value::Map(entries) => {
                entries
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownKey {
                        container: "map",
                        key: name.clone(),
                    })
            }
            other => Err(EvalError::Type {
                op: format!(".{}", name),
                lhs: other.type_name(),
                rhs: "attribute access",
            }),
        },
        Expr::Index(base, key) => index(evaluate(base, bindings)?, evaluate(key, bindings)?),
        Expr::Unary(op, operand) => {
            let operand = evaluate(operand, bindings)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
                UnaryOp::Neg => match operand {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(EvalError::Type {
                        op: "-".into(),
                        lhs: other.type_name(),
                        rhs: "negation",
                    }),
                },
            }
        }
        Expr::Binary(BinOp::And, lhs, rhs) => {
            if !evaluate(lhs, bindings)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(rhs, bindings)?.truthy()))
        }
        Expr::Binary(BinOp::Or, lhs, rhs) => {
            if evaluate(lhs, bindings)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(rhs, bindings)?.truthy()))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, bindings)?;
            let rhs = evaluate(rhs, bindings)?;
            match op {
                BinOp::Eq => Ok(Value::Bool(eq_values(&lhs, &rhs))),
                BinOp::Ne => Ok(Value::Bool(!eq_values(&lhs, &rhs))),
                BinOp::Lt => Ok(Value::Bool(compare(*op, &lhs, &rhs)? == Ordering::Less)),
                BinOp::Le => Ok(Value::Bool(compare(*op, &lhs, &rhs)? != Ordering::Greater)),
                BinOp::Gt => Ok(Value::Bool(compare(*op, &lhs, &rhs)? == Ordering::Greater)),
                BinOp::Ge => Ok(Value::Bool(compare(*op, &lhs, &rhs)? != Ordering::Less)),
                BinOp::In => contains(&lhs, &rhs),
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(*op, lhs, rhs),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }
    }
}

fn index(base: Value, key: Value) -> Result<Value, EvalError> {
    match (base, key) {
        (Value::Map(entries), Value::Str(key)) => {
            entries
                .get(key.as_str())
                .cloned()
                .ok_or(EvalError::UnknownKey {
                    container: "map",
                    key,
                })
        }
        (Value::List(values), Value::Int(i)) => {
            let len = values.len() as i64;
            let at = if i < 0 { len + i } else { i };
            if at < 0 || at >= len {
                return Err(EvalError::IndexOutOfRange(i));
            }
            Ok(values[at as usize].clone())
        }
        (base, key) => Err(EvalError::Type {
            op: "[]".into(),
            lhs: base.type_name(),
            rhs: key.type_name(),
        }),
    }
}

/// Equality with numeric coercion between ints and floats. Mismatched types
/// compare unequal rather than faulting.
fn eq_values(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(l), Value::Float(r)) | (Value::Float(r), Value::Int(l)) => *l as f64 == *r,
        (l, r) => l == r,
    }
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Ordering, EvalError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(l), Value::Int(r)) => l.partial_cmp(r),
        (Value::Str(l), Value::Str(r)) => l.partial_cmp(r),
        (l, r) => match (as_float(l), as_float(r)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };
    ordering.ok_or_else(|| EvalError::Type {
        op: op.to_string(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    })
}

fn contains(needle: &Value, haystack: &Value) -> Result<Value, EvalError> {
    match (needle, haystack) {
        (needle, Value::List(values)) => {
            Ok(Value::Bool(values.iter().any(|v| eq_values(needle, v))))
        }
        (Value::Str(needle), Value::Str(haystack)) => Ok(Value::Bool(haystack.contains(needle))),
        (Value::Str(key), Value::Map(entries)) => {
            Ok(Value::Bool(entries.contains_key(key.as_str())))
        }
        (l, r) => Err(EvalError::Type {
            op: "in".into(),
            lhs: l.type_name(),
            rhs: r.type_name(),
        }),
    }
}

fn arithmetic(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if let (Value::Str(l), Value::Str(r), BinOp::Add) = (&lhs, &rhs, op) {
        return Ok(Value::Str(format!("{}{}", l, r)));
    }
    match (&lhs, &rhs) {
        (Value::Int(l), Value::Int(r)) => match op {
            BinOp::Add => Ok(Value::Int(l + r)),
            BinOp::Sub => Ok(Value::Int(l - r)),
            BinOp::Mul => Ok(Value::Int(l * r)),
            BinOp::Div => {
                if *r == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Float(*l as f64 / *r as f64))
                }
            }
            _ => unreachable!(),
        },
        _ => match (as_float(&lhs), as_float(&rhs)) {
            (Some(l), Some(r)) => match op {
                BinOp::Add => Ok(Value::Float(l + r)),
                BinOp::Sub => Ok(Value::Float(l - r)),
                BinOp::Mul => Ok(Value::Float(l * r)),
                BinOp::Div => {
                    if r == 0.0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(Value::Float(l / r))
                    }
                }
                _ => unreachable!(),
            },
            _ => Err(EvalError::Type {
                op: op.to_string(),
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            }),
        },
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bindings::BindingSet;

    fn bindings(pairs: &[(&str, Value)]) -> BindingSet {
        let mut b = BindingSet::new();
        for (name, value) in pairs {
            b.insert(name, value.clone());
        }
        b
    }

    fn eval(expression: &str, bindings: &BindingSet) -> Result<Value, EvalError> {
        evaluate(&expression.parse().unwrap(), bindings)
    }

    #[test]
    fn test_literals_and_arithmetic() {
        let b = BindingSet::new();
        assert_eq!(eval("1 + 2 * 3", &b).unwrap(), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3", &b).unwrap(), Value::Int(9));
        assert_eq!(eval("-4 + 1", &b).unwrap(), Value::Int(-3));
        assert_eq!(eval("10 / 4", &b).unwrap(), Value::Float(2.5));
        assert_eq!(eval("'a' + 'b'", &b).unwrap(), Value::Str("ab".into()));
        assert!(matches!(eval("1 / 0", &b), Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn test_comparisons() {
        let b = bindings(&[("ref", Value::Str("A".into())), ("depth", Value::Int(30))]);
        assert_eq!(eval("ref == 'A'", &b).unwrap(), Value::Bool(true));
        assert_eq!(eval("ref != \"C\"", &b).unwrap(), Value::Bool(true));
        assert_eq!(eval("depth >= 30", &b).unwrap(), Value::Bool(true));
        assert_eq!(eval("depth < 30", &b).unwrap(), Value::Bool(false));
        // numeric coercion
        assert_eq!(eval("depth == 30.0", &b).unwrap(), Value::Bool(true));
        // mismatched types are unequal, not a fault
        assert_eq!(eval("ref == 1", &b).unwrap(), Value::Bool(false));
        assert_eq!(eval("ref != 1", &b).unwrap(), Value::Bool(true));
        // but ordering across types faults
        assert!(matches!(eval("ref < 1", &b), Err(EvalError::Type { .. })));
    }

    #[test]
    fn test_boolean_operators() {
        let b = bindings(&[
            ("is_reverse", Value::Bool(true)),
            ("is_duplicate", Value::Bool(false)),
        ]);
        assert_eq!(eval("is_reverse", &b).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("is_reverse and is_duplicate", &b).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval("is_reverse or is_duplicate", &b).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval("not is_duplicate", &b).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("is_reverse && !is_duplicate", &b).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_short_circuit() {
        // `missing` is not bound; the left operand decides before the fault
        let b = bindings(&[("flag", Value::Bool(false))]);
        assert_eq!(eval("flag and missing", &b).unwrap(), Value::Bool(false));
        assert_eq!(
            eval("not flag or missing", &b).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            eval("flag or missing", &b),
            Err(EvalError::UnknownBinding(_))
        ));
    }

    #[test]
    fn test_member_access_and_indexing() {
        let mut info = indexmap::IndexMap::new();
        info.insert("DP".to_string(), Value::Int(30));
        info.insert(
            "AF".to_string(),
            Value::List(vec![Value::Float(0.5), Value::Float(0.25)]),
        );
        let b = bindings(&[("info", Value::Map(info))]);
        assert_eq!(eval("info.DP", &b).unwrap(), Value::Int(30));
        assert_eq!(eval("info['DP'] > 10", &b).unwrap(), Value::Bool(true));
        assert_eq!(eval("info.AF[0]", &b).unwrap(), Value::Float(0.5));
        assert_eq!(eval("info.AF[-1]", &b).unwrap(), Value::Float(0.25));
        assert_eq!(eval("'DP' in info", &b).unwrap(), Value::Bool(true));
        assert!(matches!(
            eval("info.MQ", &b),
            Err(EvalError::UnknownKey { .. })
        ));
        assert!(matches!(
            eval("info.AF[2]", &b),
            Err(EvalError::IndexOutOfRange(2))
        ));
    }

    #[test]
    fn test_membership() {
        let b = bindings(&[(
            "filter",
            Value::List(vec![Value::Str("PASS".into())]),
        )]);
        assert_eq!(eval("'PASS' in filter", &b).unwrap(), Value::Bool(true));
        assert_eq!(eval("'q10' in filter", &b).unwrap(), Value::Bool(false));
        assert_eq!(eval("'AC' in 'GACT'", &b).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_fail_soft_returns_sentinel() {
        let b = BindingSet::new();
        let expr: Expr = "undefined_name == 1".parse().unwrap();
        let result =
            evaluate_expression(&expr, &b, &FaultPolicy::Value(Value::Missing)).unwrap();
        assert_eq!(result, Value::Missing);
    }

    #[test]
    fn test_fail_fast_propagates() {
        let b = BindingSet::new();
        let expr: Expr = "undefined_name == 1".parse().unwrap();
        assert!(matches!(
            evaluate_expression(&expr, &b, &FaultPolicy::Raise),
            Err(EvalError::UnknownBinding(name)) if name == "undefined_name"
        ));
    }
}
