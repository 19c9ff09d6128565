//! Tree-walking evaluator.
//!
//! Values are `serde_json::Value`, which keeps the namespace, snapshots,
//! and host-function boundary on one representation. Evaluation is async
//! only so host functions can await; everything else is synchronous.

use crate::host::HostFn;
use crate::parser::{BinOp, Expr, Stmt, UnOp};
use futures::future::BoxFuture;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A runtime failure, classified Python-style for model feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// Error class, e.g. `NameError`, `TypeError`.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl RuntimeError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn name(message: impl Into<String>) -> Self {
        Self::new("NameError", message)
    }

    fn type_(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    fn index(message: impl Into<String>) -> Self {
        Self::new("IndexError", message)
    }

    fn key(message: impl Into<String>) -> Self {
        Self::new("KeyError", message)
    }

    fn value(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }
}

pub(crate) struct Interp<'a> {
    pub namespace: &'a mut HashMap<String, Value>,
    pub host_fns: &'a HashMap<String, Arc<dyn HostFn>>,
    pub stdout: &'a mut String,
}

impl<'a> Interp<'a> {
    pub async fn exec_block(&mut self, stmts: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in stmts {
            self.exec_stmt(stmt).await?;
        }
        Ok(())
    }

    fn exec_stmt<'b>(&'b mut self, stmt: &'b Stmt) -> BoxFuture<'b, Result<(), RuntimeError>> {
        Box::pin(async move {
            match stmt {
                Stmt::Assign { name, value } => {
                    let value = self.eval(value).await?;
                    self.namespace.insert(name.clone(), value);
                    Ok(())
                }
                Stmt::Expr(expr) => {
                    self.eval(expr).await?;
                    Ok(())
                }
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let cond = self.eval(cond).await?;
                    if truthy(&cond) {
                        self.exec_block(then_block).await
                    } else {
                        self.exec_block(else_block).await
                    }
                }
                Stmt::For {
                    name,
                    iterable,
                    body,
                } => {
                    let iterable = self.eval(iterable).await?;
                    let items: Vec<Value> = match iterable {
                        Value::Array(items) => items,
                        Value::String(s) => {
                            s.chars().map(|c| Value::String(c.to_string())).collect()
                        }
                        Value::Object(map) => {
                            let mut keys: Vec<&String> = map.keys().collect();
                            keys.sort();
                            keys.into_iter()
                                .map(|k| Value::String(k.clone()))
                                .collect()
                        }
                        other => {
                            return Err(RuntimeError::type_(format!(
                                "cannot iterate over {}",
                                kind_of(&other)
                            )));
                        }
                    };
                    for item in items {
                        self.namespace.insert(name.clone(), item);
                        self.exec_block(body).await?;
                    }
                    Ok(())
                }
            }
        })
    }

    fn eval<'b>(&'b mut self, expr: &'b Expr) -> BoxFuture<'b, Result<Value, RuntimeError>> {
        Box::pin(async move {
            match expr {
                Expr::Number(num) => num_value(*num),
                Expr::Str(s) => Ok(Value::String(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Var(name) => self
                    .namespace
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::name(format!("name '{name}' is not defined"))),
                Expr::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item).await?);
                    }
                    Ok(Value::Array(out))
                }
                Expr::Map(entries) => {
                    let mut map = Map::new();
                    for (key, value) in entries {
                        let key = match self.eval(key).await? {
                            Value::String(s) => s,
                            other => {
                                return Err(RuntimeError::type_(format!(
                                    "map keys must be strings, got {}",
                                    kind_of(&other)
                                )));
                            }
                        };
                        map.insert(key, self.eval(value).await?);
                    }
                    Ok(Value::Object(map))
                }
                Expr::Unary { op, operand } => {
                    let value = self.eval(operand).await?;
                    match op {
                        UnOp::Not => Ok(Value::Bool(!truthy(&value))),
                        UnOp::Neg => match numeric(&value) {
                            Some(NumVal::Int(i)) => i
                                .checked_neg()
                                .map(int_value)
                                .ok_or_else(|| RuntimeError::value("integer overflow")),
                            Some(NumVal::Float(f)) => float_value(-f),
                            None => Err(RuntimeError::type_(format!(
                                "cannot negate {}",
                                kind_of(&value)
                            ))),
                        },
                    }
                }
                Expr::Binary { op, lhs, rhs } => {
                    // and/or short-circuit and yield the deciding operand.
                    if *op == BinOp::And {
                        let lhs = self.eval(lhs).await?;
                        if !truthy(&lhs) {
                            return Ok(lhs);
                        }
                        return self.eval(rhs).await;
                    }
                    if *op == BinOp::Or {
                        let lhs = self.eval(lhs).await?;
                        if truthy(&lhs) {
                            return Ok(lhs);
                        }
                        return self.eval(rhs).await;
                    }
                    let lhs = self.eval(lhs).await?;
                    let rhs = self.eval(rhs).await?;
                    binary(*op, lhs, rhs)
                }
                Expr::Index { container, index } => {
                    let container = self.eval(container).await?;
                    let index = self.eval(index).await?;
                    index_value(&container, &index)
                }
                Expr::Call { name, args } => {
                    let mut evaluated = Vec::with_capacity(args.len());
                    for arg in args {
                        evaluated.push(self.eval(arg).await?);
                    }
                    if name == "print" {
                        let line = evaluated
                            .iter()
                            .map(display_value)
                            .collect::<Vec<_>>()
                            .join(" ");
                        self.stdout.push_str(&line);
                        self.stdout.push('\n');
                        return Ok(Value::Null);
                    }
                    if is_builtin(name) {
                        return apply_builtin(name, evaluated);
                    }
                    if let Some(host) = self.host_fns.get(name.as_str()) {
                        return host
                            .call(evaluated)
                            .await
                            .map_err(|message| RuntimeError::new("HostError", message));
                    }
                    Err(RuntimeError::name(format!(
                        "function '{name}' is not defined"
                    )))
                }
            }
        })
    }
}

// ── Value helpers ─────────────────────────────────────────────

enum NumVal {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<NumVal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(NumVal::Int(i))
            } else {
                n.as_f64().map(NumVal::Float)
            }
        }
        _ => None,
    }
}

fn num_value(num: crate::lexer::Num) -> Result<Value, RuntimeError> {
    match num {
        crate::lexer::Num::Int(i) => Ok(int_value(i)),
        crate::lexer::Num::Float(f) => float_value(f),
    }
}

fn int_value(i: i64) -> Value {
    Value::Number(Number::from(i))
}

fn float_value(f: f64) -> Result<Value, RuntimeError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| RuntimeError::value("result is not a finite number"))
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// The `str()`/`print` rendering: strings bare, everything else JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    use BinOp::*;
    match op {
        Add => match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::Array(out))
            }
            _ => arith(op, &lhs, &rhs),
        },
        Sub | Mul | Div | Rem => arith(op, &lhs, &rhs),
        Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        Lt | Le | Gt | Ge => compare(op, &lhs, &rhs),
        And | Or => unreachable!("short-circuited in eval"),
    }
}

fn arith(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let (Some(a), Some(b)) = (numeric(lhs), numeric(rhs)) else {
        return Err(RuntimeError::type_(format!(
            "unsupported operand types: {} and {}",
            kind_of(lhs),
            kind_of(rhs)
        )));
    };
    match (a, b) {
        (NumVal::Int(a), NumVal::Int(b)) => match op {
            BinOp::Add => a
                .checked_add(b)
                .map(int_value)
                .ok_or_else(|| RuntimeError::value("integer overflow")),
            BinOp::Sub => a
                .checked_sub(b)
                .map(int_value)
                .ok_or_else(|| RuntimeError::value("integer overflow")),
            BinOp::Mul => a
                .checked_mul(b)
                .map(int_value)
                .ok_or_else(|| RuntimeError::value("integer overflow")),
            BinOp::Div => {
                if b == 0 {
                    Err(RuntimeError::value("division by zero"))
                } else {
                    float_value(a as f64 / b as f64)
                }
            }
            BinOp::Rem => {
                if b == 0 {
                    Err(RuntimeError::value("modulo by zero"))
                } else {
                    Ok(int_value(a.rem_euclid(b)))
                }
            }
            _ => unreachable!("arith called with non-arithmetic op"),
        },
        (a, b) => {
            let a = match a {
                NumVal::Int(i) => i as f64,
                NumVal::Float(f) => f,
            };
            let b = match b {
                NumVal::Int(i) => i as f64,
                NumVal::Float(f) => f,
            };
            match op {
                BinOp::Add => float_value(a + b),
                BinOp::Sub => float_value(a - b),
                BinOp::Mul => float_value(a * b),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(RuntimeError::value("division by zero"))
                    } else {
                        float_value(a / b)
                    }
                }
                BinOp::Rem => {
                    if b == 0.0 {
                        Err(RuntimeError::value("modulo by zero"))
                    } else {
                        float_value(a % b)
                    }
                }
                _ => unreachable!("arith called with non-arithmetic op"),
            }
        }
    }
}

pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (numeric(lhs), numeric(rhs)) {
        (Some(a), Some(b)) => {
            let a = match a {
                NumVal::Int(i) => i as f64,
                NumVal::Float(f) => f,
            };
            let b = match b {
                NumVal::Int(i) => i as f64,
                NumVal::Float(f) => f,
            };
            a == b
        }
        _ => lhs == rhs,
    }
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (numeric(lhs), numeric(rhs)) {
            (Some(a), Some(b)) => {
                let a = match a {
                    NumVal::Int(i) => i as f64,
                    NumVal::Float(f) => f,
                };
                let b = match b {
                    NumVal::Int(i) => i as f64,
                    NumVal::Float(f) => f,
                };
                a.partial_cmp(&b)
                    .ok_or_else(|| RuntimeError::value("comparison with NaN"))?
            }
            _ => {
                return Err(RuntimeError::type_(format!(
                    "cannot compare {} with {}",
                    kind_of(lhs),
                    kind_of(rhs)
                )));
            }
        },
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!("compare called with non-comparison op"),
    };
    Ok(Value::Bool(result))
}

fn index_value(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match container {
        Value::Array(items) => {
            let i = as_index(index, items.len())?;
            items
                .get(i)
                .cloned()
                .ok_or_else(|| RuntimeError::index(format!("list index {index} out of range")))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = as_index(index, chars.len())?;
            chars
                .get(i)
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| RuntimeError::index(format!("string index {index} out of range")))
        }
        Value::Object(map) => {
            let Value::String(key) = index else {
                return Err(RuntimeError::type_("map keys must be strings"));
            };
            map.get(key)
                .cloned()
                .ok_or_else(|| RuntimeError::key(format!("key '{key}' not found")))
        }
        other => Err(RuntimeError::type_(format!(
            "{} is not indexable",
            kind_of(other)
        ))),
    }
}

/// Resolve a (possibly negative) index against a container length.
fn as_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Some(i) = index.as_i64() else {
        return Err(RuntimeError::type_(format!(
            "indices must be integers, got {}",
            kind_of(index)
        )));
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    usize::try_from(resolved)
        .map_err(|_| RuntimeError::index(format!("index {i} out of range")))
}

// ── Builtins ──────────────────────────────────────────────────

const BUILTIN_NAMES: &[&str] = &[
    "abs", "len", "min", "max", "sum", "round", "str", "num", "upper", "lower", "split", "join",
    "contains", "range", "sorted", "reversed", "keys", "values", "append", "get",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    name == "print" || BUILTIN_NAMES.contains(&name)
}

const MAX_RANGE: i64 = 1_000_000;

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::type_(format!(
            "{name}() takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn apply_builtin(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match name {
        "abs" => {
            arity(name, &args, 1)?;
            match numeric(&args[0]) {
                Some(NumVal::Int(i)) => i
                    .checked_abs()
                    .map(int_value)
                    .ok_or_else(|| RuntimeError::value("integer overflow")),
                Some(NumVal::Float(f)) => float_value(f.abs()),
                None => Err(RuntimeError::type_("abs() requires a number")),
            }
        }
        "len" => {
            arity(name, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(RuntimeError::type_(format!(
                        "len() not supported for {}",
                        kind_of(other)
                    )));
                }
            };
            Ok(int_value(len as i64))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(RuntimeError::type_(format!("{name}() requires arguments")));
            }
            let items: Vec<Value> = if args.len() == 1 {
                if let Value::Array(items) = &args[0] {
                    items.clone()
                } else {
                    args
                }
            } else {
                args
            };
            if items.is_empty() {
                return Err(RuntimeError::value(format!("{name}() of empty sequence")));
            }
            let mut best: Option<f64> = None;
            let mut best_value = Value::Null;
            for item in &items {
                let Some(n) = item.as_f64() else {
                    return Err(RuntimeError::type_(format!("{name}() requires numbers")));
                };
                let better = match best {
                    None => true,
                    Some(b) => {
                        if name == "min" {
                            n < b
                        } else {
                            n > b
                        }
                    }
                };
                if better {
                    best = Some(n);
                    best_value = item.clone();
                }
            }
            Ok(best_value)
        }
        "sum" => {
            arity(name, &args, 1)?;
            let Value::Array(items) = &args[0] else {
                return Err(RuntimeError::type_("sum() requires a list"));
            };
            let mut int_total: i64 = 0;
            let mut float_total = 0.0;
            let mut saw_float = false;
            for item in items {
                match numeric(item) {
                    Some(NumVal::Int(i)) => {
                        int_total = int_total
                            .checked_add(i)
                            .ok_or_else(|| RuntimeError::value("integer overflow"))?;
                    }
                    Some(NumVal::Float(f)) => {
                        saw_float = true;
                        float_total += f;
                    }
                    None => return Err(RuntimeError::type_("sum() requires numbers")),
                }
            }
            if saw_float {
                float_value(float_total + int_total as f64)
            } else {
                Ok(int_value(int_total))
            }
        }
        "round" => {
            arity(name, &args, 1)?;
            match numeric(&args[0]) {
                Some(NumVal::Int(i)) => Ok(int_value(i)),
                Some(NumVal::Float(f)) => Ok(int_value(f.round() as i64)),
                None => Err(RuntimeError::type_("round() requires a number")),
            }
        }
        "str" => {
            arity(name, &args, 1)?;
            Ok(Value::String(display_value(&args[0])))
        }
        "num" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Number(_) => Ok(args[0].clone()),
                Value::Bool(b) => Ok(int_value(if *b { 1 } else { 0 })),
                Value::String(s) => {
                    let trimmed = s.trim();
                    if let Ok(i) = trimmed.parse::<i64>() {
                        Ok(int_value(i))
                    } else if let Ok(f) = trimmed.parse::<f64>() {
                        float_value(f)
                    } else {
                        Err(RuntimeError::value(format!(
                            "cannot convert '{s}' to a number"
                        )))
                    }
                }
                other => Err(RuntimeError::type_(format!(
                    "cannot convert {} to a number",
                    kind_of(other)
                ))),
            }
        }
        "upper" | "lower" => {
            arity(name, &args, 1)?;
            let Value::String(s) = &args[0] else {
                return Err(RuntimeError::type_(format!("{name}() requires a string")));
            };
            Ok(Value::String(if name == "upper" {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }))
        }
        "split" => {
            arity(name, &args, 2)?;
            let (Value::String(s), Value::String(sep)) = (&args[0], &args[1]) else {
                return Err(RuntimeError::type_("split() requires two strings"));
            };
            if sep.is_empty() {
                return Err(RuntimeError::value("empty separator"));
            }
            Ok(Value::Array(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            arity(name, &args, 2)?;
            let (Value::Array(items), Value::String(sep)) = (&args[0], &args[1]) else {
                return Err(RuntimeError::type_("join() requires a list and a string"));
            };
            Ok(Value::String(
                items
                    .iter()
                    .map(display_value)
                    .collect::<Vec<_>>()
                    .join(sep),
            ))
        }
        "contains" => {
            arity(name, &args, 2)?;
            let found = match (&args[0], &args[1]) {
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                (container, _) => {
                    return Err(RuntimeError::type_(format!(
                        "contains() not supported for {}",
                        kind_of(container)
                    )));
                }
            };
            Ok(Value::Bool(found))
        }
        "range" => {
            let (start, end) = match args.as_slice() {
                [end] => (0, require_int(end, "range()")?),
                [start, end] => (require_int(start, "range()")?, require_int(end, "range()")?),
                _ => {
                    return Err(RuntimeError::type_(format!(
                        "range() takes 1 or 2 arguments, got {}",
                        args.len()
                    )));
                }
            };
            if end - start > MAX_RANGE {
                return Err(RuntimeError::value("range too large"));
            }
            Ok(Value::Array((start..end).map(int_value).collect()))
        }
        "sorted" => {
            arity(name, &args, 1)?;
            let Value::Array(items) = &args[0] else {
                return Err(RuntimeError::type_("sorted() requires a list"));
            };
            let mut out = items.clone();
            let all_numbers = out.iter().all(|v| v.is_number());
            let all_strings = out.iter().all(|v| v.is_string());
            if all_numbers {
                out.sort_by(|a, b| {
                    a.as_f64()
                        .partial_cmp(&b.as_f64())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            } else if all_strings {
                out.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
            } else {
                return Err(RuntimeError::type_(
                    "sorted() requires all numbers or all strings",
                ));
            }
            Ok(Value::Array(out))
        }
        "reversed" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Array(items) => {
                    Ok(Value::Array(items.iter().rev().cloned().collect()))
                }
                Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
                other => Err(RuntimeError::type_(format!(
                    "reversed() not supported for {}",
                    kind_of(other)
                ))),
            }
        }
        "keys" => {
            arity(name, &args, 1)?;
            let Value::Object(map) = &args[0] else {
                return Err(RuntimeError::type_("keys() requires a map"));
            };
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Ok(Value::Array(
                keys.into_iter().map(|k| Value::String(k.clone())).collect(),
            ))
        }
        "values" => {
            arity(name, &args, 1)?;
            let Value::Object(map) = &args[0] else {
                return Err(RuntimeError::type_("values() requires a map"));
            };
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Ok(Value::Array(
                keys.into_iter()
                    .filter_map(|k| map.get(k).cloned())
                    .collect(),
            ))
        }
        "append" => {
            arity(name, &args, 2)?;
            let Value::Array(items) = &args[0] else {
                return Err(RuntimeError::type_("append() requires a list"));
            };
            let mut out = items.clone();
            out.push(args[1].clone());
            Ok(Value::Array(out))
        }
        "get" => {
            if args.len() != 2 && args.len() != 3 {
                return Err(RuntimeError::type_(format!(
                    "get() takes 2 or 3 arguments, got {}",
                    args.len()
                )));
            }
            let Value::Object(map) = &args[0] else {
                return Err(RuntimeError::type_("get() requires a map"));
            };
            let Value::String(key) = &args[1] else {
                return Err(RuntimeError::type_("map keys must be strings"));
            };
            Ok(map
                .get(key)
                .cloned()
                .unwrap_or_else(|| args.get(2).cloned().unwrap_or(Value::Null)))
        }
        other => Err(RuntimeError::name(format!(
            "function '{other}' is not defined"
        ))),
    }
}

fn require_int(value: &Value, context: &str) -> Result<i64, RuntimeError> {
    value
        .as_i64()
        .ok_or_else(|| RuntimeError::type_(format!("{context} requires integers")))
}
