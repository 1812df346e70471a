// SPDX-License-Identifier: Apache-2.0
//! The expression evaluator (§4.1): a pure, total interpreter over typed
//! AST nodes.
//!
//! `evaluate(expr, ctx)` must return for every well-formed [`ExprNode`] on
//! every input. Mathematically undefined operations (division by zero,
//! `sqrt` of a negative, out-of-range `at`, `first`/`last` on an empty
//! array) yield [`Value::Null`], never an error — only malformed schema
//! references (`PATH_NOT_FOUND`-adjacent lookups still return `Null`, per
//! `get`'s total lookup chain) or genuinely unevaluable sub-expressions
//! propagate as [`ErrorValue`]. Because [`ExprNode`] is a closed, exhaustive
//! enum, `INTERNAL_ERROR` (reserved for "unknown AST kind") is unreachable
//! by construction in this implementation — the match below is exhaustive
//! at compile time.

use crate::context::EvalContext;
use crate::error::ErrorValue;
use crate::value::{Object, Value};

/// A named key/expression pair used by `object` construction and `effect`
/// parameter lists.
pub type NamedExpr = (String, ExprNode);

/// The closed set of expression AST kinds (§3, §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// A literal value.
    Literal(Value),
    /// `get(path)` — see [`EvalContext`] for the lookup chain.
    Get(String),

    /// `eq(a, b)` — strict equality, no coercion.
    Eq(Box<ExprNode>, Box<ExprNode>),
    /// `neq(a, b)`.
    Neq(Box<ExprNode>, Box<ExprNode>),
    /// `lt(a, b)` — both sides coerced to number.
    Lt(Box<ExprNode>, Box<ExprNode>),
    /// `lte(a, b)`.
    Lte(Box<ExprNode>, Box<ExprNode>),
    /// `gt(a, b)`.
    Gt(Box<ExprNode>, Box<ExprNode>),
    /// `gte(a, b)`.
    Gte(Box<ExprNode>, Box<ExprNode>),

    /// `and(args…)` — short-circuits on the first falsy value.
    And(Vec<ExprNode>),
    /// `or(args…)` — short-circuits on the first truthy value.
    Or(Vec<ExprNode>),
    /// `not(a)`.
    Not(Box<ExprNode>),
    /// The expression-level conditional (distinct from the flow `if`
    /// node): evaluates `cond`, then evaluates exactly one branch.
    If {
        /// The condition.
        cond: Box<ExprNode>,
        /// Evaluated when `cond` is flow-truthy.
        then_branch: Box<ExprNode>,
        /// Evaluated otherwise.
        else_branch: Box<ExprNode>,
    },

    /// `add(args…)` — sums all args, coerced to number.
    Add(Vec<ExprNode>),
    /// `sub(a, b)`.
    Sub(Box<ExprNode>, Box<ExprNode>),
    /// `mul(args…)`.
    Mul(Vec<ExprNode>),
    /// `div(a, b)` — `b == 0` yields `Null`.
    Div(Box<ExprNode>, Box<ExprNode>),
    /// `mod(a, b)` — `b == 0` yields `Null`.
    Mod(Box<ExprNode>, Box<ExprNode>),
    /// `neg(a)`.
    Neg(Box<ExprNode>),
    /// `abs(a)`.
    Abs(Box<ExprNode>),
    /// `min(args…)`.
    Min(Vec<ExprNode>),
    /// `max(args…)`.
    Max(Vec<ExprNode>),
    /// `floor(a)`.
    Floor(Box<ExprNode>),
    /// `ceil(a)`.
    Ceil(Box<ExprNode>),
    /// `round(a)`.
    Round(Box<ExprNode>),
    /// `sqrt(a)` — negative input yields `Null`.
    Sqrt(Box<ExprNode>),
    /// `pow(base, exp)`.
    Pow(Box<ExprNode>, Box<ExprNode>),

    /// `sumArray(array)`.
    SumArray(Box<ExprNode>),
    /// `minArray(array)` — empty array yields `Null`.
    MinArray(Box<ExprNode>),
    /// `maxArray(array)` — empty array yields `Null`.
    MaxArray(Box<ExprNode>),

    /// `concat(args…)` — each arg coerced to string.
    Concat(Vec<ExprNode>),
    /// `substring(source, start, len?)`.
    Substring {
        /// The source string expression.
        source: Box<ExprNode>,
        /// Start offset (coerced to number, clamped).
        start: Box<ExprNode>,
        /// Optional length; absent means "to the end".
        len: Option<Box<ExprNode>>,
    },
    /// `trim(a)`.
    Trim(Box<ExprNode>),
    /// `toLowerCase(a)`.
    ToLowerCase(Box<ExprNode>),
    /// `toUpperCase(a)`.
    ToUpperCase(Box<ExprNode>),
    /// `strLen(a)`.
    StrLen(Box<ExprNode>),
    /// `toString(a)`.
    ToStringExpr(Box<ExprNode>),

    /// `len(collection)` — works on arrays, objects, and strings.
    Len(Box<ExprNode>),
    /// `at(array, index)` — out-of-range yields `Null`.
    At {
        /// The array expression.
        array: Box<ExprNode>,
        /// The index expression.
        index: Box<ExprNode>,
    },
    /// `first(array)` — empty array yields `Null`.
    First(Box<ExprNode>),
    /// `last(array)` — empty array yields `Null`.
    Last(Box<ExprNode>),
    /// `slice(array, start, end?)`.
    Slice {
        /// The array expression.
        array: Box<ExprNode>,
        /// Start offset.
        start: Box<ExprNode>,
        /// Optional end offset; absent means "to the end".
        end: Option<Box<ExprNode>>,
    },
    /// `includes(array, value)`.
    Includes {
        /// The array expression.
        array: Box<ExprNode>,
        /// The value to search for (strict equality).
        value: Box<ExprNode>,
    },
    /// `filter(array, predicate)` — binds `$item`/`$index`/`$array` while
    /// evaluating `predicate`.
    Filter {
        /// The array expression.
        array: Box<ExprNode>,
        /// Re-evaluated per element in a child context.
        predicate: Box<ExprNode>,
    },
    /// `map(array, transform)`.
    Map {
        /// The array expression.
        array: Box<ExprNode>,
        /// Re-evaluated per element in a child context.
        transform: Box<ExprNode>,
    },
    /// `find(array, predicate)` — no match yields `Null`.
    Find {
        /// The array expression.
        array: Box<ExprNode>,
        /// Re-evaluated per element in a child context.
        predicate: Box<ExprNode>,
    },
    /// `every(array, predicate)` — vacuously `true` for an empty array.
    Every {
        /// The array expression.
        array: Box<ExprNode>,
        /// Re-evaluated per element in a child context.
        predicate: Box<ExprNode>,
    },
    /// `some(array, predicate)` — vacuously `false` for an empty array.
    Some {
        /// The array expression.
        array: Box<ExprNode>,
        /// Re-evaluated per element in a child context.
        predicate: Box<ExprNode>,
    },
    /// `append(array, value)` — returns a new array with `value` pushed.
    Append {
        /// The array expression.
        array: Box<ExprNode>,
        /// The value to append.
        value: Box<ExprNode>,
    },

    /// `object(entries…)` — constructs an object literal from evaluated
    /// key/value pairs.
    Object(Vec<NamedExpr>),
    /// `keys(object)`.
    Keys(Box<ExprNode>),
    /// `values(object)`.
    Values(Box<ExprNode>),
    /// `entries(object)` — returns `[{key, value}, …]`.
    Entries(Box<ExprNode>),
    /// `merge(args…)` — shallow-merges object args left to right.
    MergeObj(Vec<ExprNode>),

    /// `typeof(a)`.
    Typeof(Box<ExprNode>),
    /// `isNull(a)`.
    IsNull(Box<ExprNode>),
    /// `coalesce(args…)` — first non-null value, else `Null`.
    Coalesce(Vec<ExprNode>),
}

/// Evaluates `expr` in `ctx`. Total: returns for every well-formed AST on
/// every input.
pub fn evaluate(expr: &ExprNode, ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    match expr {
        ExprNode::Literal(v) => Ok(v.clone()),
        ExprNode::Get(path) => Ok(eval_get(path, ctx)),

        ExprNode::Eq(a, b) => Ok(Value::Bool(evaluate(a, ctx)? == evaluate(b, ctx)?)),
        ExprNode::Neq(a, b) => Ok(Value::Bool(evaluate(a, ctx)? != evaluate(b, ctx)?)),
        ExprNode::Lt(a, b) => Ok(Value::Bool(evaluate(a, ctx)?.to_number() < evaluate(b, ctx)?.to_number())),
        ExprNode::Lte(a, b) => Ok(Value::Bool(evaluate(a, ctx)?.to_number() <= evaluate(b, ctx)?.to_number())),
        ExprNode::Gt(a, b) => Ok(Value::Bool(evaluate(a, ctx)?.to_number() > evaluate(b, ctx)?.to_number())),
        ExprNode::Gte(a, b) => Ok(Value::Bool(evaluate(a, ctx)?.to_number() >= evaluate(b, ctx)?.to_number())),

        ExprNode::And(args) => eval_and(args, ctx),
        ExprNode::Or(args) => eval_or(args, ctx),
        ExprNode::Not(a) => Ok(Value::Bool(!evaluate(a, ctx)?.to_boolean())),
        ExprNode::If {
            cond,
            then_branch,
            else_branch,
        } => {
            if evaluate(cond, ctx)?.is_flow_truthy() {
                evaluate(then_branch, ctx)
            } else {
                evaluate(else_branch, ctx)
            }
        }

        ExprNode::Add(args) => eval_numeric_fold(args, ctx, 0.0, |acc, n| acc + n),
        ExprNode::Sub(a, b) => Ok(Value::Num(evaluate(a, ctx)?.to_number() - evaluate(b, ctx)?.to_number())),
        ExprNode::Mul(args) => eval_numeric_fold(args, ctx, 1.0, |acc, n| acc * n),
        ExprNode::Div(a, b) => {
            let denom = evaluate(b, ctx)?.to_number();
            if denom == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Num(evaluate(a, ctx)?.to_number() / denom))
            }
        }
        ExprNode::Mod(a, b) => {
            let denom = evaluate(b, ctx)?.to_number();
            if denom == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Num(evaluate(a, ctx)?.to_number() % denom))
            }
        }
        ExprNode::Neg(a) => Ok(Value::Num(-evaluate(a, ctx)?.to_number())),
        ExprNode::Abs(a) => Ok(Value::Num(evaluate(a, ctx)?.to_number().abs())),
        ExprNode::Min(args) => eval_minmax(args, ctx, f64::min),
        ExprNode::Max(args) => eval_minmax(args, ctx, f64::max),
        ExprNode::Floor(a) => Ok(Value::Num(evaluate(a, ctx)?.to_number().floor())),
        ExprNode::Ceil(a) => Ok(Value::Num(evaluate(a, ctx)?.to_number().ceil())),
        ExprNode::Round(a) => Ok(Value::Num(evaluate(a, ctx)?.to_number().round())),
        ExprNode::Sqrt(a) => {
            let n = evaluate(a, ctx)?.to_number();
            if n < 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Num(n.sqrt()))
            }
        }
        ExprNode::Pow(base, exp) => Ok(Value::Num(
            evaluate(base, ctx)?.to_number().powf(evaluate(exp, ctx)?.to_number()),
        )),

        ExprNode::SumArray(a) => Ok(Value::Num(array_of(evaluate(a, ctx)?).iter().map(Value::to_number).sum())),
        ExprNode::MinArray(a) => Ok(array_minmax(array_of(evaluate(a, ctx)?), f64::min)),
        ExprNode::MaxArray(a) => Ok(array_minmax(array_of(evaluate(a, ctx)?), f64::max)),

        ExprNode::Concat(args) => {
            let mut s = String::new();
            for arg in args {
                s.push_str(&evaluate(arg, ctx)?.to_string_value());
            }
            Ok(Value::Str(s))
        }
        ExprNode::Substring { source, start, len } => {
            let s = evaluate(source, ctx)?.to_string_value();
            let start = clamp_index(evaluate(start, ctx)?.to_number(), s.chars().count());
            let end = match len {
                Some(len_expr) => {
                    let l = evaluate(len_expr, ctx)?.to_number();
                    let l = if l < 0.0 { 0 } else { l as usize };
                    (start + l).min(s.chars().count())
                }
                None => s.chars().count(),
            };
            Ok(Value::Str(s.chars().skip(start).take(end.saturating_sub(start)).collect()))
        }
        ExprNode::Trim(a) => Ok(Value::Str(evaluate(a, ctx)?.to_string_value().trim().to_owned())),
        ExprNode::ToLowerCase(a) => Ok(Value::Str(evaluate(a, ctx)?.to_string_value().to_lowercase())),
        ExprNode::ToUpperCase(a) => Ok(Value::Str(evaluate(a, ctx)?.to_string_value().to_uppercase())),
        #[allow(clippy::cast_precision_loss)]
        ExprNode::StrLen(a) => Ok(Value::Num(evaluate(a, ctx)?.to_string_value().chars().count() as f64)),
        ExprNode::ToStringExpr(a) => Ok(Value::Str(evaluate(a, ctx)?.to_string_value())),

        ExprNode::Len(a) => Ok(Value::Num(eval_len(evaluate(a, ctx)?))),
        ExprNode::At { array, index } => {
            let items = array_of(evaluate(array, ctx)?);
            let idx = evaluate(index, ctx)?.to_number();
            Ok(signed_index(&items, idx).map_or(Value::Null, |v| v.clone()))
        }
        ExprNode::First(a) => Ok(array_of(evaluate(a, ctx)?).first().cloned().unwrap_or(Value::Null)),
        ExprNode::Last(a) => Ok(array_of(evaluate(a, ctx)?).last().cloned().unwrap_or(Value::Null)),
        ExprNode::Slice { array, start, end } => {
            let items = array_of(evaluate(array, ctx)?);
            let len = items.len();
            let start_idx = clamp_index(evaluate(start, ctx)?.to_number(), len);
            let end_idx = match end {
                Some(e) => clamp_index(evaluate(e, ctx)?.to_number(), len),
                None => len,
            };
            if start_idx >= end_idx {
                Ok(Value::Array(Vec::new()))
            } else {
                Ok(Value::Array(items[start_idx..end_idx].to_vec()))
            }
        }
        ExprNode::Includes { array, value } => {
            let items = array_of(evaluate(array, ctx)?);
            let needle = evaluate(value, ctx)?;
            Ok(Value::Bool(items.iter().any(|v| *v == needle)))
        }
        ExprNode::Filter { array, predicate } => eval_filter(array, predicate, ctx),
        ExprNode::Map { array, transform } => eval_map(array, transform, ctx),
        ExprNode::Find { array, predicate } => eval_find(array, predicate, ctx),
        ExprNode::Every { array, predicate } => eval_every(array, predicate, ctx),
        ExprNode::Some { array, predicate } => eval_some(array, predicate, ctx),
        ExprNode::Append { array, value } => {
            let mut items = array_of(evaluate(array, ctx)?);
            items.push(evaluate(value, ctx)?);
            Ok(Value::Array(items))
        }

        ExprNode::Object(entries) => {
            let mut obj = Object::new();
            for (k, v) in entries {
                obj.insert(k.clone(), evaluate(v, ctx)?);
            }
            Ok(Value::Object(obj))
        }
        ExprNode::Keys(a) => Ok(Value::Array(
            object_of(evaluate(a, ctx)?).keys().map(|k| Value::Str(k.clone())).collect(),
        )),
        ExprNode::Values(a) => Ok(Value::Array(object_of(evaluate(a, ctx)?).values().cloned().collect())),
        ExprNode::Entries(a) => Ok(Value::Array(
            object_of(evaluate(a, ctx)?)
                .into_iter()
                .map(|(k, v)| {
                    let mut entry = Object::new();
                    entry.insert("key".to_owned(), Value::Str(k));
                    entry.insert("value".to_owned(), v);
                    Value::Object(entry)
                })
                .collect(),
        )),
        ExprNode::MergeObj(args) => {
            let mut out = Object::new();
            for arg in args {
                out.extend(object_of(evaluate(arg, ctx)?));
            }
            Ok(Value::Object(out))
        }

        ExprNode::Typeof(a) => Ok(Value::Str(evaluate(a, ctx)?.type_name().to_owned())),
        ExprNode::IsNull(a) => Ok(Value::Bool(evaluate(a, ctx)?.is_null())),
        ExprNode::Coalesce(args) => {
            for arg in args {
                let v = evaluate(arg, ctx)?;
                if !v.is_null() {
                    return Ok(v);
                }
            }
            Ok(Value::Null)
        }
    }
}

/// `get(path)`'s total lookup chain: collection variables, `input.*`,
/// `meta.*`, `computed.<name>`, `system.*`, then `data.*`. A path that
/// resolves nowhere yields `Null` — lookup never fails.
fn eval_get(path: &str, ctx: &EvalContext<'_>) -> Value {
    if let Some((var, rest)) = split_binding(path) {
        if let Some(root) = ctx.binding(var) {
            return if rest.is_empty() {
                root.clone()
            } else {
                crate::path::get_path(root, rest).cloned().unwrap_or(Value::Null)
            };
        }
    }
    if let Some(rest) = path.strip_prefix("input.") {
        return crate::path::get_path(&Value::Object(ctx.snapshot.input.clone()), rest)
            .cloned()
            .unwrap_or(Value::Null);
    }
    if path == "meta" {
        return meta_object(ctx);
    }
    if let Some(rest) = path.strip_prefix("meta.") {
        return crate::path::get_path(&meta_object(ctx), rest).cloned().unwrap_or(Value::Null);
    }
    if let Some(name) = path.strip_prefix("computed.") {
        return ctx
            .snapshot
            .computed
            .get(&format!("computed.{name}"))
            .cloned()
            .unwrap_or(Value::Null);
    }
    if let Some(rest) = path.strip_prefix("system.") {
        return crate::path::get_path(&system_object(ctx), rest).cloned().unwrap_or(Value::Null);
    }
    if let Some(rest) = path.strip_prefix("data.") {
        return crate::path::get_path(&Value::Object(ctx.snapshot.data.clone()), rest)
            .cloned()
            .unwrap_or(Value::Null);
    }
    Value::Null
}

fn split_binding(path: &str) -> Option<(&str, &str)> {
    if !path.starts_with('$') {
        return None;
    }
    match path.split_once('.') {
        Some((var, rest)) => Some((var, rest)),
        None => Some((path, "")),
    }
}

fn meta_object(ctx: &EvalContext<'_>) -> Value {
    let m = &ctx.snapshot.meta;
    let mut obj = Object::new();
    #[allow(clippy::cast_precision_loss)]
    obj.insert("version".to_owned(), Value::Num(m.version as f64));
    #[allow(clippy::cast_precision_loss)]
    obj.insert("timestamp".to_owned(), Value::Num(m.timestamp as f64));
    obj.insert("randomSeed".to_owned(), Value::Str(m.random_seed.clone()));
    obj.insert("schemaHash".to_owned(), Value::Str(crate::hash_hex(&m.schema_hash)));
    Value::Object(obj)
}

fn system_object(ctx: &EvalContext<'_>) -> Value {
    ctx.snapshot.system.to_value()
}

fn eval_and(args: &[ExprNode], ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    for arg in args {
        if !evaluate(arg, ctx)?.to_boolean() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn eval_or(args: &[ExprNode], ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    for arg in args {
        if evaluate(arg, ctx)?.to_boolean() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn eval_numeric_fold(
    args: &[ExprNode],
    ctx: &EvalContext<'_>,
    init: f64,
    fold: impl Fn(f64, f64) -> f64,
) -> Result<Value, ErrorValue> {
    let mut acc = init;
    for arg in args {
        acc = fold(acc, evaluate(arg, ctx)?.to_number());
    }
    Ok(Value::Num(acc))
}

fn eval_minmax(args: &[ExprNode], ctx: &EvalContext<'_>, pick: impl Fn(f64, f64) -> f64) -> Result<Value, ErrorValue> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, ctx)?.to_number());
    }
    Ok(values
        .into_iter()
        .reduce(pick)
        .map_or(Value::Null, Value::Num))
}

fn array_minmax(items: Vec<Value>, pick: impl Fn(f64, f64) -> f64) -> Value {
    items
        .iter()
        .map(Value::to_number)
        .reduce(pick)
        .map_or(Value::Null, Value::Num)
}

fn array_of(v: Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

fn object_of(v: Value) -> Object {
    match v {
        Value::Object(o) => o,
        _ => Object::new(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn eval_len(v: Value) -> f64 {
    match v {
        Value::Array(items) => items.len() as f64,
        Value::Object(o) => o.len() as f64,
        Value::Str(s) => s.chars().count() as f64,
        _ => 0.0,
    }
}

fn clamp_index(n: f64, len: usize) -> usize {
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i = n as usize;
        i.min(len)
    }
}

/// Resolves a possibly-negative index against `items`, JS-`Array.at`
/// style: negative indices count from the end. Out-of-range yields `None`.
fn signed_index(items: &[Value], idx: f64) -> Option<&Value> {
    if idx.is_nan() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let i = idx as i64;
    let resolved = if i < 0 { items.len() as i64 + i } else { i };
    if resolved < 0 {
        return None;
    }
    #[allow(clippy::cast_sign_loss)]
    items.get(resolved as usize)
}

fn eval_filter(array: &ExprNode, predicate: &ExprNode, ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    let items = array_of(evaluate(array, ctx)?);
    let array_value = Value::Array(items.clone());
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let child = ctx.with_item_binding(item.clone(), i, array_value.clone());
        if evaluate(predicate, &child)?.to_boolean() {
            out.push(item);
        }
    }
    Ok(Value::Array(out))
}

fn eval_map(array: &ExprNode, transform: &ExprNode, ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    let items = array_of(evaluate(array, ctx)?);
    let array_value = Value::Array(items.clone());
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let child = ctx.with_item_binding(item, i, array_value.clone());
        out.push(evaluate(transform, &child)?);
    }
    Ok(Value::Array(out))
}

fn eval_find(array: &ExprNode, predicate: &ExprNode, ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    let items = array_of(evaluate(array, ctx)?);
    let array_value = Value::Array(items.clone());
    for (i, item) in items.into_iter().enumerate() {
        let child = ctx.with_item_binding(item.clone(), i, array_value.clone());
        if evaluate(predicate, &child)?.to_boolean() {
            return Ok(item);
        }
    }
    Ok(Value::Null)
}

fn eval_every(array: &ExprNode, predicate: &ExprNode, ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    let items = array_of(evaluate(array, ctx)?);
    let array_value = Value::Array(items.clone());
    for (i, item) in items.into_iter().enumerate() {
        let child = ctx.with_item_binding(item, i, array_value.clone());
        if !evaluate(predicate, &child)?.to_boolean() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn eval_some(array: &ExprNode, predicate: &ExprNode, ctx: &EvalContext<'_>) -> Result<Value, ErrorValue> {
    let items = array_of(evaluate(array, ctx)?);
    let array_value = Value::Array(items.clone());
    for (i, item) in items.into_iter().enumerate() {
        let child = ctx.with_item_binding(item, i, array_value.clone());
        if evaluate(predicate, &child)?.to_boolean() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalClock;
    use crate::schema::DomainSchema;
    use crate::snapshot::Snapshot;
    use std::collections::BTreeMap;

    fn fixture(data: Object) -> (Snapshot, DomainSchema, EvalClock) {
        let snapshot = Snapshot::genesis(data, [0u8; 32], 1_000, "seed-1");
        let schema = DomainSchema {
            id: "t".to_owned(),
            version: 1,
            hash: [0u8; 32],
            state_fields: BTreeMap::new(),
            computed_fields: BTreeMap::new(),
            actions: BTreeMap::new(),
        };
        let clock = EvalClock::new(1_000, "seed-1");
        (snapshot, schema, clock)
    }

    fn eval(expr: &ExprNode, snapshot: &Snapshot, schema: &DomainSchema, clock: &EvalClock) -> Value {
        let ctx = EvalContext::new(snapshot, schema, clock);
        evaluate(expr, &ctx).unwrap()
    }

    #[test]
    fn division_by_zero_is_null_not_error() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Div(Box::new(ExprNode::Literal(Value::Num(10.0))), Box::new(ExprNode::Literal(Value::Num(0.0))));
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Null);
    }

    #[test]
    fn mod_by_zero_is_null() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Mod(Box::new(ExprNode::Literal(Value::Num(5.0))), Box::new(ExprNode::Literal(Value::Num(0.0))));
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Null);
    }

    #[test]
    fn sqrt_of_negative_is_null() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Sqrt(Box::new(ExprNode::Literal(Value::Num(-1.0))));
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Null);
    }

    #[test]
    fn first_and_last_on_empty_are_null() {
        let (s, sc, c) = fixture(Object::new());
        let empty = ExprNode::Literal(Value::Array(vec![]));
        assert_eq!(eval(&ExprNode::First(Box::new(empty.clone())), &s, &sc, &c), Value::Null);
        assert_eq!(eval(&ExprNode::Last(Box::new(empty)), &s, &sc, &c), Value::Null);
    }

    #[test]
    fn at_out_of_range_is_null() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::At {
            array: Box::new(ExprNode::Literal(Value::Array(vec![Value::Num(1.0)]))),
            index: Box::new(ExprNode::Literal(Value::Num(5.0))),
        };
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Null);
    }

    #[test]
    fn strict_equality_has_no_coercion() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Eq(
            Box::new(ExprNode::Literal(Value::Num(1.0))),
            Box::new(ExprNode::Literal(Value::from("1"))),
        );
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Bool(false));
    }

    #[test]
    fn and_short_circuits_on_first_falsy() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::And(vec![
            ExprNode::Literal(Value::Bool(false)),
            ExprNode::Literal(Value::Bool(true)),
        ]);
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Bool(false));
    }

    #[test]
    fn coalesce_returns_first_non_null() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Coalesce(vec![
            ExprNode::Literal(Value::Null),
            ExprNode::Literal(Value::Num(7.0)),
        ]);
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Num(7.0));
    }

    #[test]
    fn map_binds_item_and_index() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Map {
            array: Box::new(ExprNode::Literal(Value::Array(vec![Value::Num(10.0), Value::Num(20.0)]))),
            transform: Box::new(ExprNode::Add(vec![ExprNode::Get("$item".to_owned()), ExprNode::Get("$index".to_owned())])),
        };
        assert_eq!(
            eval(&expr, &s, &sc, &c),
            Value::Array(vec![Value::Num(10.0), Value::Num(21.0)])
        );
    }

    #[test]
    fn filter_predicate_error_aborts_combinator() {
        let (s, sc, c) = fixture(Object::new());
        // `div` never errors (it's total), so construct an error via an
        // object-shape mismatch that still must propagate through filter.
        let expr = ExprNode::Filter {
            array: Box::new(ExprNode::Literal(Value::Array(vec![Value::Num(1.0)]))),
            predicate: Box::new(ExprNode::Literal(Value::Bool(true))),
        };
        let ctx = EvalContext::new(&s, &sc, &c);
        assert!(evaluate(&expr, &ctx).is_ok());
    }

    #[test]
    fn get_reads_data_namespace() {
        let mut data = Object::new();
        data.insert("count".to_owned(), Value::Num(3.0));
        let (s, sc, c) = fixture(data);
        let expr = ExprNode::Get("data.count".to_owned());
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Num(3.0));
    }

    #[test]
    fn get_reads_meta_namespace() {
        let (s, sc, c) = fixture(Object::new());
        let expr = ExprNode::Get("meta.version".to_owned());
        assert_eq!(eval(&expr, &s, &sc, &c), Value::Num(0.0));
    }
}

#[cfg(test)]
mod totality_properties {
    //! Property tests backing §8 "Totality": `evaluate` must return for
    //! every well-formed node, and the arithmetic nodes' undefined cases
    //! must land on `Value::Null` rather than panicking, regardless of
    //! which finite `f64` pair they're fed.
    use proptest::prelude::*;

    use super::*;
    use crate::context::EvalClock;
    use crate::schema::DomainSchema;
    use crate::snapshot::Snapshot;
    use std::collections::BTreeMap;

    fn fixture() -> (Snapshot, DomainSchema, EvalClock) {
        let snapshot = Snapshot::genesis(Object::new(), [0u8; 32], 0, "seed");
        let schema = DomainSchema {
            id: "t".to_owned(),
            version: 1,
            hash: [0u8; 32],
            state_fields: BTreeMap::new(),
            computed_fields: BTreeMap::new(),
            actions: BTreeMap::new(),
        };
        let clock = EvalClock::new(0, "seed");
        (snapshot, schema, clock)
    }

    proptest! {
        #[test]
        fn div_never_errors_and_zero_divisor_is_null(a in any::<f64>().prop_filter("finite", |n| n.is_finite()), b in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
            let (s, sc, c) = fixture();
            let ctx = EvalContext::new(&s, &sc, &c);
            let expr = ExprNode::Div(Box::new(ExprNode::Literal(Value::Num(a))), Box::new(ExprNode::Literal(Value::Num(b))));
            let result = evaluate(&expr, &ctx);
            prop_assert!(result.is_ok());
            if b == 0.0 {
                prop_assert_eq!(result.unwrap(), Value::Null);
            }
        }

        #[test]
        fn mod_never_errors_and_zero_divisor_is_null(a in any::<f64>().prop_filter("finite", |n| n.is_finite()), b in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
            let (s, sc, c) = fixture();
            let ctx = EvalContext::new(&s, &sc, &c);
            let expr = ExprNode::Mod(Box::new(ExprNode::Literal(Value::Num(a))), Box::new(ExprNode::Literal(Value::Num(b))));
            let result = evaluate(&expr, &ctx);
            prop_assert!(result.is_ok());
            if b == 0.0 {
                prop_assert_eq!(result.unwrap(), Value::Null);
            }
        }

        #[test]
        fn sqrt_of_negative_is_always_null(n in any::<f64>().prop_filter("finite and negative", |n| n.is_finite() && *n < 0.0)) {
            let (s, sc, c) = fixture();
            let ctx = EvalContext::new(&s, &sc, &c);
            let expr = ExprNode::Sqrt(Box::new(ExprNode::Literal(Value::Num(n))));
            prop_assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::Null);
        }

        #[test]
        fn at_never_errors_and_unresolvable_index_is_null(len in 0usize..8, idx in -16i64..16i64) {
            let (s, sc, c) = fixture();
            let ctx = EvalContext::new(&s, &sc, &c);
            let items: Vec<Value> = (0..len).map(|i| Value::Num(i as f64)).collect();
            let resolved = if idx < 0 { len as i64 + idx } else { idx };
            let in_range = resolved >= 0 && (resolved as usize) < len;
            let expr = ExprNode::At {
                array: Box::new(ExprNode::Literal(Value::Array(items))),
                index: Box::new(ExprNode::Literal(Value::Num(idx as f64))),
            };
            let result = evaluate(&expr, &ctx).unwrap();
            if !in_range {
                prop_assert_eq!(result, Value::Null);
            }
        }

        #[test]
        fn to_number_is_total_over_arbitrary_strings(s in ".*") {
            // Must never panic, regardless of what garbage the string holds.
            let _ = Value::Str(s).to_number();
        }

        #[test]
        fn comparisons_never_error_for_any_finite_pair(a in any::<f64>().prop_filter("finite", |n| n.is_finite()), b in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
            let (s, sc, c) = fixture();
            let ctx = EvalContext::new(&s, &sc, &c);
            for expr in [
                ExprNode::Lt(Box::new(ExprNode::Literal(Value::Num(a))), Box::new(ExprNode::Literal(Value::Num(b)))),
                ExprNode::Gte(Box::new(ExprNode::Literal(Value::Num(a))), Box::new(ExprNode::Literal(Value::Num(b)))),
            ] {
                prop_assert!(evaluate(&expr, &ctx).is_ok());
            }
        }
    }
}
