//! Expression evaluation and compile-time validation.
//!
//! Evaluation is a tree walk over the parsed AST against a variable scope.
//! Variables are the top-level keys of the rendering context; their types
//! are inferred from observed value shapes and used for the light static
//! checks performed at compile time (unknown functions, member access on a
//! variable known to be scalar).

use indexmap::IndexMap;

use super::builtins;
use super::errors::{EngineError, EngineResult};
use super::parse::{BinaryOp, Expr, UnaryOp};
use super::value::{TypeDesc, Value};

/// Top-level variables visible to an expression.
pub type VarScope = IndexMap<String, Value>;

/// Inferred shallow types of the top-level variables; the compile-time
/// environment derived from a [`VarScope`].
pub type TypeEnv = IndexMap<String, TypeDesc>;

/// Infer the compile-time environment from a value scope.
pub fn infer_env(vars: &VarScope) -> TypeEnv {
    vars.iter().map(|(k, v)| (k.clone(), v.type_desc())).collect()
}

/// Global functions with their arity bounds (min, max).
const GLOBAL_FUNCTIONS: &[(&str, usize, usize)] = &[
    ("omit", 0, 0),
    ("oc_omit", 0, 0),
    ("oc_merge", 2, usize::MAX),
    ("oc_hash", 1, 1),
    ("oc_generate_name", 1, usize::MAX),
    ("has", 1, 1),
    ("size", 1, 1),
    ("string", 1, 1),
];

/// Method-style functions with their arity bounds.
const METHOD_FUNCTIONS: &[(&str, usize, usize)] = &[
    ("all", 2, 2),
    ("exists", 2, 2),
    ("filter", 2, 2),
    ("map", 2, 2),
    ("transformMapEntry", 3, 3),
    ("flatten", 0, 0),
    ("size", 0, 0),
    ("startsWith", 1, 1),
    ("endsWith", 1, 1),
    ("contains", 1, 1),
];

/// Macros whose first argument(s) are variable bindings, not values.
const BINDING_MACROS: &[&str] = &["all", "exists", "filter", "map", "transformMapEntry"];

/// Validate a parsed expression against the compile-time environment.
///
/// Rejects unknown functions, wrong arities, non-identifier binding
/// variables, and member access on variables whose observed type cannot
/// have members. Unknown identifiers are *not* rejected here: they become
/// missing-data failures at evaluation time, since the data may appear.
pub fn check(expr: &Expr, env: &TypeEnv) -> EngineResult<()> {
    match expr {
        Expr::Literal(_) | Expr::Ident(_) => Ok(()),
        Expr::Member(target, _) => {
            if let Expr::Ident(name) = target.as_ref() {
                if let Some(desc) = env.get(name) {
                    if !desc.supports_members() {
                        return Err(EngineError::Type(format!(
                            "variable '{name}' is {desc:?} and has no fields"
                        )));
                    }
                }
            }
            check(target, env)
        }
        Expr::Index(target, index) => {
            check(target, env)?;
            check(index, env)
        }
        Expr::Unary(_, inner) => check(inner, env),
        Expr::Binary(_, left, right) => {
            check(left, env)?;
            check(right, env)
        }
        Expr::Ternary(cond, then, otherwise) => {
            check(cond, env)?;
            check(then, env)?;
            check(otherwise, env)
        }
        Expr::List(items) => items.iter().try_for_each(|item| check(item, env)),
        Expr::Map(entries) => entries.iter().try_for_each(|(k, v)| {
            check(k, env)?;
            check(v, env)
        }),
        Expr::Call { target, name, args } => {
            check_call(target.as_deref(), name, args, env)
        }
    }
}

fn check_call(
    target: Option<&Expr>,
    name: &str,
    args: &[Expr],
    env: &TypeEnv,
) -> EngineResult<()> {
    let table = if target.is_some() {
        METHOD_FUNCTIONS
    } else {
        GLOBAL_FUNCTIONS
    };

    // base64.encode / base64.decode parse as method calls on the `base64`
    // identifier; recognize the namespace unless a variable shadows it.
    if let Some(Expr::Ident(ns)) = target {
        if ns == "base64" && !env.contains_key("base64") {
            if !matches!(name, "encode" | "decode") {
                return Err(EngineError::Type(format!(
                    "unknown function base64.{name}"
                )));
            }
            if args.len() != 1 {
                return Err(EngineError::Type(format!(
                    "base64.{name} expects 1 argument, got {}",
                    args.len()
                )));
            }
            return args.iter().try_for_each(|a| check(a, env));
        }
    }

    let Some((_, min, max)) = table.iter().find(|(n, _, _)| *n == name) else {
        return Err(EngineError::Type(format!("unknown function {name}")));
    };
    if args.len() < *min || args.len() > *max {
        return Err(EngineError::Type(format!(
            "{name} expects between {min} and {} arguments, got {}",
            if *max == usize::MAX {
                "N".to_string()
            } else {
                max.to_string()
            },
            args.len()
        )));
    }

    if BINDING_MACROS.contains(&name) {
        let binding_count = args.len() - 1;
        for binding in &args[..binding_count] {
            if !matches!(binding, Expr::Ident(_)) {
                return Err(EngineError::Syntax(format!(
                    "{name} binding variables must be identifiers"
                )));
            }
        }
        check(&args[binding_count], env)?;
    } else {
        for arg in args {
            check(arg, env)?;
        }
    }
    if name == "has" && target.is_none() && !matches!(args[0], Expr::Member(_, _)) {
        return Err(EngineError::Syntax(
            "has() requires a field selection argument".to_string(),
        ));
    }
    if let Some(target) = target {
        check(target, env)?;
    }
    Ok(())
}

/// Evaluation scope: the top-level variables plus macro-bound locals.
pub struct Scope<'a> {
    vars: &'a VarScope,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    /// Scope over the given variables, no locals.
    pub fn new(vars: &'a VarScope) -> Self {
        Self {
            vars,
            locals: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.vars.get(name))
    }

    fn push(&mut self, name: &str, value: Value) {
        self.locals.push((name.to_string(), value));
    }

    fn pop(&mut self) {
        self.locals.pop();
    }
}

/// Evaluate an expression in the given scope.
pub fn eval(expr: &Expr, scope: &mut Scope<'_>) -> EngineResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => scope.lookup(name).cloned().ok_or_else(|| {
            EngineError::MissingData(format!("undeclared reference to '{name}'"))
        }),
        Expr::Member(target, field) => {
            let value = eval(target, scope)?;
            member(&value, field)
        }
        Expr::Index(target, index) => {
            let value = eval(target, scope)?;
            let idx = eval(index, scope)?;
            index_value(&value, &idx)
        }
        Expr::Unary(op, inner) => {
            let value = eval(inner, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
                UnaryOp::Neg => match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Double(d) => Ok(Value::Double(-d)),
                    other => Err(EngineError::Type(format!(
                        "cannot negate {}",
                        other.type_name()
                    ))),
                },
            }
        }
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, scope),
        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond, scope)?.as_bool()? {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, scope)?);
            }
            Ok(Value::List(out))
        }
        Expr::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key_expr, value_expr) in entries {
                let key = match eval(key_expr, scope)? {
                    Value::String(key) => key,
                    other => {
                        return Err(EngineError::Type(format!(
                            "map literal key must be a string, got {}",
                            other.type_name()
                        )));
                    }
                };
                out.insert(key, eval(value_expr, scope)?);
            }
            Ok(Value::Map(out))
        }
        Expr::Call { target, name, args } => eval_call(target.as_deref(), name, args, scope),
    }
}

fn member(value: &Value, field: &str) -> EngineResult<Value> {
    match value {
        Value::Map(m) => m
            .get(field)
            .cloned()
            .ok_or_else(|| EngineError::MissingData(format!("no such key: {field}"))),
        Value::Null => Err(EngineError::MissingData(format!(
            "no such key: {field} (value is null)"
        ))),
        other => Err(EngineError::Type(format!(
            "cannot access field '{field}' on {}",
            other.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> EngineResult<Value> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => {
            let i = usize::try_from(*i).map_err(|_| {
                EngineError::Type(format!("negative list index {i}"))
            })?;
            items.get(i).cloned().ok_or_else(|| {
                EngineError::Type(format!(
                    "list index {i} out of range (len {})",
                    items.len()
                ))
            })
        }
        (Value::Map(m), Value::String(key)) => m
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::MissingData(format!("no such key: {key}"))),
        (target, index) => Err(EngineError::Type(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    scope: &mut Scope<'_>,
) -> EngineResult<Value> {
    // Short-circuit logical operators before evaluating the right side.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let l = eval(left, scope)?.as_bool()?;
        return match (op, l) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(eval(right, scope)?.as_bool()?)),
        };
    }

    let l = eval(left, scope)?;
    let r = eval(right, scope)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::Ne => Ok(Value::Bool(l != r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &l, &r),
        BinaryOp::Add => add(l, r),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, &l, &r),
        BinaryOp::In => membership(&l, &r),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> EngineResult<Value> {
    let ordering = match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(EngineError::Type(format!(
            "cannot compare {} with {}",
            l.type_name(),
            r.type_name()
        )));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn add(l: Value, r: Value) -> EngineResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| EngineError::Type("integer overflow in addition".to_string())),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
        (Value::Int(a), Value::Double(b)) => Ok(Value::Double(a as f64 + b)),
        (Value::Double(a), Value::Int(b)) => Ok(Value::Double(a + b as f64)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (l, r) => Err(EngineError::Type(format!(
            "cannot add {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> EngineResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div => {
                    if *b == 0 {
                        return Err(EngineError::Type("division by zero".to_string()));
                    }
                    a.checked_div(*b)
                }
                BinaryOp::Mod => {
                    if *b == 0 {
                        return Err(EngineError::Type("modulo by zero".to_string()));
                    }
                    a.checked_rem(*b)
                }
                _ => unreachable!(),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| EngineError::Type("integer overflow".to_string()))
        }
        (Value::Double(_) | Value::Int(_), Value::Double(_) | Value::Int(_)) => {
            let a = as_double(l);
            let b = as_double(r);
            let result = match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(EngineError::Type("division by zero".to_string()));
                    }
                    a / b
                }
                BinaryOp::Mod => {
                    if b == 0.0 {
                        return Err(EngineError::Type("modulo by zero".to_string()));
                    }
                    a % b
                }
                _ => unreachable!(),
            };
            Ok(Value::Double(result))
        }
        _ => Err(EngineError::Type(format!(
            "arithmetic requires numbers, got {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn as_double(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Double(d) => *d,
        _ => unreachable!("checked by caller"),
    }
}

fn membership(needle: &Value, haystack: &Value) -> EngineResult<Value> {
    match haystack {
        Value::List(items) => Ok(Value::Bool(items.contains(needle))),
        Value::Map(m) => {
            let key = needle.as_str().map_err(|_| {
                EngineError::Type(format!(
                    "map membership requires a string key, got {}",
                    needle.type_name()
                ))
            })?;
            Ok(Value::Bool(m.contains_key(key)))
        }
        other => Err(EngineError::Type(format!(
            "'in' requires a list or map, got {}",
            other.type_name()
        ))),
    }
}

fn eval_call(
    target: Option<&Expr>,
    name: &str,
    args: &[Expr],
    scope: &mut Scope<'_>,
) -> EngineResult<Value> {
    // Namespace functions: base64.encode / base64.decode.
    if let Some(Expr::Ident(ns)) = target {
        if ns == "base64" && scope.lookup("base64").is_none() {
            let arg = eval(&args[0], scope)?;
            return match name {
                "encode" => builtins::base64_encode(&arg),
                "decode" => builtins::base64_decode(&arg),
                other => Err(EngineError::Type(format!("unknown function base64.{other}"))),
            };
        }
    }

    match (target, name) {
        (None, "omit" | "oc_omit") => Ok(Value::Omit),
        (None, "oc_merge") => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, scope)?);
            }
            builtins::merge(values)
        }
        (None, "oc_hash") => {
            let value = eval(&args[0], scope)?;
            Ok(Value::String(builtins::hash_hex8(value.as_str()?)))
        }
        (None, "oc_generate_name") => {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                match eval(arg, scope)? {
                    Value::String(s) => parts.push(s),
                    Value::Int(i) => parts.push(i.to_string()),
                    other => {
                        return Err(EngineError::Type(format!(
                            "oc_generate_name arguments must be strings, got {}",
                            other.type_name()
                        )));
                    }
                }
            }
            builtins::generate_name(&parts).map(Value::String)
        }
        (None, "has") => eval_has(&args[0], scope),
        (None, "size") => {
            let value = eval(&args[0], scope)?;
            size_of(&value)
        }
        (None, "string") => {
            let value = eval(&args[0], scope)?;
            value.interpolate().map(Value::String)
        }
        (Some(receiver), _) => {
            let receiver = eval(receiver, scope)?;
            eval_method(&receiver, name, args, scope)
        }
        (None, other) => Err(EngineError::Type(format!("unknown function {other}"))),
    }
}

/// `has(a.b.c)`: true iff every step of the selection resolves.
fn eval_has(arg: &Expr, scope: &mut Scope<'_>) -> EngineResult<Value> {
    let Expr::Member(target, field) = arg else {
        return Err(EngineError::Syntax(
            "has() requires a field selection argument".to_string(),
        ));
    };
    let base = match target.as_ref() {
        Expr::Member(_, _) => match eval_has(target, scope)? {
            Value::Bool(false) => return Ok(Value::Bool(false)),
            _ => eval(target, scope)?,
        },
        other => match eval(other, scope) {
            Ok(v) => v,
            Err(e) if e.is_missing_data() => return Ok(Value::Bool(false)),
            Err(e) => return Err(e),
        },
    };
    match base {
        Value::Map(m) => Ok(Value::Bool(m.contains_key(field))),
        _ => Ok(Value::Bool(false)),
    }
}

fn size_of(value: &Value) -> EngineResult<Value> {
    match value {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Map(m) => Ok(Value::Int(m.len() as i64)),
        other => Err(EngineError::Type(format!(
            "size() requires a string, list, or map, got {}",
            other.type_name()
        ))),
    }
}

fn eval_method(
    receiver: &Value,
    name: &str,
    args: &[Expr],
    scope: &mut Scope<'_>,
) -> EngineResult<Value> {
    match name {
        "all" | "exists" | "filter" | "map" => eval_comprehension(receiver, name, args, scope),
        "transformMapEntry" => eval_transform_map_entry(receiver, args, scope),
        "flatten" => match receiver {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::List(inner) => out.extend(inner.iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                Ok(Value::List(out))
            }
            other => Err(EngineError::Type(format!(
                "flatten() requires a list, got {}",
                other.type_name()
            ))),
        },
        "size" => size_of(receiver),
        "startsWith" => {
            let prefix = eval(&args[0], scope)?;
            Ok(Value::Bool(
                receiver.as_str()?.starts_with(prefix.as_str()?),
            ))
        }
        "endsWith" => {
            let suffix = eval(&args[0], scope)?;
            Ok(Value::Bool(receiver.as_str()?.ends_with(suffix.as_str()?)))
        }
        "contains" => {
            let needle = eval(&args[0], scope)?;
            Ok(Value::Bool(receiver.as_str()?.contains(needle.as_str()?)))
        }
        other => Err(EngineError::Type(format!("unknown function {other}"))),
    }
}

/// Items a comprehension iterates: list elements, or map keys.
fn iteration_items(receiver: &Value, name: &str) -> EngineResult<Vec<Value>> {
    match receiver {
        Value::List(items) => Ok(items.clone()),
        Value::Map(m) => Ok(m.keys().map(|k| Value::String(k.clone())).collect()),
        other => Err(EngineError::Type(format!(
            "{name}() requires a list or map, got {}",
            other.type_name()
        ))),
    }
}

fn eval_comprehension(
    receiver: &Value,
    name: &str,
    args: &[Expr],
    scope: &mut Scope<'_>,
) -> EngineResult<Value> {
    let Expr::Ident(var) = &args[0] else {
        return Err(EngineError::Syntax(format!(
            "{name} binding variable must be an identifier"
        )));
    };
    let body = &args[1];
    let items = iteration_items(receiver, name)?;

    match name {
        "all" => {
            for item in items {
                scope.push(var, item);
                let keep = eval(body, scope).and_then(|v| v.as_bool());
                scope.pop();
                if !keep? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "exists" => {
            for item in items {
                scope.push(var, item);
                let hit = eval(body, scope).and_then(|v| v.as_bool());
                scope.pop();
                if hit? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "filter" => {
            let mut out = Vec::new();
            for item in items {
                scope.push(var, item.clone());
                let keep = eval(body, scope).and_then(|v| v.as_bool());
                scope.pop();
                if keep? {
                    out.push(item);
                }
            }
            Ok(Value::List(out))
        }
        "map" => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                scope.push(var, item);
                let mapped = eval(body, scope);
                scope.pop();
                out.push(mapped?);
            }
            Ok(Value::List(out))
        }
        _ => unreachable!(),
    }
}

/// `transformMapEntry` over a list binds (index, element); over a map it
/// binds (key, value). The body must yield a map; entries are folded
/// together and duplicate keys are an error.
fn eval_transform_map_entry(
    receiver: &Value,
    args: &[Expr],
    scope: &mut Scope<'_>,
) -> EngineResult<Value> {
    let (Expr::Ident(first), Expr::Ident(second)) = (&args[0], &args[1]) else {
        return Err(EngineError::Syntax(
            "transformMapEntry binding variables must be identifiers".to_string(),
        ));
    };
    let body = &args[2];

    let pairs: Vec<(Value, Value)> = match receiver {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v.clone()))
            .collect(),
        Value::Map(m) => m
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
        other => {
            return Err(EngineError::Type(format!(
                "transformMapEntry requires a list or map, got {}",
                other.type_name()
            )));
        }
    };

    let mut out: IndexMap<String, Value> = IndexMap::new();
    for (key, value) in pairs {
        scope.push(first, key);
        scope.push(second, value);
        let produced = eval(body, scope);
        scope.pop();
        scope.pop();
        let Value::Map(entries) = produced? else {
            return Err(EngineError::Type(
                "transformMapEntry body must produce a map".to_string(),
            ));
        };
        for (k, v) in entries {
            if out.contains_key(&k) {
                return Err(EngineError::Type(format!(
                    "transformMapEntry produced duplicate key {k:?}"
                )));
            }
            out.insert(k, v);
        }
    }
    Ok(Value::Map(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse::parse;

    fn vars(yaml: &str) -> VarScope {
        let doc: crate::domain::raw::RawDoc = serde_yaml::from_str(yaml).unwrap();
        let Value::Map(m) = Value::from(&doc) else {
            panic!("vars fixture must be a map")
        };
        m
    }

    fn run(src: &str, scope_yaml: &str) -> EngineResult<Value> {
        let scope_vars = vars(scope_yaml);
        let expr = parse(src)?;
        check(&expr, &infer_env(&scope_vars))?;
        eval(&expr, &mut Scope::new(&scope_vars))
    }

    #[test]
    fn test_member_and_arithmetic() {
        let v = run("parameters.replicas * 2", "parameters:\n  replicas: 3\n").unwrap();
        assert_eq!(v, Value::Int(6));
    }

    #[test]
    fn test_missing_key_is_missing_data() {
        let err = run("parameters.absent", "parameters: {}\n").unwrap_err();
        assert!(err.is_missing_data());
    }

    #[test]
    fn test_undeclared_variable_is_missing_data() {
        let err = run("nowhere.field", "parameters: {}\n").unwrap_err();
        assert!(err.is_missing_data());
    }

    #[test]
    fn test_member_on_scalar_rejected_at_compile() {
        let scope_vars = vars("count: 3\n");
        let expr = parse("count.field").unwrap();
        let err = check(&expr, &infer_env(&scope_vars)).unwrap_err();
        assert!(matches!(err, EngineError::Type(_)));
    }

    #[test]
    fn test_unknown_function_rejected_at_compile() {
        let scope_vars = vars("a: 1\n");
        let expr = parse("bogus(a)").unwrap();
        assert!(matches!(
            check(&expr, &infer_env(&scope_vars)),
            Err(EngineError::Type(_))
        ));
    }

    #[test]
    fn test_ternary_with_omit() {
        let v = run(
            "p.medium != '' ? p.medium : omit()",
            "p:\n  medium: ''\n",
        )
        .unwrap();
        assert_eq!(v, Value::Omit);
    }

    #[test]
    fn test_short_circuit_and() {
        // Right side would be a missing-data failure; short-circuit avoids it.
        let v = run("false && nowhere.field == 1", "p: {}\n").unwrap();
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn test_list_concat_with_plus() {
        let v = run("[1, 2] + [3]", "p: {}\n").unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_string_concat() {
        let v = run("name + '-suffix'", "name: app\n").unwrap();
        assert_eq!(v, Value::String("app-suffix".into()));
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(
            run("items.filter(i, i > 1).map(i, i * 10)", "items: [1, 2, 3]\n").unwrap(),
            Value::List(vec![Value::Int(20), Value::Int(30)])
        );
        assert_eq!(
            run("items.all(i, i > 0)", "items: [1, 2, 3]\n").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run("items.exists(i, i == 99)", "items: [1, 2, 3]\n").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_map_comprehension_iterates_keys() {
        let v = run("m.all(k, k.startsWith('p'))", "m:\n  port: 1\n  path: x\n").unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn test_flatten() {
        let v = run("nested.flatten()", "nested:\n- [1, 2]\n- [3]\n").unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_transform_map_entry_from_list() {
        let v = run(
            "endpoints.transformMapEntry(i, e, {e.name: e.port})",
            "endpoints:\n- name: http\n  port: 80\n- name: grpc\n  port: 9090\n",
        )
        .unwrap();
        let Value::Map(m) = v else { panic!() };
        assert_eq!(m["http"], Value::Int(80));
        assert_eq!(m["grpc"], Value::Int(9090));
    }

    #[test]
    fn test_transform_map_entry_duplicate_key_rejected() {
        let err = run(
            "items.transformMapEntry(i, e, {'same': e})",
            "items: [1, 2]\n",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Type(_)));
    }

    #[test]
    fn test_has_macro() {
        assert_eq!(
            run("has(p.medium)", "p:\n  medium: ssd\n").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run("has(p.medium)", "p: {}\n").unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            run("has(q.medium)", "p: {}\n").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_in_operator() {
        assert_eq!(
            run("'b' in items", "items: [a, b]\n").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run("'k' in m", "m:\n  k: 1\n").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_merge_builtin_through_eval() {
        let v = run(
            "oc_merge(base, override)",
            "base:\n  a: 1\n  b: 1\noverride:\n  b: 2\n",
        )
        .unwrap();
        let Value::Map(m) = v else { panic!() };
        assert_eq!(m["a"], Value::Int(1));
        assert_eq!(m["b"], Value::Int(2));
    }

    #[test]
    fn test_division_by_zero() {
        let err = run("1 / 0", "p: {}\n").unwrap_err();
        assert!(matches!(err, EngineError::Type(_)));
    }

    #[test]
    fn test_base64_namespace() {
        assert_eq!(
            run("base64.encode('hi')", "p: {}\n").unwrap(),
            Value::String("aGk=".into())
        );
        assert_eq!(
            run("base64.decode('aGk=')", "p: {}\n").unwrap(),
            Value::String("hi".into())
        );
    }
}
