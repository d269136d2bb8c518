//! Template tree rendering.
//!
//! Walks a [`RawDoc`] template, substituting `${...}` expressions in string
//! leaves and map keys. A leaf that is exactly one expression takes the
//! expression's native value; anything else interpolates to a string.

use indexmap::IndexMap;

use crate::domain::raw::RawDoc;

use super::errors::{EngineError, EngineResult};
use super::scan::{self, Segment};
use super::value::Value;
use super::TemplateEngine;
use super::VarScope;

/// Render a template document to a value tree. `omit()` sentinels are left
/// in place; [`Value::into_doc`] strips them.
pub fn render_value(
    engine: &TemplateEngine,
    doc: &RawDoc,
    vars: &VarScope,
) -> EngineResult<Value> {
    match doc {
        RawDoc::Null => Ok(Value::Null),
        RawDoc::Bool(b) => Ok(Value::Bool(*b)),
        RawDoc::Int(i) => Ok(Value::Int(*i)),
        RawDoc::Float(f) => Ok(Value::Double(*f)),
        RawDoc::String(s) => render_string(engine, s, vars),
        RawDoc::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_value(engine, item, vars)?);
            }
            Ok(Value::List(out))
        }
        RawDoc::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                let rendered_key = render_key(engine, key, vars)?;
                let rendered_value = render_value(engine, value, vars)?;
                out.insert(rendered_key, rendered_value);
            }
            Ok(Value::Map(out))
        }
    }
}

/// Render a string leaf: native value for a lone expression, type-directed
/// string interpolation otherwise.
fn render_string(engine: &TemplateEngine, raw: &str, vars: &VarScope) -> EngineResult<Value> {
    let segments = scan::scan(raw)?;
    if !scan::has_expression(&segments) {
        return Ok(Value::String(raw.to_string()));
    }
    if scan::is_single_expression(&segments) {
        let Segment::Expr(source) = &segments[0] else {
            unreachable!("checked by is_single_expression")
        };
        return engine.eval_expression(source, vars);
    }

    let mut out = String::with_capacity(raw.len());
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(source) => {
                let value = engine.eval_expression(source, vars)?;
                out.push_str(&value.interpolate()?);
            }
        }
    }
    Ok(Value::String(out))
}

/// Render a map key. Any expression appearing in key position must yield a
/// string; other types are rejected with a specific error.
fn render_key(engine: &TemplateEngine, raw: &str, vars: &VarScope) -> EngineResult<String> {
    let segments = scan::scan(raw)?;
    if !scan::has_expression(&segments) {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(source) => {
                let value = engine.eval_expression(source, vars)?;
                match value {
                    Value::String(s) => out.push_str(&s),
                    other => {
                        return Err(EngineError::Type(format!(
                            "map key expression must evaluate to a string, got {}",
                            other.type_name()
                        )));
                    }
                }
            }
        }
    }
    Ok(out)
}
