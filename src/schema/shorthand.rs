//! Shorthand schema leaf parsing.
//!
//! A leaf is a string of the form `"type [| attr=value ...]"`, e.g.
//! `"integer | default=1 enum=a,b"`. The type is `string`, `integer`,
//! `boolean`, `object`, `array<T>`, or the name of a declared type.

use super::SchemaError;

/// Parsed (unresolved) leaf: a type expression plus attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShorthandLeaf {
    /// The type expression, e.g. `integer` or `array<Resources>`.
    pub type_expr: TypeExpr,
    /// Raw attribute assignments in declaration order.
    pub attributes: Vec<(String, String)>,
}

/// Type expression of a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `string`
    String,
    /// `integer`
    Integer,
    /// `boolean`
    Boolean,
    /// `object` without inline fields (free-form map).
    Object,
    /// `array<T>`
    Array(Box<TypeExpr>),
    /// Reference to a declared named type.
    Named(String),
}

/// Parse one shorthand leaf string.
pub fn parse_leaf(path: &str, input: &str) -> Result<ShorthandLeaf, SchemaError> {
    let (type_part, attr_part) = match input.split_once('|') {
        Some((t, a)) => (t.trim(), Some(a.trim())),
        None => (input.trim(), None),
    };
    if type_part.is_empty() {
        return Err(SchemaError::new(path, "empty type in shorthand schema"));
    }
    let type_expr = parse_type_expr(path, type_part)?;
    let attributes = match attr_part {
        Some(raw) => parse_attributes(path, raw)?,
        None => Vec::new(),
    };
    Ok(ShorthandLeaf {
        type_expr,
        attributes,
    })
}

fn parse_type_expr(path: &str, input: &str) -> Result<TypeExpr, SchemaError> {
    match input {
        "string" => Ok(TypeExpr::String),
        "integer" => Ok(TypeExpr::Integer),
        "boolean" => Ok(TypeExpr::Boolean),
        "object" => Ok(TypeExpr::Object),
        other => {
            if let Some(inner) = other.strip_prefix("array<").and_then(|s| s.strip_suffix('>')) {
                return Ok(TypeExpr::Array(Box::new(parse_type_expr(
                    path,
                    inner.trim(),
                )?)));
            }
            if other.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && other.chars().next().is_some_and(char::is_alphabetic)
            {
                return Ok(TypeExpr::Named(other.to_string()));
            }
            Err(SchemaError::new(
                path,
                format!("unrecognized type {other:?}"),
            ))
        }
    }
}

/// Split `key=value` attribute pairs on whitespace, honoring double quotes
/// so `description="multi word"` stays one attribute.
fn parse_attributes(path: &str, input: &str) -> Result<Vec<(String, String)>, SchemaError> {
    let mut attributes = Vec::new();
    for token in split_attr_tokens(input) {
        let Some((key, value)) = token.split_once('=') else {
            return Err(SchemaError::new(
                path,
                format!("attribute {token:?} is not key=value"),
            ));
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        attributes.push((key.trim().to_string(), value.to_string()));
    }
    Ok(attributes)
}

fn split_attr_tokens(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
