//! Runtime values flowing through expression evaluation.
//!
//! The value lattice mirrors [`RawDoc`](crate::domain::raw::RawDoc) plus
//! the `omit()` sentinel, which exists only inside the engine and is
//! stripped before a rendered document leaves it.

use indexmap::IndexMap;

use crate::domain::raw::RawDoc;

use super::errors::{EngineError, EngineResult};

/// A value produced by expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Order-preserving string-keyed map.
    Map(IndexMap<String, Value>),
    /// The `omit()` sentinel: removes its containing field or element.
    Omit,
}

/// Shallow type descriptor inferred from a variable's value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// Null (typed dyn for member access purposes).
    Null,
    /// Boolean scalar.
    Bool,
    /// Integer scalar.
    Int,
    /// Float scalar.
    Double,
    /// String scalar.
    String,
    /// List of anything.
    List,
    /// Map of anything.
    Map,
}

impl TypeDesc {
    /// Whether member access (`x.y`) can possibly succeed on this type.
    pub fn supports_members(self) -> bool {
        matches!(self, Self::Map | Self::Null)
    }
}

impl Value {
    /// Shallow type of this value.
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Self::Null | Self::Omit => TypeDesc::Null,
            Self::Bool(_) => TypeDesc::Bool,
            Self::Int(_) => TypeDesc::Int,
            Self::Double(_) => TypeDesc::Double,
            Self::String(_) => TypeDesc::String,
            Self::List(_) => TypeDesc::List,
            Self::Map(_) => TypeDesc::Map,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Omit => "omit",
        }
    }

    /// Truthiness is only defined for booleans; anything else is a type
    /// error at the call site.
    pub fn as_bool(&self) -> EngineResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(EngineError::Type(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        }
    }

    /// Borrow as string.
    pub fn as_str(&self) -> EngineResult<&str> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(EngineError::Type(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }

    /// Render for interpolation into a string template. Scalars print
    /// plainly; lists and maps print as compact JSON.
    pub fn interpolate(&self) -> EngineResult<String> {
        match self {
            Self::Null => Ok("null".to_string()),
            Self::Bool(b) => Ok(b.to_string()),
            Self::Int(i) => Ok(i.to_string()),
            Self::Double(d) => Ok(format_double(*d)),
            Self::String(s) => Ok(s.clone()),
            Self::List(_) | Self::Map(_) => {
                let doc = self.clone().into_doc()?;
                serde_json::to_string(&doc)
                    .map_err(|e| EngineError::Type(format!("cannot interpolate value: {e}")))
            }
            Self::Omit => Err(EngineError::Type(
                "omit() cannot be interpolated into a string".to_string(),
            )),
        }
    }

    /// Convert into a document, with `omit()` sentinels stripped: a map
    /// field or list element whose value is the sentinel disappears;
    /// containers emptied by the removal stay in place.
    pub fn into_doc(self) -> EngineResult<RawDoc> {
        match self {
            Self::Null => Ok(RawDoc::Null),
            Self::Bool(b) => Ok(RawDoc::Bool(b)),
            Self::Int(i) => Ok(RawDoc::Int(i)),
            Self::Double(d) => Ok(RawDoc::Float(d)),
            Self::String(s) => Ok(RawDoc::String(s)),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if matches!(item, Self::Omit) {
                        continue;
                    }
                    out.push(item.into_doc()?);
                }
                Ok(RawDoc::List(out))
            }
            Self::Map(entries) => {
                let mut out = indexmap::IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    if matches!(v, Self::Omit) {
                        continue;
                    }
                    out.insert(k, v.into_doc()?);
                }
                Ok(RawDoc::Map(out))
            }
            Self::Omit => Err(EngineError::Type(
                "omit() cannot stand alone as a document".to_string(),
            )),
        }
    }
}

impl From<&RawDoc> for Value {
    fn from(doc: &RawDoc) -> Self {
        match doc {
            RawDoc::Null => Self::Null,
            RawDoc::Bool(b) => Self::Bool(*b),
            RawDoc::Int(i) => Self::Int(*i),
            RawDoc::Float(f) => Self::Double(*f),
            RawDoc::String(s) => Self::String(s.clone()),
            RawDoc::List(items) => Self::List(items.iter().map(Value::from).collect()),
            RawDoc::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Print a double without losing the decimal point on whole values.
fn format_double(d: f64) -> String {
    if d.fract() == 0.0 && d.is_finite() {
        format!("{d:.1}")
    } else {
        d.to_string()
    }
}
