//! Structural schema form resolved from shorthand documents.
//!
//! The structural schema is a homomorph of OpenAPI structural schemas:
//! every node has exactly one type, optional default/bounds/enum
//! attributes, and object nodes carry their fields inline. Named types
//! declared under `types:` are resolved (and cycle-checked) here.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::domain::raw::RawDoc;

use super::shorthand::{parse_leaf, ShorthandLeaf, TypeExpr};
use super::SchemaError;

/// Resolved type of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralType {
    /// UTF-8 string.
    String,
    /// 64-bit integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Free-form map with no declared fields.
    FreeFormObject,
    /// Homogeneous list.
    Array(Box<StructuralSchema>),
    /// Object with declared fields.
    Object(IndexMap<String, StructuralSchema>),
}

impl StructuralType {
    /// Short name used in validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::FreeFormObject | Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }
}

/// One node of the structural schema.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralSchema {
    /// Resolved type.
    pub structural_type: StructuralType,
    /// Default value applied when the field is absent.
    pub default: Option<RawDoc>,
    /// Allowed values, when restricted.
    pub enum_values: Vec<String>,
    /// Inclusive lower bound (integers only).
    pub minimum: Option<i64>,
    /// Inclusive upper bound (integers only).
    pub maximum: Option<i64>,
    /// Whether the field must be present.
    pub required: bool,
    /// Free-text description.
    pub description: Option<String>,
}

impl StructuralSchema {
    fn bare(structural_type: StructuralType) -> Self {
        Self {
            structural_type,
            default: None,
            enum_values: Vec::new(),
            minimum: None,
            maximum: None,
            required: false,
            description: None,
        }
    }
}

/// Declared named types, unresolved.
pub struct TypeTable<'a> {
    entries: IndexMap<String, &'a RawDoc>,
}

impl<'a> TypeTable<'a> {
    /// Build the table from a `types:` document (a map of declarations).
    pub fn from_doc(doc: Option<&'a RawDoc>) -> Result<Self, SchemaError> {
        let mut entries = IndexMap::new();
        if let Some(doc) = doc {
            let Some(map) = doc.as_map() else {
                return Err(SchemaError::new("types", "types declaration must be a map"));
            };
            for (name, decl) in map {
                entries.insert(name.clone(), decl);
            }
        }
        Ok(Self { entries })
    }
}

/// Parse a schema document (map of field name to leaf string or nested
/// map) into an object node, resolving named types.
pub fn parse_document(
    path: &str,
    doc: &RawDoc,
    types: &TypeTable<'_>,
) -> Result<IndexMap<String, StructuralSchema>, SchemaError> {
    let Some(map) = doc.as_map() else {
        return Err(SchemaError::new(
            path,
            format!("schema must be a map, got {}", doc.type_name()),
        ));
    };
    let mut fields = IndexMap::with_capacity(map.len());
    let mut visiting = HashSet::new();
    for (name, node) in map {
        let field_path = join(path, name);
        fields.insert(
            name.clone(),
            parse_node(&field_path, node, types, &mut visiting)?,
        );
    }
    Ok(fields)
}

fn parse_node(
    path: &str,
    node: &RawDoc,
    types: &TypeTable<'_>,
    visiting: &mut HashSet<String>,
) -> Result<StructuralSchema, SchemaError> {
    match node {
        RawDoc::String(leaf) => {
            let parsed = parse_leaf(path, leaf)?;
            resolve_leaf(path, &parsed, types, visiting)
        }
        RawDoc::Map(entries) => {
            let mut fields = IndexMap::with_capacity(entries.len());
            for (name, child) in entries {
                let field_path = join(path, name);
                fields.insert(
                    name.clone(),
                    parse_node(&field_path, child, types, visiting)?,
                );
            }
            Ok(StructuralSchema::bare(StructuralType::Object(fields)))
        }
        other => Err(SchemaError::new(
            path,
            format!(
                "schema node must be a shorthand string or a map, got {}",
                other.type_name()
            ),
        )),
    }
}

fn resolve_leaf(
    path: &str,
    leaf: &ShorthandLeaf,
    types: &TypeTable<'_>,
    visiting: &mut HashSet<String>,
) -> Result<StructuralSchema, SchemaError> {
    let mut node = resolve_type_expr(path, &leaf.type_expr, types, visiting)?;
    apply_attributes(path, &mut node, &leaf.attributes)?;
    Ok(node)
}

fn resolve_type_expr(
    path: &str,
    expr: &TypeExpr,
    types: &TypeTable<'_>,
    visiting: &mut HashSet<String>,
) -> Result<StructuralSchema, SchemaError> {
    match expr {
        TypeExpr::String => Ok(StructuralSchema::bare(StructuralType::String)),
        TypeExpr::Integer => Ok(StructuralSchema::bare(StructuralType::Integer)),
        TypeExpr::Boolean => Ok(StructuralSchema::bare(StructuralType::Boolean)),
        TypeExpr::Object => Ok(StructuralSchema::bare(StructuralType::FreeFormObject)),
        TypeExpr::Array(inner) => {
            let element = resolve_type_expr(path, inner, types, visiting)?;
            Ok(StructuralSchema::bare(StructuralType::Array(Box::new(
                element,
            ))))
        }
        TypeExpr::Named(name) => {
            let Some(declaration) = types.entries.get(name) else {
                return Err(SchemaError::new(
                    path,
                    format!("unknown named type {name:?}"),
                ));
            };
            if !visiting.insert(name.clone()) {
                return Err(SchemaError::new(
                    path,
                    format!("named type {name:?} is recursively defined"),
                ));
            }
            let resolved = parse_node(path, declaration, types, visiting);
            visiting.remove(name);
            resolved
        }
    }
}

fn apply_attributes(
    path: &str,
    node: &mut StructuralSchema,
    attributes: &[(String, String)],
) -> Result<(), SchemaError> {
    for (key, value) in attributes {
        match key.as_str() {
            "default" => node.default = Some(parse_default(path, node, value)?),
            "enum" => {
                node.enum_values = value.split(',').map(|v| v.trim().to_string()).collect();
            }
            "minimum" => {
                node.minimum = Some(parse_int_attr(path, "minimum", value)?);
            }
            "maximum" => {
                node.maximum = Some(parse_int_attr(path, "maximum", value)?);
            }
            "required" => {
                node.required = value.parse::<bool>().map_err(|_| {
                    SchemaError::new(path, format!("required must be true or false, got {value:?}"))
                })?;
            }
            "description" => node.description = Some(value.clone()),
            other => {
                return Err(SchemaError::new(
                    path,
                    format!("unknown attribute {other:?}"),
                ));
            }
        }
    }
    Ok(())
}

fn parse_default(
    path: &str,
    node: &StructuralSchema,
    value: &str,
) -> Result<RawDoc, SchemaError> {
    match &node.structural_type {
        StructuralType::String => Ok(RawDoc::String(value.to_string())),
        StructuralType::Integer => value.parse::<i64>().map(RawDoc::Int).map_err(|_| {
            SchemaError::new(path, format!("default {value:?} is not an integer"))
        }),
        StructuralType::Boolean => value.parse::<bool>().map(RawDoc::Bool).map_err(|_| {
            SchemaError::new(path, format!("default {value:?} is not a boolean"))
        }),
        StructuralType::Array(element) => {
            let mut items = Vec::new();
            if !value.is_empty() {
                for part in value.split(',') {
                    items.push(parse_default(path, element, part.trim())?);
                }
            }
            Ok(RawDoc::List(items))
        }
        StructuralType::FreeFormObject | StructuralType::Object(_) => Err(SchemaError::new(
            path,
            "defaults on object nodes are not supported; set field defaults instead",
        )),
    }
}

fn parse_int_attr(path: &str, name: &str, value: &str) -> Result<i64, SchemaError> {
    value.parse::<i64>().map_err(|_| {
        SchemaError::new(path, format!("{name} must be an integer, got {value:?}"))
    })
}

pub(super) fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}
