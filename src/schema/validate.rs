//! Value validation and default application against a structural schema.

use indexmap::IndexMap;

use crate::domain::raw::RawDoc;

use super::structural::{join, StructuralSchema, StructuralType};
use super::SchemaError;

/// Validate values against an object schema, collecting every violation
/// with its dotted path.
pub fn validate_object(
    path: &str,
    fields: &IndexMap<String, StructuralSchema>,
    values: &RawDoc,
    errors: &mut Vec<SchemaError>,
) {
    let Some(map) = values.as_map() else {
        errors.push(SchemaError::new(
            path,
            format!("expected object, got {}", values.type_name()),
        ));
        return;
    };

    for (name, schema) in fields {
        let field_path = join(path, name);
        match map.get(name) {
            Some(value) => validate_node(&field_path, schema, value, errors),
            None => {
                if schema.required && schema.default.is_none() {
                    errors.push(SchemaError::new(&field_path, "required field is missing"));
                }
            }
        }
    }

    for name in map.keys() {
        if !fields.contains_key(name) {
            errors.push(SchemaError::new(
                join(path, name),
                "unknown field not declared in schema",
            ));
        }
    }
}

fn validate_node(
    path: &str,
    schema: &StructuralSchema,
    value: &RawDoc,
    errors: &mut Vec<SchemaError>,
) {
    match &schema.structural_type {
        StructuralType::String => match value {
            RawDoc::String(s) => validate_enum(path, schema, s, errors),
            other => push_type_error(path, "string", other, errors),
        },
        StructuralType::Integer => match value {
            RawDoc::Int(i) => {
                validate_bounds(path, schema, *i, errors);
                validate_enum(path, schema, &i.to_string(), errors);
            }
            other => push_type_error(path, "integer", other, errors),
        },
        StructuralType::Boolean => match value {
            RawDoc::Bool(_) => {}
            other => push_type_error(path, "boolean", other, errors),
        },
        StructuralType::FreeFormObject => match value {
            RawDoc::Map(_) => {}
            other => push_type_error(path, "object", other, errors),
        },
        StructuralType::Array(element) => match value {
            RawDoc::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    validate_node(&format!("{path}[{index}]"), element, item, errors);
                }
            }
            other => push_type_error(path, "array", other, errors),
        },
        StructuralType::Object(fields) => validate_object(path, fields, value, errors),
    }
}

fn validate_bounds(path: &str, schema: &StructuralSchema, value: i64, errors: &mut Vec<SchemaError>) {
    if let Some(minimum) = schema.minimum {
        if value < minimum {
            errors.push(SchemaError::new(
                path,
                format!("value {value} is below minimum {minimum}"),
            ));
        }
    }
    if let Some(maximum) = schema.maximum {
        if value > maximum {
            errors.push(SchemaError::new(
                path,
                format!("value {value} exceeds maximum {maximum}"),
            ));
        }
    }
}

fn validate_enum(path: &str, schema: &StructuralSchema, value: &str, errors: &mut Vec<SchemaError>) {
    if !schema.enum_values.is_empty() && !schema.enum_values.iter().any(|v| v == value) {
        errors.push(SchemaError::new(
            path,
            format!(
                "value {value:?} is not one of [{}]",
                schema.enum_values.join(", ")
            ),
        ));
    }
}

fn push_type_error(path: &str, expected: &str, got: &RawDoc, errors: &mut Vec<SchemaError>) {
    errors.push(SchemaError::new(
        path,
        format!("expected {expected}, got {}", got.type_name()),
    ));
}

/// Fill `default=` values into absent leaves, preserving everything the
/// caller provided. Intermediate objects are created when a descendant
/// carries a default. Applying twice equals applying once.
pub fn apply_defaults_object(
    fields: &IndexMap<String, StructuralSchema>,
    values: &RawDoc,
) -> RawDoc {
    let mut out = match values.as_map() {
        Some(map) => map.clone(),
        None => IndexMap::new(),
    };

    for (name, schema) in fields {
        match out.get(name) {
            Some(existing) => {
                let filled = apply_defaults_node(schema, existing);
                out.insert(name.clone(), filled);
            }
            None => {
                if let Some(filled) = defaults_for_absent(schema) {
                    out.insert(name.clone(), filled);
                }
            }
        }
    }
    RawDoc::Map(out)
}

fn apply_defaults_node(schema: &StructuralSchema, value: &RawDoc) -> RawDoc {
    match &schema.structural_type {
        StructuralType::Object(fields) => apply_defaults_object(fields, value),
        StructuralType::Array(element) => match value {
            RawDoc::List(items) => RawDoc::List(
                items
                    .iter()
                    .map(|item| apply_defaults_node(element, item))
                    .collect(),
            ),
            other => other.clone(),
        },
        _ => value.clone(),
    }
}

/// The value an absent field materializes to, if any: its own default, or
/// an object assembled from descendant defaults.
fn defaults_for_absent(schema: &StructuralSchema) -> Option<RawDoc> {
    if let Some(default) = &schema.default {
        return Some(default.clone());
    }
    if let StructuralType::Object(fields) = &schema.structural_type {
        let mut out = IndexMap::new();
        for (name, child) in fields {
            if let Some(filled) = defaults_for_absent(child) {
                out.insert(name.clone(), filled);
            }
        }
        if !out.is_empty() {
            return Some(RawDoc::Map(out));
        }
    }
    None
}
