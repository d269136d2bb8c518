//! Shorthand schema: inline `"type | attr=value"` declarations resolved to
//! a structural schema with typed defaults and path-qualified validation.

mod shorthand;
mod structural;
mod validate;

pub use shorthand::{ShorthandLeaf, TypeExpr};
pub use structural::{StructuralSchema, StructuralType};

use indexmap::IndexMap;
use thiserror::Error;

use crate::domain::raw::RawDoc;

/// A schema violation or parse failure, qualified by its dotted path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct SchemaError {
    /// Dotted path of the offending node.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl SchemaError {
    /// New error at a path.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A parsed, resolved schema ready to validate and default values.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: IndexMap<String, StructuralSchema>,
}

impl Schema {
    /// Schema with no declared fields; validates only empty objects.
    pub fn empty() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    /// Parse a schema document, resolving named types declared in `types`.
    /// `root` qualifies error paths (`parameters`, `envOverrides`, ...).
    pub fn parse(root: &str, doc: &RawDoc, types: Option<&RawDoc>) -> Result<Self, SchemaError> {
        if doc.is_null() {
            return Ok(Self::empty());
        }
        let table = structural::TypeTable::from_doc(types)?;
        let fields = structural::parse_document(root, doc, &table)?;
        Ok(Self { fields })
    }

    /// Declared top-level field names, in declaration order.
    pub fn top_level_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Whether the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate values, returning every violation path-qualified under
    /// `root`.
    pub fn validate(&self, root: &str, values: &RawDoc) -> Result<(), Vec<SchemaError>> {
        let mut errors = Vec::new();
        let empty = RawDoc::empty_map();
        let values = if values.is_null() { &empty } else { values };
        validate::validate_object(root, &self.fields, values, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill declared defaults into absent leaves, preserving provided
    /// values. Idempotent.
    pub fn apply_defaults(&self, values: &RawDoc) -> RawDoc {
        let empty = RawDoc::empty_map();
        let values = if values.is_null() { &empty } else { values };
        validate::apply_defaults_object(&self.fields, values)
    }

    /// Top-level keys shared with another schema; used for the
    /// parameters/envOverrides disjointness rule.
    pub fn overlapping_keys(&self, other: &Schema) -> Vec<String> {
        self.fields
            .keys()
            .filter(|k| other.fields.contains_key(*k))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> RawDoc {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_and_validate_end_to_end() {
        let schema = Schema::parse(
            "parameters",
            &doc("replicas: integer | default=1 maximum=10\nname: string | required=true\n"),
            None,
        )
        .unwrap();

        schema
            .validate("parameters", &doc("name: checkout\nreplicas: 3\n"))
            .unwrap();

        let errors = schema
            .validate("parameters", &doc("replicas: 99\n"))
            .unwrap_err();
        let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert!(rendered.iter().any(|e| e.contains("exceeds maximum")));
        assert!(rendered.iter().any(|e| e.contains("parameters.name")));
    }

    #[test]
    fn test_null_documents_are_empty_schemas() {
        let schema = Schema::parse("parameters", &RawDoc::Null, None).unwrap();
        assert!(schema.is_empty());
        schema.validate("parameters", &RawDoc::Null).unwrap();
    }

    #[test]
    fn test_overlapping_keys() {
        let params = Schema::parse("parameters", &doc("replicas: integer\nsize: string\n"), None)
            .unwrap();
        let overrides =
            Schema::parse("envOverrides", &doc("replicas: integer\n"), None).unwrap();
        assert_eq!(params.overlapping_keys(&overrides), vec!["replicas"]);
    }
}
