//! Validating admission for the mutable kinds the control plane owns.
//!
//! Each entry point receives the old object (absent on create) and the
//! new one, and returns an ordered list of errors with JSON paths. An
//! empty list admits the object.

use std::collections::HashSet;

use thiserror::Error;

use crate::domain::models::{
    Component, ComponentType, ReleaseBinding, ResourceTemplate, TraitDef, TypeRef, WorkflowRun,
    PROXY_WORKLOAD_TYPE,
};
use crate::domain::raw::RawDoc;
use crate::engine::{TemplateEngine, Value, VarScope};
use crate::schema::Schema;

/// One admission failure, qualified by the JSON path of the offending
/// field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct AdmissionError {
    /// JSON path, e.g. `spec.schema.envOverrides.replicas`.
    pub path: String,
    /// What is wrong.
    pub message: String,
}

impl AdmissionError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validate a component type document.
pub fn validate_component_type(
    engine: &TemplateEngine,
    _old: Option<&ComponentType>,
    new: &ComponentType,
) -> Vec<AdmissionError> {
    let mut errors = Vec::new();
    let spec = &new.spec;
    let types = spec.schema.types.as_ref();

    // Schema well-formedness.
    let params_schema = match Schema::parse("parameters", &spec.schema.parameters, types) {
        Ok(schema) => Some(schema),
        Err(err) => {
            errors.push(AdmissionError::new(
                format!("spec.schema.{}", err.path),
                err.message,
            ));
            None
        }
    };
    let overrides_schema = match Schema::parse("envOverrides", &spec.schema.env_overrides, types) {
        Ok(schema) => Some(schema),
        Err(err) => {
            errors.push(AdmissionError::new(
                format!("spec.schema.{}", err.path),
                err.message,
            ));
            None
        }
    };

    // Parameters and envOverrides must not share top-level keys.
    if let (Some(params), Some(overrides)) = (&params_schema, &overrides_schema) {
        for key in params.overlapping_keys(overrides) {
            errors.push(AdmissionError::new(
                format!("spec.schema.envOverrides.{key}"),
                format!("key {key:?} collides with spec.schema.parameters.{key}"),
            ));
        }
    }

    // Validation rules must compile against schema-shaped variables.
    let compile_scope = schema_scope(params_schema.as_ref(), overrides_schema.as_ref());
    for (i, validation) in spec.validations.iter().enumerate() {
        if let Err(err) = engine.compile_expression(&validation.rule, &compile_scope) {
            errors.push(AdmissionError::new(
                format!("spec.validations[{i}].rule"),
                err.to_string(),
            ));
        }
    }

    // Embedded trait instance names are unique.
    let mut seen = HashSet::new();
    for (i, instance) in spec.embedded_traits.iter().enumerate() {
        if !seen.insert(instance.instance_name.clone()) {
            errors.push(AdmissionError::new(
                format!("spec.embeddedTraits[{i}].instanceName"),
                format!("duplicate instance name {:?}", instance.instance_name),
            ));
        }
    }

    // Allowed traits must not repeat embedded traits.
    let embedded_names: HashSet<&str> = spec
        .embedded_traits
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    for (i, allowed) in spec.allowed_traits.iter().enumerate() {
        if embedded_names.contains(allowed.as_str()) {
            errors.push(AdmissionError::new(
                format!("spec.allowedTraits[{i}]"),
                format!("trait {allowed:?} is already embedded"),
            ));
        }
    }

    // Resource template invariants.
    let primaries = spec
        .resources
        .iter()
        .filter(|r| r.id == spec.workload_type)
        .count();
    if spec.workload_type != PROXY_WORKLOAD_TYPE && primaries != 1 {
        errors.push(AdmissionError::new(
            "spec.resources",
            format!(
                "expected exactly one resource with id {:?}, found {primaries}",
                spec.workload_type
            ),
        ));
    }
    validate_templates(
        engine,
        &compile_scope,
        &spec.resources,
        "spec.resources",
        &mut errors,
    );

    errors
}

/// Validate a trait document.
pub fn validate_trait(engine: &TemplateEngine, new: &TraitDef) -> Vec<AdmissionError> {
    let mut errors = Vec::new();
    let types = new.spec.schema.types.as_ref();

    let schema = match Schema::parse("parameters", &new.spec.schema.parameters, types) {
        Ok(schema) => Some(schema),
        Err(err) => {
            errors.push(AdmissionError::new(
                format!("spec.schema.{}", err.path),
                err.message,
            ));
            None
        }
    };

    let compile_scope = schema_scope(schema.as_ref(), None);
    validate_templates(
        engine,
        &compile_scope,
        &new.spec.resources,
        "spec.resources",
        &mut errors,
    );
    errors
}

/// Validate a component document.
pub fn validate_component(_old: Option<&Component>, new: &Component) -> Vec<AdmissionError> {
    let mut errors = Vec::new();
    if TypeRef::parse(&new.spec.component_type).is_none() {
        errors.push(AdmissionError::new(
            "spec.componentType",
            format!(
                "{:?} is not of the form workloadType/componentTypeName",
                new.spec.component_type
            ),
        ));
    }
    let mut seen = HashSet::new();
    for (i, instance) in new.spec.traits.iter().enumerate() {
        if !seen.insert(instance.instance_name.clone()) {
            errors.push(AdmissionError::new(
                format!("spec.traits[{i}].instanceName"),
                format!("duplicate instance name {:?}", instance.instance_name),
            ));
        }
    }
    errors
}

/// Validate a binding document. `owner` and `environment` are immutable
/// after creation, and at most one binding exists per pair (the caller
/// supplies any sibling bindings of the same component).
pub fn validate_binding(
    old: Option<&ReleaseBinding>,
    new: &ReleaseBinding,
    siblings: &[ReleaseBinding],
) -> Vec<AdmissionError> {
    let mut errors = Vec::new();
    if let Some(old) = old {
        if old.spec.owner != new.spec.owner {
            errors.push(AdmissionError::new(
                "spec.owner",
                "owner is immutable after creation",
            ));
        }
        if old.spec.environment != new.spec.environment {
            errors.push(AdmissionError::new(
                "spec.environment",
                "environment is immutable after creation",
            ));
        }
    }
    for sibling in siblings {
        if sibling.meta.name != new.meta.name
            && sibling.spec.owner == new.spec.owner
            && sibling.spec.environment == new.spec.environment
        {
            errors.push(AdmissionError::new(
                "spec.environment",
                format!(
                    "binding {:?} already targets ({}, {})",
                    sibling.meta.name, new.spec.owner.name, new.spec.environment
                ),
            ));
        }
    }
    errors
}

/// Fields of the legacy flat workflow-run shape; documents carrying them
/// are rejected rather than interpreted.
const LEGACY_RUN_FIELDS: &[&str] = &["repositoryUrl", "branch", "appPath", "taskTemplates"];

/// Validate a workflow run, including the raw document form so legacy
/// flat-shaped payloads are rejected with a precise path.
pub fn validate_workflow_run(new: &WorkflowRun, raw_spec: Option<&RawDoc>) -> Vec<AdmissionError> {
    let mut errors = Vec::new();

    if let Some(spec) = raw_spec.and_then(RawDoc::as_map) {
        for field in LEGACY_RUN_FIELDS {
            if spec.contains_key(*field) {
                errors.push(AdmissionError::new(
                    format!("spec.{field}"),
                    "legacy workflow-run shape is not supported; use workflowRef + parameters + systemParameters",
                ));
            }
        }
    }

    if new.spec.component.is_some() {
        match &new.spec.system_parameters {
            None => errors.push(AdmissionError::new(
                "spec.systemParameters",
                "required for component workflow runs",
            )),
            Some(system) => {
                if let Err(path) = system.validate() {
                    errors.push(AdmissionError::new(
                        format!("spec.{path}"),
                        "required field is missing",
                    ));
                }
            }
        }
    }
    errors
}

/// A compile-time variable scope shaped like the schemas: defaults
/// applied to empty values, so expressions can be type-checked without a
/// live object.
fn schema_scope(parameters: Option<&Schema>, overrides: Option<&Schema>) -> VarScope {
    let mut effective = RawDoc::empty_map();
    if let Some(schema) = parameters {
        effective = effective.merged(&schema.apply_defaults(&RawDoc::empty_map()));
    }
    if let Some(schema) = overrides {
        effective = effective.merged(&schema.apply_defaults(&RawDoc::empty_map()));
    }
    let mut scope = VarScope::new();
    scope.insert("parameters".to_string(), Value::from(&effective));
    scope
}

fn validate_templates(
    engine: &TemplateEngine,
    scope: &VarScope,
    templates: &[ResourceTemplate],
    base_path: &str,
    errors: &mut Vec<AdmissionError>,
) {
    for (i, template) in templates.iter().enumerate() {
        if template.for_each.is_some() && template.var.is_none() {
            errors.push(AdmissionError::new(
                format!("{base_path}[{i}].var"),
                "forEach requires var",
            ));
        }
        for (field, expr) in [
            ("includeWhen", template.include_when.as_deref()),
            ("forEach", template.for_each.as_deref()),
        ] {
            if let Some(expr) = expr {
                if let Err(err) = engine.compile_expression(expr, scope) {
                    // Missing data is fine at admission; only syntax and
                    // type failures reject.
                    if !err.is_missing_data() {
                        errors.push(AdmissionError::new(
                            format!("{base_path}[{i}].{field}"),
                            err.to_string(),
                        ));
                    }
                }
            }
        }
        compile_template_strings(
            engine,
            scope,
            &template.template,
            &format!("{base_path}[{i}].template"),
            errors,
        );
    }
}

/// Walk a template document and compile every embedded expression.
fn compile_template_strings(
    engine: &TemplateEngine,
    scope: &VarScope,
    doc: &RawDoc,
    path: &str,
    errors: &mut Vec<AdmissionError>,
) {
    match doc {
        RawDoc::String(_) => {
            if let Err(err) = engine.compile_template(doc, scope) {
                if !err.is_missing_data() {
                    errors.push(AdmissionError::new(path, err.to_string()));
                }
            }
        }
        RawDoc::List(items) => {
            for (i, item) in items.iter().enumerate() {
                compile_template_strings(engine, scope, item, &format!("{path}[{i}]"), errors);
            }
        }
        RawDoc::Map(entries) => {
            for (key, value) in entries {
                let key_doc = RawDoc::String(key.clone());
                if let Err(err) = engine.compile_template(&key_doc, scope) {
                    if !err.is_missing_data() {
                        errors.push(AdmissionError::new(
                            format!("{path}.{key}"),
                            err.to_string(),
                        ));
                    }
                }
                compile_template_strings(engine, scope, value, &format!("{path}.{key}"), errors);
            }
        }
        _ => {}
    }
}
