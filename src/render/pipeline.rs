//! The multi-stage rendering pipeline.
//!
//! Stages run in a fixed order: schema resolution, layered value merge,
//! validation-rule evaluation, resource expansion, sentinel cleanup, and
//! deterministic emission. Identical inputs produce identical output.

use indexmap::IndexMap;

use crate::domain::models::{
    ComponentTypeSpec, TraitDefSpec, TraitInstance, WorkloadSpec,
};
use crate::domain::raw::RawDoc;
use crate::engine::{TemplateEngine, Value, VarScope};
use crate::schema::Schema;

use super::expand::{expand_templates, RenderedResource};
use super::layers::merge_layers;
use super::RenderError;

/// Everything one render needs. Callers assemble this either from live
/// objects (when cutting a release) or from a frozen release snapshot.
pub struct RenderRequest<'a> {
    /// Component name, exposed to templates as `component.name`.
    pub component: &'a str,
    /// Owning project name, exposed as `component.project`.
    pub project: &'a str,
    /// Target environment name, exposed as `environment.name` when set.
    pub environment: Option<&'a str>,
    /// The component type driving the render.
    pub component_type: &'a ComponentTypeSpec,
    /// Trait definitions keyed by trait name, pre-resolved by the caller.
    pub traits: &'a IndexMap<String, TraitDefSpec>,
    /// Component-level trait instances.
    pub trait_instances: &'a [TraitInstance],
    /// The workload produced by the build.
    pub workload: &'a WorkloadSpec,
    /// Developer parameter values.
    pub parameters: &'a RawDoc,
    /// Environment-level override values.
    pub env_overrides: &'a RawDoc,
}

/// Deterministically ordered render output.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    /// Rendered resources: the primary workload resource first within its
    /// plane, the rest ordered by id then iteration index.
    pub resources: Vec<RenderedResource>,
}

/// Run the full pipeline.
pub fn render(engine: &TemplateEngine, req: &RenderRequest<'_>) -> Result<RenderOutput, RenderError> {
    // Stage 1: schema resolution, with the disjointness rule.
    let spec_schema = &req.component_type.schema;
    let types = spec_schema.types.as_ref();
    let params_schema = Schema::parse("parameters", &spec_schema.parameters, types)?;
    let overrides_schema = Schema::parse("envOverrides", &spec_schema.env_overrides, types)?;
    if let Some(key) = params_schema.overlapping_keys(&overrides_schema).first() {
        return Err(RenderError::Invalid(format!(
            "spec.schema.envOverrides.{key}: key collides with spec.schema.parameters.{key}"
        )));
    }

    // Stage 2: layered value merge, then validation of each namespace.
    let param_defaults = params_schema.apply_defaults(&RawDoc::empty_map());
    let merged_params = merge_layers(&[
        &param_defaults,
        &req.component_type.embedded_values,
        req.parameters,
    ]);
    params_schema.validate("parameters", &merged_params)?;

    let override_defaults = overrides_schema.apply_defaults(&RawDoc::empty_map());
    let merged_overrides = merge_layers(&[&override_defaults, req.env_overrides]);
    overrides_schema.validate("envOverrides", &merged_overrides)?;

    // Disjoint namespaces union into one effective value document, with
    // environment overrides applied last.
    let effective = merge_layers(&[&merged_params, &merged_overrides]);

    let base_vars = base_scope(req, &effective);

    // Stage 3: validation rules; the first failing rule's message is
    // surfaced verbatim.
    for validation in &req.component_type.validations {
        let verdict = engine.eval_expression(&validation.rule, &base_vars)?;
        match verdict {
            Value::Bool(true) => {}
            Value::Bool(false) => {
                return Err(RenderError::Invalid(validation.message.clone()));
            }
            other => {
                return Err(RenderError::Invalid(format!(
                    "validation rule must evaluate to a boolean, got {}",
                    other.type_name()
                )));
            }
        }
    }

    // Stage 4: resource expansion, component type first, then traits.
    let mut resources = expand_templates(engine, &req.component_type.resources, &base_vars)?;

    let embedded = &req.component_type.embedded_traits;
    for instance in embedded.iter().chain(req.trait_instances.iter()) {
        let Some(trait_spec) = req.traits.get(&instance.name) else {
            return Err(RenderError::Invalid(format!(
                "trait {:?} (instance {:?}) is not resolved",
                instance.name, instance.instance_name
            )));
        };
        let trait_vars = trait_scope(engine, &base_vars, instance, trait_spec)?;
        let mut trait_resources = expand_templates(engine, &trait_spec.resources, &trait_vars)?;
        resources.append(&mut trait_resources);
    }

    // Stages 5 and 6: sentinels were stripped during evaluation; order the
    // emission deterministically.
    let workload_type = &req.component_type.workload_type;
    resources.sort_by(|a, b| {
        let a_key = (&a.target_plane, a.id != *workload_type, &a.id, a.index);
        let b_key = (&b.target_plane, b.id != *workload_type, &b.id, b.index);
        a_key.cmp(&b_key)
    });

    Ok(RenderOutput { resources })
}

/// The variable scope component-type templates see.
fn base_scope(req: &RenderRequest<'_>, effective: &RawDoc) -> VarScope {
    let mut component = IndexMap::new();
    component.insert(
        "name".to_string(),
        Value::String(req.component.to_string()),
    );
    component.insert(
        "project".to_string(),
        Value::String(req.project.to_string()),
    );

    let mut workload = IndexMap::new();
    workload.insert(
        "containers".to_string(),
        Value::from(&req.workload.containers),
    );
    workload.insert(
        "endpoints".to_string(),
        Value::from(&req.workload.endpoints),
    );
    workload.insert(
        "connections".to_string(),
        Value::from(&req.workload.connections),
    );

    let mut vars = IndexMap::new();
    vars.insert("parameters".to_string(), Value::from(effective));
    vars.insert("component".to_string(), Value::Map(component));
    vars.insert("workload".to_string(), Value::Map(workload));
    if let Some(environment) = req.environment {
        let mut env = IndexMap::new();
        env.insert(
            "name".to_string(),
            Value::String(environment.to_string()),
        );
        vars.insert("environment".to_string(), Value::Map(env));
    }
    vars
}

/// The variable scope a trait instance's templates see: the trait's own
/// effective parameters replace the component's, and `instanceName` is
/// bound. Instance parameter strings may themselves be expressions over
/// the component scope (`${parameters.x}`), so they render first.
fn trait_scope(
    engine: &TemplateEngine,
    base_vars: &VarScope,
    instance: &TraitInstance,
    trait_spec: &TraitDefSpec,
) -> Result<VarScope, RenderError> {
    let bound_params = engine.render(&instance.parameters, base_vars)?;

    let types = trait_spec.schema.types.as_ref();
    let schema = Schema::parse("parameters", &trait_spec.schema.parameters, types)?;
    let defaults = schema.apply_defaults(&RawDoc::empty_map());
    let effective = merge_layers(&[&defaults, &bound_params]);
    schema.validate("parameters", &effective)?;

    let mut vars = base_vars.clone();
    vars.insert("parameters".to_string(), Value::from(&effective));
    vars.insert(
        "instanceName".to_string(),
        Value::String(instance.instance_name.clone()),
    );
    Ok(vars)
}
