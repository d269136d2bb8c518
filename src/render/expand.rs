//! Resource template expansion: `forEach` iteration, `includeWhen`
//! gating, and template evaluation.

use crate::domain::models::ResourceTemplate;
use crate::domain::raw::RawDoc;
use crate::engine::{TemplateEngine, Value, VarScope};

use super::RenderError;

/// Plane a resource lands on when its template names none.
pub const DEFAULT_TARGET_PLANE: &str = "dataplane";

/// One rendered target-cluster resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResource {
    /// Template id this resource came from.
    pub id: String,
    /// Iteration index for `forEach` templates; stable across renders.
    pub index: Option<usize>,
    /// Plane family the resource targets.
    pub target_plane: String,
    /// The rendered resource body.
    pub resource: RawDoc,
}

/// Expand a template list against a variable scope.
pub fn expand_templates(
    engine: &TemplateEngine,
    templates: &[ResourceTemplate],
    vars: &VarScope,
) -> Result<Vec<RenderedResource>, RenderError> {
    let mut out = Vec::new();
    for template in templates {
        expand_one(engine, template, vars, &mut out)?;
    }
    Ok(out)
}

fn expand_one(
    engine: &TemplateEngine,
    template: &ResourceTemplate,
    vars: &VarScope,
    out: &mut Vec<RenderedResource>,
) -> Result<(), RenderError> {
    let target_plane = template
        .target_plane
        .clone()
        .unwrap_or_else(|| DEFAULT_TARGET_PLANE.to_string());

    match &template.for_each {
        Some(for_each) => {
            let Some(var) = &template.var else {
                return Err(RenderError::Invalid(format!(
                    "resource {:?}: forEach requires var",
                    template.id
                )));
            };
            let items = match engine.eval_expression(for_each, vars)? {
                Value::List(items) => items,
                other => {
                    return Err(RenderError::Invalid(format!(
                        "resource {:?}: forEach must evaluate to a list, got {}",
                        template.id,
                        other.type_name()
                    )));
                }
            };
            // An empty list expands to zero resources; that is not an error.
            for (index, item) in items.into_iter().enumerate() {
                let mut iteration_vars = vars.clone();
                iteration_vars.insert(var.clone(), item);
                if !include(engine, template, &iteration_vars)? {
                    continue;
                }
                let resource = engine.render(&template.template, &iteration_vars)?;
                out.push(RenderedResource {
                    id: template.id.clone(),
                    index: Some(index),
                    target_plane: target_plane.clone(),
                    resource,
                });
            }
        }
        None => {
            if !include(engine, template, vars)? {
                return Ok(());
            }
            let resource = engine.render(&template.template, vars)?;
            out.push(RenderedResource {
                id: template.id.clone(),
                index: None,
                target_plane,
                resource,
            });
        }
    }
    Ok(())
}

fn include(
    engine: &TemplateEngine,
    template: &ResourceTemplate,
    vars: &VarScope,
) -> Result<bool, RenderError> {
    let Some(condition) = &template.include_when else {
        return Ok(true);
    };
    let value = engine.eval_expression(condition, vars)?;
    match value {
        Value::Bool(include) => Ok(include),
        other => Err(RenderError::Invalid(format!(
            "resource {:?}: includeWhen must evaluate to a boolean, got {}",
            template.id,
            other.type_name()
        ))),
    }
}
