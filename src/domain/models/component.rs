//! Component, ComponentType, Trait, and Workload resources.
//!
//! A component names its type as `{workload_type}/{type_name}`; the type
//! supplies the schema, embedded traits, validation rules, and resource
//! templates the rendering pipeline expands.

use serde::{Deserialize, Serialize};

use crate::domain::meta::{ObjectMeta, ResourceRef};
use crate::domain::raw::RawDoc;

use super::project::BasicStatus;

/// Workload type whose component types are exempt from the
/// one-resource-per-workload-type rule.
pub const PROXY_WORKLOAD_TYPE: &str = "proxy";

/// Parsed `{workload_type}/{type_name}` component type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Workload family: `service`, `task`, `proxy`, ...
    pub workload_type: String,
    /// ComponentType object name.
    pub name: String,
}

impl TypeRef {
    /// Parse the `workloadType/componentTypeName` shorthand.
    pub fn parse(raw: &str) -> Option<Self> {
        let (workload_type, name) = raw.split_once('/')?;
        if workload_type.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            workload_type: workload_type.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workload_type, self.name)
    }
}

/// One attachment of a trait to a component or component type.
///
/// `instance_name` distinguishes repeated attachments of the same trait and
/// must be unique across embedded and component-level instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitInstance {
    /// Name of the `TraitDef` being attached.
    pub name: String,
    /// Unique instance identifier.
    pub instance_name: String,
    /// Parameter values for this instance.
    #[serde(default)]
    pub parameters: RawDoc,
}

/// Build configuration carried by a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Source repository URL.
    #[serde(default)]
    pub repository: String,
    /// Branch built by default.
    #[serde(default)]
    pub branch: String,
    /// Path of the component inside the repository.
    #[serde(default)]
    pub app_path: String,
    /// Name of the workflow template driving the build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

/// Spec of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Owning project.
    pub owner: ResourceRef,
    /// `{workload_type}/{type_name}` reference.
    pub component_type: String,
    /// Developer-configurable parameter values.
    #[serde(default)]
    pub parameters: RawDoc,
    /// Developer-attached trait instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<TraitInstance>,
    /// Build configuration, when the platform builds this component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    /// Whether successful builds release automatically.
    #[serde(default)]
    pub auto_deploy: bool,
}

/// Component status beyond the standard block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Spec generation most recently reconciled.
    #[serde(default)]
    pub observed_generation: i64,
    /// Standard condition list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<crate::domain::meta::Condition>,
    /// Name of the most recently cut release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_release: Option<String>,
}

/// A deployable unit owned by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: ComponentSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ComponentStatus,
}

impl Component {
    /// New component with empty status.
    pub fn new(meta: ObjectMeta, spec: ComponentSpec) -> Self {
        Self {
            meta,
            spec,
            status: ComponentStatus::default(),
        }
    }

    /// Parsed component type reference, if well-formed.
    pub fn type_ref(&self) -> Option<TypeRef> {
        TypeRef::parse(&self.spec.component_type)
    }
}

/// A CEL validation rule evaluated against effective values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Expression that must evaluate to `true`.
    pub rule: String,
    /// Message surfaced verbatim when the rule fails.
    pub message: String,
}

/// One resource template inside a component type or trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// Template identity; stable across renders.
    pub id: String,
    /// Plane family the rendered resource lands on. Defaults to the data
    /// plane when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_plane: Option<String>,
    /// Expression gating the template; skipped when it yields `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_when: Option<String>,
    /// Expression yielding a list to iterate; requires `var`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,
    /// Loop variable bound to each `for_each` element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
    /// The resource body, with embedded `${...}` expressions.
    pub template: RawDoc,
}

/// Parameter and override schemas of a component type or trait.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSchema {
    /// Reusable named types addressed from leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<RawDoc>,
    /// Developer-facing parameter schema.
    #[serde(default)]
    pub parameters: RawDoc,
    /// Environment-override schema; top-level keys must be disjoint from
    /// `parameters`.
    #[serde(default)]
    pub env_overrides: RawDoc,
}

/// Spec of a component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTypeSpec {
    /// Workload family the type renders.
    pub workload_type: String,
    /// Parameter/override schemas.
    #[serde(default)]
    pub schema: ComponentSchema,
    /// Parameter values pinned by the platform engineer; layered between
    /// schema defaults and the component's own values.
    #[serde(default)]
    pub embedded_values: RawDoc,
    /// Trait instances pre-bound by the platform engineer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedded_traits: Vec<TraitInstance>,
    /// Traits a developer may attach; must not overlap the embedded set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_traits: Vec<String>,
    /// Validation rules evaluated against effective values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ValidationRule>,
    /// Resource templates expanded at render time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceTemplate>,
}

/// Platform-engineer template instantiated by components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentType {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: ComponentTypeSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl ComponentType {
    /// New component type with empty status.
    pub fn new(meta: ObjectMeta, spec: ComponentTypeSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}

/// Spec of a reusable trait.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitDefSpec {
    /// Parameter/override schemas contributed by the trait.
    #[serde(default)]
    pub schema: ComponentSchema,
    /// Resource templates contributed by the trait.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceTemplate>,
}

/// A reusable capability (schema + templates) composable onto components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDef {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: TraitDefSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl TraitDef {
    /// New trait with empty status.
    pub fn new(meta: ObjectMeta, spec: TraitDefSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}

/// Spec of a workload: what a build produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Owning component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ResourceRef>,
    /// Container definitions keyed by name.
    #[serde(default)]
    pub containers: RawDoc,
    /// Exposed endpoints keyed by name.
    #[serde(default)]
    pub endpoints: RawDoc,
    /// Outbound connections keyed by name.
    #[serde(default)]
    pub connections: RawDoc,
}

/// The container/endpoint/connection spec consumed by rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: WorkloadSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl Workload {
    /// New workload with empty status.
    pub fn new(meta: ObjectMeta, spec: WorkloadSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_parsing() {
        let parsed = TypeRef::parse("service/web-service").unwrap();
        assert_eq!(parsed.workload_type, "service");
        assert_eq!(parsed.name, "web-service");
        assert_eq!(parsed.to_string(), "service/web-service");

        assert!(TypeRef::parse("no-slash").is_none());
        assert!(TypeRef::parse("/missing-left").is_none());
        assert!(TypeRef::parse("missing-right/").is_none());
        assert!(TypeRef::parse("too/many/slashes").is_none());
    }
}
