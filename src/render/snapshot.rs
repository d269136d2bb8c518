//! Release and snapshot materialization.
//!
//! Cutting a release freezes the exact component type, trait specs,
//! workload, and parameter values in use; every later render for any
//! environment starts from the frozen copy. Names carry a content
//! fingerprint so identical inputs reuse the same release.

use indexmap::IndexMap;

use crate::domain::meta::{Kind, ObjectMeta, ResourceRef};
use crate::domain::models::{
    Component, ComponentEnvSnapshot, ComponentEnvSnapshotSpec, ComponentRelease,
    ComponentReleaseSpec, ComponentType, ReleaseBinding, TraitDef, Workload,
};
use crate::domain::raw::RawDoc;
use crate::engine::hash_hex8;

use super::pipeline::RenderRequest;

/// Freeze the current rendering inputs into a release owned by the
/// component. The name is `<component>-<fingerprint>`; cutting twice from
/// identical inputs produces the same name.
pub fn cut_release(
    component: &Component,
    component_type: &ComponentType,
    traits: &IndexMap<String, TraitDef>,
    workload: &Workload,
) -> ComponentRelease {
    let spec = ComponentReleaseSpec {
        owner: ResourceRef::local(Kind::Component, component.meta.name.clone()),
        component_type: component_type.spec.clone(),
        traits: traits
            .iter()
            .map(|(name, def)| (name.clone(), def.spec.clone()))
            .collect(),
        workload: workload.spec.clone(),
        parameters: component.spec.parameters.clone(),
        trait_instances: component.spec.traits.clone(),
    };

    let fingerprint = release_fingerprint(&spec);
    let name = format!("{}-{fingerprint}", component.meta.name);
    let meta = match &component.meta.namespace {
        Some(namespace) => ObjectMeta::namespaced(namespace.clone(), name),
        None => ObjectMeta::cluster_scoped(name),
    };
    ComponentRelease::new(meta, spec)
}

/// Content fingerprint of a release spec: the stable hash of its wire
/// form.
pub fn release_fingerprint(spec: &ComponentReleaseSpec) -> String {
    let wire = serde_json::to_string(spec).unwrap_or_default();
    hash_hex8(&wire)
}

/// Capture the env-level overrides for one (binding, release) pair into an
/// immutable snapshot owned by the binding.
pub fn cut_env_snapshot(
    binding: &ReleaseBinding,
    release: &ComponentRelease,
    env_overrides: RawDoc,
) -> ComponentEnvSnapshot {
    let spec = ComponentEnvSnapshotSpec {
        component: binding.spec.owner.clone(),
        environment: binding.spec.environment.clone(),
        release_name: release.meta.name.clone(),
        env_overrides,
    };
    let wire = serde_json::to_string(&spec).unwrap_or_default();
    let name = format!("{}-{}", binding.meta.name, hash_hex8(&wire));
    let meta = match &binding.meta.namespace {
        Some(namespace) => ObjectMeta::namespaced(namespace.clone(), name),
        None => ObjectMeta::cluster_scoped(name),
    };
    ComponentEnvSnapshot::new(meta, spec)
}

/// Assemble a render request from a frozen release plus a snapshot's
/// environment overrides. Live objects are deliberately absent here:
/// bumping a component type has no retroactive effect on the release.
pub fn request_from_release<'a>(
    release: &'a ComponentRelease,
    environment: Option<&'a str>,
    env_overrides: &'a RawDoc,
) -> RenderRequest<'a> {
    RenderRequest {
        component: release.spec.owner.name.as_str(),
        project: release
            .meta
            .namespace
            .as_deref()
            .unwrap_or_default(),
        environment,
        component_type: &release.spec.component_type,
        traits: &release.spec.traits,
        trait_instances: &release.spec.trait_instances,
        workload: &release.spec.workload,
        parameters: &release.spec.parameters,
        env_overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        ComponentSpec, ComponentTypeSpec, ReleaseBindingSpec, WorkloadSpec,
    };

    fn component() -> Component {
        Component::new(
            ObjectMeta::namespaced("shop", "checkout"),
            ComponentSpec {
                owner: ResourceRef::local(Kind::Project, "shop"),
                component_type: "service/web-service".to_string(),
                parameters: serde_yaml::from_str("replicas: 2\n").unwrap(),
                traits: Vec::new(),
                build: None,
                auto_deploy: true,
            },
        )
    }

    fn component_type() -> ComponentType {
        ComponentType::new(
            ObjectMeta::namespaced("shop", "web-service"),
            ComponentTypeSpec {
                workload_type: "service".to_string(),
                schema: Default::default(),
                embedded_values: RawDoc::Null,
                embedded_traits: Vec::new(),
                allowed_traits: Vec::new(),
                validations: Vec::new(),
                resources: Vec::new(),
            },
        )
    }

    #[test]
    fn test_release_name_is_content_addressed() {
        let c = component();
        let ct = component_type();
        let traits = IndexMap::new();
        let workload = Workload::new(ObjectMeta::namespaced("shop", "checkout"), WorkloadSpec::default());

        let first = cut_release(&c, &ct, &traits, &workload);
        let second = cut_release(&c, &ct, &traits, &workload);
        assert_eq!(first.meta.name, second.meta.name);
        assert!(first.meta.name.starts_with("checkout-"));

        // Changing an input changes the name.
        let mut changed = c.clone();
        changed.spec.parameters = serde_yaml::from_str("replicas: 3\n").unwrap();
        let third = cut_release(&changed, &ct, &traits, &workload);
        assert_ne!(first.meta.name, third.meta.name);
    }

    #[test]
    fn test_release_freezes_type_spec() {
        let c = component();
        let mut ct = component_type();
        let traits = IndexMap::new();
        let workload = Workload::new(ObjectMeta::namespaced("shop", "checkout"), WorkloadSpec::default());

        let release = cut_release(&c, &ct, &traits, &workload);
        // Mutating the live type afterwards does not touch the release.
        ct.spec.workload_type = "task".to_string();
        assert_eq!(release.spec.component_type.workload_type, "service");
    }

    #[test]
    fn test_env_snapshot_references_release() {
        let c = component();
        let ct = component_type();
        let traits = IndexMap::new();
        let workload = Workload::new(ObjectMeta::namespaced("shop", "checkout"), WorkloadSpec::default());
        let release = cut_release(&c, &ct, &traits, &workload);

        let binding = ReleaseBinding::new(
            ObjectMeta::namespaced("shop", "checkout-dev"),
            ReleaseBindingSpec {
                owner: ResourceRef::local(Kind::Component, "checkout"),
                environment: "dev".to_string(),
                release_name: release.meta.name.clone(),
                overrides: RawDoc::Null,
                state: Default::default(),
            },
        );

        let snapshot = cut_env_snapshot(&binding, &release, RawDoc::Null);
        assert_eq!(snapshot.spec.release_name, release.meta.name);
        assert_eq!(snapshot.spec.environment, "dev");

        let req = request_from_release(&release, Some("dev"), &snapshot.spec.env_overrides);
        assert_eq!(req.component, "checkout");
        assert_eq!(req.environment, Some("dev"));
    }
}
