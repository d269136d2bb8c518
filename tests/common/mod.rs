//! Common test utilities for integration tests
//!
//! Shared fixtures used across the integration test files.

// Not every test file uses every fixture.
#![allow(dead_code)]

use formation::domain::meta::{Kind, ObjectMeta, ResourceRef};
use formation::domain::models::{
    AgentConnection, Component, ComponentSchema, ComponentSpec, ComponentType, ComponentTypeSpec,
    DataPlane, DataPlaneSpec, Environment, EnvironmentSpec, ResourceTemplate, ValidationRule,
    Workload, WorkloadSpec,
};
use formation::domain::raw::RawDoc;

/// Parse a YAML fixture into a document.
pub fn doc(yaml: &str) -> RawDoc {
    serde_yaml::from_str(yaml).expect("fixture yaml")
}

/// A data plane CR in the `infra` namespace.
pub fn data_plane(name: &str, plane_id: &str) -> DataPlane {
    DataPlane::new(
        ObjectMeta::namespaced("infra", name),
        DataPlaneSpec {
            plane_id: plane_id.to_string(),
            connection: AgentConnection {
                endpoint: "http://agent.invalid".to_string(),
                token_secret: None,
                ca_bundle: None,
            },
            observability_plane_ref: None,
        },
    )
}

/// An environment in the `shop` namespace pointing at a data plane in
/// `infra`.
pub fn environment(name: &str, data_plane_name: &str) -> Environment {
    Environment::new(
        ObjectMeta::namespaced("shop", name),
        EnvironmentSpec {
            data_plane_ref: ResourceRef {
                kind: Kind::DataPlane,
                name: data_plane_name.to_string(),
                namespace: Some("infra".to_string()),
            },
            is_production: false,
        },
    )
}

/// A service component type with one parameter, one override, a
/// validation rule, and two resource templates (the primary deployment
/// plus a per-endpoint service expansion).
pub fn service_component_type() -> ComponentType {
    ComponentType::new(
        ObjectMeta::namespaced("shop", "web-service"),
        ComponentTypeSpec {
            workload_type: "service".to_string(),
            schema: ComponentSchema {
                types: None,
                parameters: doc("replicas: integer | default=1 maximum=8\n"),
                env_overrides: doc("logLevel: string | default=info enum=debug,info,warn\n"),
            },
            embedded_values: RawDoc::Null,
            embedded_traits: Vec::new(),
            allowed_traits: Vec::new(),
            validations: vec![ValidationRule {
                rule: "parameters.replicas >= 1".to_string(),
                message: "replicas must be at least 1".to_string(),
            }],
            resources: vec![
                ResourceTemplate {
                    id: "service".to_string(),
                    target_plane: None,
                    include_when: None,
                    for_each: None,
                    var: None,
                    template: doc(concat!(
                        "kind: Deployment\n",
                        "metadata:\n",
                        "  name: ${component.name}\n",
                        "  namespace: ${component.project}\n",
                        "spec:\n",
                        "  replicas: ${parameters.replicas}\n",
                        "  logLevel: ${parameters.logLevel}\n",
                    )),
                },
                ResourceTemplate {
                    id: "endpoint-service".to_string(),
                    target_plane: None,
                    include_when: Some("ep.expose".to_string()),
                    for_each: Some("workload.endpoints".to_string()),
                    var: Some("ep".to_string()),
                    template: doc(concat!(
                        "kind: Service\n",
                        "metadata:\n",
                        "  name: ${component.name}-${ep.name}\n",
                        "port: ${ep.port}\n",
                    )),
                },
            ],
        },
    )
}

/// A component of the service type in the `shop` namespace.
pub fn component(name: &str) -> Component {
    Component::new(
        ObjectMeta::namespaced("shop", name),
        ComponentSpec {
            owner: ResourceRef::local(Kind::Project, "shop"),
            component_type: "service/web-service".to_string(),
            parameters: doc("replicas: 2\n"),
            traits: Vec::new(),
            build: None,
            auto_deploy: true,
        },
    )
}

/// A workload for the component with two endpoints, one exposed.
pub fn workload(name: &str) -> Workload {
    Workload::new(
        ObjectMeta::namespaced("shop", name),
        WorkloadSpec {
            owner: Some(ResourceRef::local(Kind::Component, name)),
            containers: doc("main:\n  image: ghcr.io/acme/checkout:v12\n"),
            endpoints: doc(concat!(
                "- name: http\n",
                "  port: 8080\n",
                "  expose: true\n",
                "- name: metrics\n",
                "  port: 9090\n",
                "  expose: false\n",
            )),
            connections: RawDoc::Null,
        },
    )
}
