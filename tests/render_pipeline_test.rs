//! Rendering pipeline end-to-end: layering, expansion, ordering, and
//! release immutability.

mod common;

use indexmap::IndexMap;

use formation::domain::raw::RawDoc;
use formation::engine::TemplateEngine;
use formation::render::{cut_release, render, request_from_release, RenderRequest};

use common::{component, doc, service_component_type, workload};

fn request<'a>(
    component_type: &'a formation::domain::models::ComponentTypeSpec,
    traits: &'a IndexMap<String, formation::domain::models::TraitDefSpec>,
    workload_spec: &'a formation::domain::models::WorkloadSpec,
    parameters: &'a RawDoc,
    env_overrides: &'a RawDoc,
) -> RenderRequest<'a> {
    RenderRequest {
        component: "checkout",
        project: "shop",
        environment: Some("dev"),
        component_type,
        traits,
        trait_instances: &[],
        workload: workload_spec,
        parameters,
        env_overrides,
    }
}

#[test]
fn renders_primary_first_then_for_each_in_input_order() {
    let engine = TemplateEngine::new();
    let ct = service_component_type();
    let traits = IndexMap::new();
    let wl = workload("checkout");
    let params = doc("replicas: 3\n");
    let overrides = doc("logLevel: debug\n");

    let output = render(
        &engine,
        &request(&ct.spec, &traits, &wl.spec, &params, &overrides),
    )
    .unwrap();

    // The unexposed endpoint is skipped by includeWhen; output is the
    // primary resource then the expanded service.
    assert_eq!(output.resources.len(), 2);
    assert_eq!(output.resources[0].id, "service");
    assert_eq!(output.resources[1].id, "endpoint-service");
    assert_eq!(output.resources[1].index, Some(0));

    let deployment = &output.resources[0].resource;
    assert_eq!(deployment.lookup("spec.replicas"), Some(&RawDoc::Int(3)));
    assert_eq!(
        deployment.lookup("spec.logLevel"),
        Some(&RawDoc::String("debug".into()))
    );
    assert_eq!(
        deployment.lookup("metadata.name"),
        Some(&RawDoc::String("checkout".into()))
    );

    let service = &output.resources[1].resource;
    assert_eq!(
        service.lookup("metadata.name"),
        Some(&RawDoc::String("checkout-http".into()))
    );
    assert_eq!(service.lookup("port"), Some(&RawDoc::Int(8080)));
    assert_eq!(output.resources[1].target_plane, "dataplane");
}

#[test]
fn env_overrides_win_over_parameters_and_defaults() {
    let engine = TemplateEngine::new();
    let ct = service_component_type();
    let traits = IndexMap::new();
    let wl = workload("checkout");

    // No explicit logLevel anywhere: default applies.
    let params = doc("replicas: 2\n");
    let output = render(
        &engine,
        &request(&ct.spec, &traits, &wl.spec, &params, &RawDoc::Null),
    )
    .unwrap();
    assert_eq!(
        output.resources[0].resource.lookup("spec.logLevel"),
        Some(&RawDoc::String("info".into()))
    );

    // Env override replaces the default.
    let overrides = doc("logLevel: warn\n");
    let output = render(
        &engine,
        &request(&ct.spec, &traits, &wl.spec, &params, &overrides),
    )
    .unwrap();
    assert_eq!(
        output.resources[0].resource.lookup("spec.logLevel"),
        Some(&RawDoc::String("warn".into()))
    );
}

#[test]
fn for_each_over_empty_list_is_not_an_error() {
    let engine = TemplateEngine::new();
    let ct = service_component_type();
    let traits = IndexMap::new();
    let mut wl = workload("checkout").spec;
    wl.endpoints = doc("[]\n");
    let params = doc("replicas: 1\n");

    let output = render(
        &engine,
        &request(&ct.spec, &traits, &wl, &params, &RawDoc::Null),
    )
    .unwrap();
    assert_eq!(output.resources.len(), 1);
    assert_eq!(output.resources[0].id, "service");
}

#[test]
fn validation_failure_surfaces_message_verbatim() {
    let engine = TemplateEngine::new();
    let mut ct = service_component_type();
    ct.spec.validations[0].rule = "parameters.replicas >= 2".to_string();
    ct.spec.validations[0].message = "need at least two replicas in this type".to_string();
    let traits = IndexMap::new();
    let wl = workload("checkout");
    let params = doc("replicas: 1\n");

    let err = render(
        &engine,
        &request(&ct.spec, &traits, &wl.spec, &params, &RawDoc::Null),
    )
    .unwrap_err();
    assert!(err
        .to_string()
        .contains("need at least two replicas in this type"));
}

#[test]
fn release_freezes_inputs_against_later_type_edits() {
    let engine = TemplateEngine::new();
    let c = component("checkout");
    let mut ct = service_component_type();
    let traits = IndexMap::new();
    let wl = workload("checkout");
    let no_overrides = RawDoc::Null;

    let release = cut_release(&c, &ct, &traits, &wl);

    // Bump the live type after the release was cut.
    ct.spec.resources[0].template = doc("kind: Deployment\nsabotaged: true\n");

    let request = request_from_release(&release, Some("dev"), &no_overrides);
    let output = render(&engine, &request).unwrap();
    // The frozen template is untouched by the live edit.
    assert!(output.resources[0].resource.lookup("sabotaged").is_none());
    assert_eq!(
        output.resources[0].resource.lookup("metadata.name"),
        Some(&RawDoc::String("checkout".into()))
    );
}

#[test]
fn identical_inputs_render_identically() {
    let engine = TemplateEngine::new();
    let c = component("checkout");
    let ct = service_component_type();
    let traits = IndexMap::new();
    let wl = workload("checkout");

    let release_a = cut_release(&c, &ct, &traits, &wl);
    let release_b = cut_release(&c, &ct, &traits, &wl);
    assert_eq!(release_a.meta.name, release_b.meta.name);

    let overrides = doc("logLevel: warn\n");
    let out_a = render(
        &engine,
        &request_from_release(&release_a, Some("dev"), &overrides),
    )
    .unwrap();
    let out_b = render(
        &engine,
        &request_from_release(&release_b, Some("dev"), &overrides),
    )
    .unwrap();

    let wire_a: Vec<String> = out_a
        .resources
        .iter()
        .map(|r| serde_json::to_string(&r.resource).unwrap())
        .collect();
    let wire_b: Vec<String> = out_b
        .resources
        .iter()
        .map(|r| serde_json::to_string(&r.resource).unwrap())
        .collect();
    assert_eq!(wire_a, wire_b);
}
