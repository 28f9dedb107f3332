//! Finalizing rules: constructor binding and validation, plus determinism of
//! the whole discovery run.

use modelforge_conventions::build_model;
use modelforge_metadata::{
    ConfigurationSource, ConstructorBinding, HostCatalog, HostConstructor, HostMember,
    HostParameter, HostType, Model, ModelOptions, ParameterBinding,
};

fn model_of(types: Vec<HostType>, options: ModelOptions) -> Model {
    build_model(HostCatalog::new(types), &[], options)
}

fn constructor(parameters: &[(&str, &str)]) -> HostConstructor {
    HostConstructor::new(
        parameters
            .iter()
            .map(|(name, ty)| HostParameter::new(*name, *ty))
            .collect(),
    )
}

fn widget() -> HostType {
    HostType::new("Widget")
        .with_member(HostMember::scalar("Id", "int"))
        .with_member(HostMember::scalar("Name", "string"))
        .with_member(HostMember::scalar("Count", "int"))
        .with_member(HostMember::scalar("Token", "Guid?"))
}

fn property(name: &str) -> ParameterBinding {
    ParameterBinding::Property {
        property: name.to_string(),
    }
}

// ============================================================================
// Constructor binding
// ============================================================================

#[test]
fn parameterless_host_type_binds_the_implicit_constructor() {
    let model = model_of(vec![widget()], ModelOptions::default())
        .finalize_model()
        .unwrap();

    let binding = model.entity_type("Widget").unwrap().constructor.clone().unwrap();
    assert_eq!(binding.signature, "Widget()");
    assert!(binding.parameters.is_empty());
}

#[test]
fn parameters_bind_by_name_ignoring_case() {
    let model = model_of(
        vec![widget().with_constructor(constructor(&[("name", "string"), ("count", "int")]))],
        ModelOptions::default(),
    )
    .finalize_model()
    .unwrap();

    let binding = model.entity_type("Widget").unwrap().constructor.clone().unwrap();
    assert_eq!(binding.signature, "Widget(string, int)");
    assert_eq!(binding.parameters, vec![property("Name"), property("Count")]);
}

#[test]
fn field_style_parameter_names_bind() {
    let model = model_of(
        vec![widget().with_constructor(constructor(&[("_name", "string"), ("m_count", "int")]))],
        ModelOptions::default(),
    )
    .finalize_model()
    .unwrap();

    let binding = model.entity_type("Widget").unwrap().constructor.clone().unwrap();
    assert_eq!(binding.parameters, vec![property("Name"), property("Count")]);
}

#[test]
fn same_arity_constructors_conflict() {
    let model = model_of(
        vec![widget()
            .with_constructor(constructor(&[("name", "string"), ("count", "int")]))
            .with_constructor(constructor(&[("name", "string"), ("token", "Guid?")]))],
        ModelOptions::default(),
    );

    let err = model.finalize_model().unwrap_err();
    let problems = err.problems_for("Widget");
    assert!(problems.iter().any(|p| {
        p.contains("Widget(string, int)")
            && p.contains("Widget(string, Guid?)")
            && p.contains("both bind equally well")
    }));
}

#[test]
fn explicit_binding_bypasses_the_search() {
    let mut model = model_of(
        vec![widget()
            .with_constructor(constructor(&[("name", "string"), ("count", "int")]))
            .with_constructor(constructor(&[("name", "string"), ("token", "Guid?")]))],
        ModelOptions::default(),
    );
    let widget = model.find_entity_type("Widget").unwrap();
    let binding = ConstructorBinding {
        signature: "Widget(string, Guid?)".to_string(),
        parameters: vec![property("Name"), property("Token")],
    };
    assert!(model.set_constructor_binding(
        widget,
        Some(binding.clone()),
        ConfigurationSource::Explicit
    ));

    let finalized = model.finalize_model().unwrap();
    assert_eq!(finalized.entity_type("Widget").unwrap().constructor, Some(binding));
}

#[test]
fn fewer_services_win_over_arity() {
    let model = model_of(
        vec![widget()
            .with_constructor(constructor(&[("name", "string"), ("loader", "ILazyLoader")]))
            .with_constructor(constructor(&[("name", "string"), ("count", "int")]))],
        ModelOptions::default(),
    )
    .finalize_model()
    .unwrap();

    let binding = model.entity_type("Widget").unwrap().constructor.clone().unwrap();
    assert_eq!(binding.signature, "Widget(string, int)");
}

#[test]
fn registered_services_bind() {
    let model = model_of(
        vec![widget().with_constructor(constructor(&[("clock", "IClock"), ("name", "string")]))],
        ModelOptions::default().with_service("IClock"),
    )
    .finalize_model()
    .unwrap();

    let binding = model.entity_type("Widget").unwrap().constructor.clone().unwrap();
    assert_eq!(
        binding.parameters,
        vec![
            ParameterBinding::Service {
                service: "IClock".to_string()
            },
            property("Name"),
        ]
    );
}

#[test]
fn unbindable_paths_are_listed() {
    let model = model_of(
        vec![widget()
            .with_constructor(constructor(&[("payload", "Stream")]))
            .with_constructor(constructor(&[("name", "string"), ("size", "long")]))],
        ModelOptions::default(),
    );

    let err = model.finalize_model().unwrap_err();
    let problems = err.problems_for("Widget");
    let message = problems
        .iter()
        .find(|p| p.starts_with("no usable constructor"))
        .unwrap();
    assert!(message.contains("`payload` (Stream)"));
    assert!(message.contains("`size` (long)"));
}

// ============================================================================
// Validation and determinism
// ============================================================================

#[test]
fn all_problems_for_a_type_are_reported_together() {
    let model = model_of(
        vec![HostType::new("Orphan")
            .with_member(HostMember::scalar("Name", "string"))
            .with_constructor(constructor(&[("payload", "Stream")]))],
        ModelOptions::default(),
    );

    let err = model.finalize_model().unwrap_err();
    let problems = err.problems_for("Orphan");
    assert!(problems.iter().any(|p| p.contains("no primary key")));
    assert!(problems.iter().any(|p| p.contains("no usable constructor")));
    assert!(err.to_string().contains("Orphan"));
}

fn shop() -> Vec<HostType> {
    vec![
        HostType::new("Customer")
            .with_member(HostMember::scalar("Id", "int"))
            .with_member(HostMember::collection("Orders", "Order")),
        HostType::new("Order")
            .with_member(HostMember::scalar("Id", "int"))
            .with_member(HostMember::scalar("CustomerId", "int"))
            .with_member(HostMember::reference("Customer", "Customer"))
            .with_member(HostMember::collection("Products", "Product")),
        HostType::new("Product")
            .with_member(HostMember::scalar("ProductId", "Guid"))
            .with_member(HostMember::collection("Orders", "Order")),
    ]
}

#[test]
fn discovery_is_deterministic() {
    let first = model_of(shop(), ModelOptions::default())
        .finalize_model()
        .unwrap()
        .to_json_pretty()
        .unwrap();
    let second = model_of(shop(), ModelOptions::default())
        .finalize_model()
        .unwrap()
        .to_json_pretty()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn re_adding_entity_types_changes_nothing() {
    let mut model = model_of(shop(), ModelOptions::default());
    let before = model.snapshot();

    for name in ["Customer", "Order", "Product"] {
        model.add_entity_type(name, Some(name), ConfigurationSource::Convention);
    }

    assert_eq!(model.snapshot(), before);
}

#[test]
fn join_type_for_mixed_key_types() {
    let model = model_of(shop(), ModelOptions::default())
        .finalize_model()
        .unwrap();

    let join = model.entity_type("OrderProduct").unwrap();
    assert_eq!(
        join.primary_key,
        Some(vec!["OrderId".to_string(), "ProductProductId".to_string()])
    );
    let product = join.foreign_key_to("Product").unwrap();
    assert_eq!(product.principal_key, vec!["ProductId"]);
}
