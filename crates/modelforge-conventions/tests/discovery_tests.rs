//! Entity types, properties, keys and base types grown from host catalogs by
//! the default convention set.

use modelforge_conventions::{build_model, default_convention_set};
use modelforge_metadata::{
    codes, ConfigurationSource, HostCatalog, HostMember, HostType, MemberMarker, Model,
    ModelOptions, TypeMarker, ValueGenerated,
};

const EXPLICIT: ConfigurationSource = ConfigurationSource::Explicit;
const CONVENTION: ConfigurationSource = ConfigurationSource::Convention;

fn model_of(types: Vec<HostType>) -> Model {
    build_model(HostCatalog::new(types), &[], ModelOptions::default())
}

fn entity(name: &str) -> HostType {
    HostType::new(name).with_member(HostMember::scalar("Id", "int"))
}

// ============================================================================
// Properties and keys
// ============================================================================

#[test]
fn scalar_members_become_properties_and_id_becomes_the_key() {
    let model = model_of(vec![entity("Blog")
        .with_member(HostMember::scalar("Title", "string"))
        .with_member(HostMember::scalar("Rating", "int?"))]);

    let blog = model.snapshot();
    let blog = blog.entity_type("Blog").unwrap();
    assert_eq!(blog.primary_key, Some(vec!["Id".to_string()]));
    assert!(!blog.property("Title").unwrap().nullable);
    assert!(blog.property("Rating").unwrap().nullable);
    assert_eq!(
        blog.property("Id").unwrap().value_generated,
        ValueGenerated::OnAdd
    );
    assert_eq!(
        blog.property("Rating").unwrap().value_generated,
        ValueGenerated::Never
    );
}

#[test]
fn type_named_id_is_the_fallback_key() {
    let model = model_of(vec![HostType::new("Product")
        .with_member(HostMember::scalar("ProductId", "Guid"))
        .with_member(HostMember::scalar("Name", "string"))]);

    let product = model.snapshot();
    let product = product.entity_type("Product").unwrap();
    assert_eq!(product.primary_key, Some(vec!["ProductId".to_string()]));
    assert_eq!(
        product.property("ProductId").unwrap().value_generated,
        ValueGenerated::OnAdd
    );
}

#[test]
fn plain_id_wins_over_type_named_id() {
    let model = model_of(vec![entity("Order").with_member(HostMember::scalar("OrderId", "int"))]);

    let snapshot = model.snapshot();
    assert_eq!(
        snapshot.entity_type("Order").unwrap().primary_key,
        Some(vec!["Id".to_string()])
    );
}

#[test]
fn several_candidates_leave_the_type_unkeyed() {
    let model = model_of(vec![HostType::new("Widget")
        .with_member(HostMember::scalar("Id", "int"))
        .with_member(HostMember::scalar("ID", "int"))]);

    assert!(model
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::MULTIPLE_KEY_CANDIDATES));
    let err = model.finalize_model().unwrap_err();
    assert!(err
        .problems_for("Widget")
        .iter()
        .any(|p| p.contains("no primary key")));
}

#[test]
fn explicit_key_is_kept_when_an_id_shows_up() {
    let catalog = HostCatalog::new(vec![HostType::new("Account")
        .with_member(HostMember::scalar("Code", "string"))
        .with_member(HostMember::scalar("Id", "int"))]);
    let mut model = Model::with_conventions(catalog, default_convention_set(), ModelOptions::default());
    let account = model.add_entity_type("Account", Some("Account"), EXPLICIT).unwrap();
    let code = model.find_property(account.into(), "Code").unwrap();
    model.set_primary_key(account, &[code], EXPLICIT).unwrap();

    let snapshot = model.snapshot();
    assert_eq!(
        snapshot.entity_type("Account").unwrap().primary_key,
        Some(vec!["Code".to_string()])
    );
}

#[test]
fn complex_and_not_mapped_types_are_not_entities() {
    let model = model_of(vec![
        entity("Customer").with_member(HostMember::reference("Audit", "AuditInfo")),
        HostType::new("Address")
            .with_marker(TypeMarker::Complex)
            .with_member(HostMember::scalar("Street", "string")),
        HostType::new("AuditInfo")
            .with_marker(TypeMarker::NotMapped)
            .with_member(HostMember::scalar("Id", "int")),
    ]);

    assert!(model.find_entity_type("Customer").is_some());
    assert!(model.find_entity_type("Address").is_none());
    assert!(model.find_entity_type("AuditInfo").is_none());
    assert!(model.is_ignored("AuditInfo").is_some());
}

// ============================================================================
// Base types
// ============================================================================

fn hierarchy() -> HostCatalog {
    HostCatalog::new(vec![
        entity("A"),
        HostType::new("B")
            .with_base("A")
            .with_member(HostMember::scalar("Name", "string")),
        HostType::new("C")
            .with_base("B")
            .with_member(HostMember::scalar("Extra", "int")),
    ])
}

#[test]
fn derived_type_added_first_is_reparented_onto_the_nearest_ancestor() {
    let roots: Vec<String> = ["C", "A", "B"].iter().map(|s| s.to_string()).collect();
    let model = build_model(hierarchy(), &roots, ModelOptions::default());

    let c = model.find_entity_type("C").unwrap();
    let b = model.find_entity_type("B").unwrap();
    let a = model.find_entity_type("A").unwrap();
    assert_eq!(model.entity_type(c).unwrap().base_type(), Some(b));
    assert_eq!(model.entity_type(b).unwrap().base_type(), Some(a));
    assert_eq!(model.root_type(c), a);
    assert!(model.entity_type(c).unwrap().keys.is_empty());
    assert_eq!(model.primary_key(c), model.primary_key(a));
    assert_eq!(model.property_names(&model.primary_key_properties(a)), vec!["Id"]);
}

#[test]
fn removing_the_middle_type_reparents_onto_its_base() {
    let roots: Vec<String> = ["C", "A", "B"].iter().map(|s| s.to_string()).collect();
    let mut model = build_model(hierarchy(), &roots, ModelOptions::default());
    let a = model.find_entity_type("A").unwrap();
    let b = model.find_entity_type("B").unwrap();
    let c = model.find_entity_type("C").unwrap();

    assert!(model.remove_entity_type(b, EXPLICIT));

    assert_eq!(model.entity_type(c).unwrap().base_type(), Some(a));
    assert!(model.find_entity_type("B").is_none());
}

#[test]
fn not_mapped_base_is_skipped() {
    let model = model_of(vec![
        HostType::new("Tracked")
            .with_marker(TypeMarker::NotMapped)
            .with_member(HostMember::scalar("Created", "DateTime")),
        HostType::new("Invoice")
            .with_base("Tracked")
            .with_member(HostMember::scalar("Id", "int")),
    ]);

    let snapshot = model.snapshot();
    let invoice = snapshot.entity_type("Invoice").unwrap();
    assert_eq!(invoice.base_type, None);
    assert!(invoice.property("Created").is_some());
}

#[test]
fn convention_entity_type_can_be_replaced_explicitly() {
    let mut model = model_of(vec![entity("Note")]);
    let note = model.find_entity_type("Note").unwrap();
    assert_eq!(model.entity_type(note).unwrap().source, CONVENTION);

    assert!(model.remove_entity_type(note, EXPLICIT));
    model.ignore_entity_type("Note", EXPLICIT);
    assert!(model.find_entity_type("Note").is_none());
}

// ============================================================================
// Markers
// ============================================================================

#[test]
fn member_markers_configure_properties() {
    let model = model_of(vec![HostType::new("Customer")
        .with_member(HostMember::scalar("Code", "string").with_marker(MemberMarker::Key))
        .with_member(HostMember::scalar("Nickname", "string?").with_marker(MemberMarker::Required))
        .with_member(HostMember::scalar("Cache", "string").with_marker(MemberMarker::NotMapped))
        .with_member(
            HostMember::scalar("Version", "long").with_marker(MemberMarker::DatabaseGenerated {
                option: ValueGenerated::OnAddOrUpdate,
            }),
        )]);

    let snapshot = model.snapshot();
    let customer = snapshot.entity_type("Customer").unwrap();
    assert_eq!(customer.primary_key, Some(vec!["Code".to_string()]));
    assert!(!customer.property("Nickname").unwrap().nullable);
    assert!(customer.property("Cache").is_none());
    assert_eq!(
        customer.property("Version").unwrap().value_generated,
        ValueGenerated::OnAddOrUpdate
    );
}

#[test]
fn type_markers_declare_composite_keys_and_indexes() {
    let model = model_of(vec![HostType::new("Seat")
        .with_member(HostMember::scalar("Row", "string"))
        .with_member(HostMember::scalar("Number", "int"))
        .with_member(HostMember::scalar("Label", "string"))
        .with_marker(TypeMarker::PrimaryKey {
            properties: vec!["Row".to_string(), "Number".to_string()],
        })
        .with_marker(TypeMarker::Index {
            properties: vec!["Label".to_string()],
            unique: true,
        })]);

    let finalized = model.finalize_model().unwrap();
    let seat = finalized.entity_type("Seat").unwrap();
    assert_eq!(
        seat.primary_key,
        Some(vec!["Row".to_string(), "Number".to_string()])
    );
    let label = seat
        .indexes
        .iter()
        .find(|i| i.properties == ["Label"])
        .unwrap();
    assert!(label.unique);
}

#[test]
fn two_key_markers_fail_finalization() {
    let model = model_of(vec![HostType::new("Pair")
        .with_member(HostMember::scalar("Left", "string").with_marker(MemberMarker::Key))
        .with_member(HostMember::scalar("Right", "string").with_marker(MemberMarker::Key))]);

    let err = model.finalize_model().unwrap_err();
    assert!(err
        .problems_for("Pair")
        .iter()
        .any(|p| p.contains("two single-property markers")));
}

#[test]
fn primary_key_marker_naming_a_missing_member_fails_finalization() {
    let model = model_of(vec![entity("Ticket").with_marker(TypeMarker::PrimaryKey {
        properties: vec!["Id".to_string(), "Code".to_string()],
    })]);

    let err = model.finalize_model().unwrap_err();
    assert!(err
        .problems_for("Ticket")
        .iter()
        .any(|p| p.contains("primary key marker names `Code`")));
}

#[test]
fn backing_fields_are_found_by_convention() {
    let model = model_of(vec![entity("Account")
        .with_member(HostMember::scalar("Balance", "decimal"))
        .with_field("_balance", "decimal")]);

    let snapshot = model.snapshot();
    assert_eq!(
        snapshot
            .entity_type("Account")
            .unwrap()
            .property("Balance")
            .unwrap()
            .field
            .as_deref(),
        Some("_balance")
    );
}
