//! Relationship discovery, foreign-key property matching and the follow-up
//! rules (indexes, delete behavior, join types).

use modelforge_conventions::{build_model, default_convention_set};
use modelforge_metadata::{
    codes, ConfigurationSource, DeleteBehavior, FinalizedModel, HostCatalog, HostMember, HostType,
    MemberMarker, Model, ModelOptions, TypeMarker, ValueGenerated, ValueType,
};

const EXPLICIT: ConfigurationSource = ConfigurationSource::Explicit;

fn model_of(types: Vec<HostType>) -> Model {
    build_model(HostCatalog::new(types), &[], ModelOptions::default())
}

fn finalized(types: Vec<HostType>) -> FinalizedModel {
    model_of(types).finalize_model().unwrap()
}

fn entity(name: &str) -> HostType {
    HostType::new(name).with_member(HostMember::scalar("Id", "int"))
}

fn blog_and_posts() -> Vec<HostType> {
    vec![
        entity("Blog")
            .with_member(HostMember::scalar("Title", "string"))
            .with_member(HostMember::collection("Posts", "Post")),
        entity("Post")
            .with_member(HostMember::scalar("BlogId", "int"))
            .with_member(HostMember::reference("Blog", "Blog")),
    ]
}

// ============================================================================
// One-to-many
// ============================================================================

#[test]
fn reference_and_collection_pair_into_one_relationship() {
    let model = finalized(blog_and_posts());

    let post = model.entity_type("Post").unwrap();
    let fk = post.foreign_key(&["BlogId"]).unwrap();
    assert_eq!(fk.principal, "Blog");
    assert_eq!(fk.principal_key, vec!["Id"]);
    assert!(!fk.unique);
    assert!(fk.required);
    assert_eq!(fk.dependent_to_principal.as_deref(), Some("Blog"));
    assert_eq!(fk.principal_to_dependent.as_deref(), Some("Posts"));
    assert_eq!(post.foreign_keys.len(), 1);
    assert!(post.property("BlogId1").is_none());

    let blog = model.entity_type("Blog").unwrap();
    assert!(blog.navigation("Posts").unwrap().collection);
}

#[test]
fn foreign_key_follow_ups() {
    let model = finalized(blog_and_posts());
    let post = model.entity_type("Post").unwrap();

    let index = post
        .indexes
        .iter()
        .find(|i| i.properties == ["BlogId"])
        .unwrap();
    assert!(!index.unique);
    assert_eq!(index.name, None);
    assert_eq!(
        post.foreign_key(&["BlogId"]).unwrap().delete_behavior,
        DeleteBehavior::Cascade
    );
    assert_eq!(
        post.property("BlogId").unwrap().value_generated,
        ValueGenerated::Never
    );
    assert_eq!(
        post.property("Id").unwrap().value_generated,
        ValueGenerated::OnAdd
    );
}

#[test]
fn optional_foreign_key_nulls_out_on_delete() {
    let model = finalized(vec![
        entity("Blog").with_member(HostMember::collection("Posts", "Post")),
        entity("Post")
            .with_member(HostMember::scalar("BlogId", "int?"))
            .with_member(HostMember::reference("Blog", "Blog")),
    ]);

    let fk = model
        .entity_type("Post")
        .unwrap()
        .foreign_key(&["BlogId"])
        .unwrap();
    assert!(!fk.required);
    assert_eq!(fk.delete_behavior, DeleteBehavior::ClientSetNull);
}

#[test]
fn navigation_named_foreign_key_is_preferred() {
    let model = finalized(vec![
        entity("Principal"),
        entity("Dependent")
            .with_member(HostMember::scalar("SomeNavId", "int"))
            .with_member(HostMember::scalar("PrincipalId", "int"))
            .with_member(HostMember::reference("SomeNav", "Principal")),
    ]);

    let dependent = model.entity_type("Dependent").unwrap();
    let fk = dependent.foreign_key_to("Principal").unwrap();
    assert_eq!(fk.properties, vec!["SomeNavId"]);
    assert_eq!(dependent.foreign_keys.len(), 1);
}

#[test]
fn unmatched_foreign_key_gets_shadow_properties() {
    let model = finalized(vec![
        entity("Author"),
        entity("Book").with_member(HostMember::reference("Writer", "Author")),
    ]);

    let book = model.entity_type("Book").unwrap();
    let fk = book.foreign_key_to("Author").unwrap();
    assert_eq!(fk.properties, vec!["WriterId"]);
    let shadow = book.property("WriterId").unwrap();
    assert!(shadow.shadow);
    assert!(shadow.nullable);
    assert_eq!(fk.delete_behavior, DeleteBehavior::ClientSetNull);
}

// ============================================================================
// Composite keys
// ============================================================================

fn composite_principal() -> HostType {
    HostType::new("Principal")
        .with_member(HostMember::scalar("Id", "int"))
        .with_member(HostMember::scalar("Fk", "int"))
        .with_marker(TypeMarker::PrimaryKey {
            properties: vec!["Id".to_string(), "Fk".to_string()],
        })
}

#[test]
fn composite_foreign_key_matches_every_key_property() {
    let model = finalized(vec![
        composite_principal(),
        entity("Dependent")
            .with_member(HostMember::scalar("PrincipalId", "int"))
            .with_member(HostMember::scalar("PrincipalFk", "int"))
            .with_member(HostMember::reference("Principal", "Principal")),
    ]);

    let fk = model
        .entity_type("Dependent")
        .unwrap()
        .foreign_key_to("Principal")
        .unwrap();
    assert_eq!(fk.properties, vec!["PrincipalId", "PrincipalFk"]);
    assert_eq!(fk.principal_key, vec!["Id", "Fk"]);
}

#[test]
fn partial_composite_match_is_rejected() {
    let model = model_of(vec![
        composite_principal(),
        entity("Dependent")
            .with_member(HostMember::scalar("PrincipalId", "int"))
            .with_member(HostMember::reference("Principal", "Principal")),
    ]);

    assert!(model
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::FOREIGN_KEY_CANDIDATE_REJECTED && d.message.contains("partial")));
    let snapshot = model.snapshot();
    let dependent = snapshot.entity_type("Dependent").unwrap();
    let fk = dependent.foreign_key_to("Principal").unwrap();
    assert_eq!(fk.properties.len(), 2);
    assert_ne!(fk.properties[0], "PrincipalId");
    assert!(fk
        .properties
        .iter()
        .all(|p| dependent.property(p).unwrap().shadow));
}

#[test]
fn incompatible_candidate_is_rejected() {
    let model = model_of(vec![
        entity("Blog"),
        entity("Post")
            .with_member(HostMember::scalar("BlogId", "string"))
            .with_member(HostMember::reference("Blog", "Blog")),
    ]);

    assert!(model
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::FOREIGN_KEY_CANDIDATE_REJECTED && d.message.contains("BlogId")));
    let snapshot = model.snapshot();
    let post = snapshot.entity_type("Post").unwrap();
    let fk = post.foreign_key_to("Blog").unwrap();
    assert_eq!(fk.properties, vec!["BlogId1"]);
    assert!(post.property("BlogId1").unwrap().shadow);

    let blog_id = post.property("BlogId").unwrap();
    assert_eq!(blog_id.value_type, "string");
    assert!(!blog_id.shadow);
}

#[test]
fn host_member_does_not_take_over_a_placeholder_of_another_type() {
    let model = model_of(vec![
        entity("Author"),
        entity("Book")
            .with_member(HostMember::scalar("WriterId", "string"))
            .with_member(HostMember::reference("Writer", "Author")),
    ]);

    assert!(model
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::FOREIGN_KEY_CANDIDATE_REJECTED && d.message.contains("WriterId")));
    let finalized = model.finalize_model().unwrap();
    let book = finalized.entity_type("Book").unwrap();

    let writer_id = book.property("WriterId").unwrap();
    assert_eq!(writer_id.value_type, "string");
    assert!(!writer_id.nullable);
    assert!(!writer_id.shadow);

    let fk = book.foreign_key_to("Author").unwrap();
    assert_eq!(fk.properties, vec!["WriterId1"]);
    let placeholder = book.property("WriterId1").unwrap();
    assert!(placeholder.shadow);
    assert_eq!(placeholder.value_type, "int");
    assert!(placeholder.nullable);
}

// ============================================================================
// One-to-one
// ============================================================================

#[test]
fn one_to_one_dependent_follows_the_matching_property() {
    let model = finalized(vec![
        entity("Person").with_member(HostMember::reference("Address", "Address")),
        entity("Address")
            .with_member(HostMember::scalar("PersonId", "int"))
            .with_member(HostMember::reference("Person", "Person")),
    ]);

    let address = model.entity_type("Address").unwrap();
    let fk = address.foreign_key(&["PersonId"]).unwrap();
    assert_eq!(fk.principal, "Person");
    assert!(fk.unique);
    assert!(model.entity_type("Person").unwrap().foreign_keys.is_empty());
    let index = address
        .indexes
        .iter()
        .find(|i| i.properties == ["PersonId"])
        .unwrap();
    assert!(index.unique);
}

#[test]
fn known_principal_end_lets_the_dependent_key_be_the_foreign_key() {
    let mut model = model_of(vec![
        entity("Person").with_member(HostMember::reference("Detail", "PersonDetail")),
        entity("PersonDetail").with_member(HostMember::reference("Person", "Person")),
    ]);
    let person = model.find_entity_type("Person").unwrap();
    let detail = model.find_entity_type("PersonDetail").unwrap();
    let fk = model
        .foreign_keys_of(detail)
        .into_iter()
        .find(|f| model.foreign_key(*f).unwrap().principal_type == person)
        .unwrap();

    let before = model.snapshot();
    let before = before.entity_type("PersonDetail").unwrap();
    assert_eq!(before.foreign_key_to("Person").unwrap().properties, vec!["PersonId"]);
    assert!(before.property("PersonId").unwrap().shadow);

    assert!(model.set_principal_end(fk, person, EXPLICIT));

    let finalized = model.finalize_model().unwrap();
    let detail = finalized.entity_type("PersonDetail").unwrap();
    let fk = detail.foreign_key_to("Person").unwrap();
    assert_eq!(fk.properties, vec!["Id"]);
    assert!(fk.unique);
    assert!(detail.property("PersonId").is_none());
    assert_eq!(
        detail.property("Id").unwrap().value_generated,
        ValueGenerated::Never
    );
}

// ============================================================================
// Self references
// ============================================================================

#[test]
fn self_reference_pairs_reference_and_collection() {
    let model = finalized(vec![entity("Employee")
        .with_member(HostMember::scalar("ManagerId", "int?"))
        .with_member(HostMember::reference("Manager", "Employee"))
        .with_member(HostMember::collection("Reports", "Employee"))]);

    let employee = model.entity_type("Employee").unwrap();
    assert_eq!(employee.foreign_keys.len(), 1);
    let fk = employee.foreign_key(&["ManagerId"]).unwrap();
    assert_eq!(fk.principal, "Employee");
    assert_eq!(fk.principal_key, vec!["Id"]);
    assert!(!fk.unique);
    assert!(!fk.required);
    assert_eq!(fk.dependent_to_principal.as_deref(), Some("Manager"));
    assert_eq!(fk.principal_to_dependent.as_deref(), Some("Reports"));
    assert_eq!(fk.delete_behavior, DeleteBehavior::ClientSetNull);
    assert!(employee.property("ManagerId1").is_none());
}

#[test]
fn self_reference_pairs_two_references_one_to_one() {
    let model = finalized(vec![entity("Node")
        .with_member(HostMember::scalar("PreviousId", "int?"))
        .with_member(HostMember::reference("Next", "Node"))
        .with_member(HostMember::reference("Previous", "Node"))]);

    let node = model.entity_type("Node").unwrap();
    assert_eq!(node.foreign_keys.len(), 1);
    let fk = node.foreign_key(&["PreviousId"]).unwrap();
    assert!(fk.unique);
    assert_eq!(fk.dependent_to_principal.as_deref(), Some("Previous"));
    assert_eq!(fk.principal_to_dependent.as_deref(), Some("Next"));
    let index = node
        .indexes
        .iter()
        .find(|i| i.properties == ["PreviousId"])
        .unwrap();
    assert!(index.unique);
}

#[test]
fn navigation_marked_as_its_own_inverse_fails_finalization() {
    let model = model_of(vec![entity("Employee").with_member(
        HostMember::reference("Manager", "Employee").with_marker(MemberMarker::InverseProperty {
            name: "Manager".to_string(),
        }),
    )]);

    let err = model.finalize_model().unwrap_err();
    assert!(err
        .problems_for("Employee")
        .iter()
        .any(|p| p.contains("`Manager` is marked as its own inverse")));
}

// ============================================================================
// Ambiguity
// ============================================================================

#[test]
fn two_references_to_one_collection_are_ambiguous() {
    let model = model_of(vec![
        entity("User").with_member(HostMember::collection("Posts", "Post")),
        entity("Post")
            .with_member(HostMember::reference("Author", "User"))
            .with_member(HostMember::reference("Editor", "User")),
    ]);

    assert!(model
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::AMBIGUOUS_NAVIGATION));
    let err = model.finalize_model().unwrap_err();
    let problems = err.problems_for("Post");
    assert!(problems.iter().any(|p| p.contains("could not be paired")));
}

#[test]
fn inverse_marker_resolves_the_ambiguity() {
    let model = finalized(vec![
        entity("User").with_member(HostMember::collection("Posts", "Post")),
        entity("Post")
            .with_member(
                HostMember::reference("Author", "User").with_marker(MemberMarker::InverseProperty {
                    name: "Posts".to_string(),
                }),
            )
            .with_member(HostMember::reference("Editor", "User")),
    ]);

    let post = model.entity_type("Post").unwrap();
    let author = post.foreign_key(&["AuthorId"]).unwrap();
    assert_eq!(author.principal_to_dependent.as_deref(), Some("Posts"));
    let editor = post.foreign_key(&["EditorId"]).unwrap();
    assert_eq!(editor.principal_to_dependent, None);
}

#[test]
fn shared_foreign_key_candidate_fails_finalization() {
    let model = model_of(vec![
        entity("User"),
        entity("Post")
            .with_member(HostMember::scalar("UserId", "int"))
            .with_member(HostMember::reference("Author", "User"))
            .with_member(HostMember::reference("Editor", "User")),
    ]);

    let err = model.finalize_model().unwrap_err();
    assert!(err
        .problems_for("Post")
        .iter()
        .any(|p| p.contains("both match foreign key properties (UserId)")));
}

#[test]
fn foreign_key_marker_names_the_property() {
    let model = finalized(vec![
        entity("User"),
        entity("Post")
            .with_member(HostMember::scalar("WrittenBy", "int"))
            .with_member(
                HostMember::reference("Author", "User").with_marker(MemberMarker::ForeignKey {
                    name: "WrittenBy".to_string(),
                }),
            ),
    ]);

    let fk = model
        .entity_type("Post")
        .unwrap()
        .foreign_key_to("User")
        .unwrap();
    assert_eq!(fk.properties, vec!["WrittenBy"]);
}

#[test]
fn explicit_foreign_key_properties_survive_discovery() {
    let catalog = HostCatalog::new(blog_and_posts());
    let mut model = Model::with_conventions(catalog, default_convention_set(), ModelOptions::default());
    let post = model.add_entity_type("Post", Some("Post"), EXPLICIT).unwrap();
    let fk = model.foreign_keys_of(post)[0];
    let owner = model
        .add_property(post.into(), "OwnerBlog", ValueType::new("int"), true, EXPLICIT)
        .unwrap();
    assert!(model.set_foreign_key_properties(fk, &[owner], EXPLICIT));

    let finalized = model.finalize_model().unwrap();
    let post = finalized.entity_type("Post").unwrap();
    assert_eq!(post.foreign_key_to("Blog").unwrap().properties, vec!["OwnerBlog"]);
    assert!(post.property("BlogId").is_some());
}

// ============================================================================
// Many-to-many
// ============================================================================

#[test]
fn collection_pair_gets_a_join_type() {
    let model = finalized(vec![
        entity("Post").with_member(HostMember::collection("Tags", "Tag")),
        entity("Tag").with_member(HostMember::collection("Posts", "Post")),
    ]);

    let join = model.entity_type("PostTag").unwrap();
    assert_eq!(join.host_type, None);
    assert_eq!(
        join.primary_key,
        Some(vec!["PostId".to_string(), "TagId".to_string()])
    );
    assert_eq!(join.foreign_key(&["PostId"]).unwrap().principal, "Post");
    assert_eq!(join.foreign_key(&["TagId"]).unwrap().principal, "Tag");
    assert!(join.indexes.iter().any(|i| i.properties == ["TagId"]));
    assert!(!join.indexes.iter().any(|i| i.properties == ["PostId"]));

    let tags = model.entity_type("Post").unwrap().skip_navigation("Tags").unwrap();
    assert_eq!(tags.join_type.as_deref(), Some("PostTag"));
    assert_eq!(tags.inverse.as_deref(), Some("Posts"));
    let posts = model.entity_type("Tag").unwrap().skip_navigation("Posts").unwrap();
    assert_eq!(posts.join_type.as_deref(), Some("PostTag"));
}

#[test]
fn join_type_name_avoids_existing_types() {
    let catalog = HostCatalog::new(vec![
        entity("Post").with_member(HostMember::collection("Tags", "Tag")),
        entity("Tag").with_member(HostMember::collection("Posts", "Post")),
        entity("PostTag").with_member(HostMember::scalar("Note", "string")),
    ]);
    let roots: Vec<String> = ["PostTag", "Post"].iter().map(|s| s.to_string()).collect();
    let model = build_model(catalog, &roots, ModelOptions::default())
        .finalize_model()
        .unwrap();

    let tags = model.entity_type("Post").unwrap().skip_navigation("Tags").unwrap();
    assert_eq!(tags.join_type.as_deref(), Some("PostTag1"));
    assert_eq!(
        model.entity_type("PostTag").unwrap().host_type.as_deref(),
        Some("PostTag")
    );
}

#[test]
fn self_collection_pair_gets_a_join_type() {
    let model = finalized(vec![entity("Person")
        .with_member(HostMember::collection("Friends", "Person"))
        .with_member(HostMember::collection("FriendOf", "Person"))]);

    let join = model.entity_type("PersonPerson").unwrap();
    assert_eq!(join.host_type, None);
    assert_eq!(
        join.primary_key,
        Some(vec!["PersonId".to_string(), "PersonId1".to_string()])
    );
    assert_eq!(join.foreign_keys.len(), 2);
    assert!(join.foreign_keys.iter().all(|fk| fk.principal == "Person"));

    let person = model.entity_type("Person").unwrap();
    let friends = person.skip_navigation("Friends").unwrap();
    assert_eq!(friends.join_type.as_deref(), Some("PersonPerson"));
    assert_eq!(friends.inverse.as_deref(), Some("FriendOf"));
    let friend_of = person.skip_navigation("FriendOf").unwrap();
    assert_eq!(friend_of.inverse.as_deref(), Some("Friends"));
}
