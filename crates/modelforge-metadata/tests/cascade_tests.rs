//! Structural cascades of the mutation API, exercised without conventions.

use modelforge_metadata::{
    ConfigurationSource, EntityTypeId, HostCatalog, Member, Model, ModelError, TypeBaseId,
    ValueType,
};

const EXPLICIT: ConfigurationSource = ConfigurationSource::Explicit;
const CONVENTION: ConfigurationSource = ConfigurationSource::Convention;

fn entity_with_id(model: &mut Model, name: &str) -> EntityTypeId {
    let id = model.add_entity_type(name, None, EXPLICIT).unwrap();
    let key = model
        .add_property(TypeBaseId::Entity(id), "Id", ValueType::new("int"), true, EXPLICIT)
        .unwrap();
    model.set_primary_key(id, &[key], EXPLICIT).unwrap();
    id
}

#[test]
fn relationship_synthesizes_nullable_shadow_properties() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let post = entity_with_id(&mut model, "Post");

    let fk = model
        .add_relationship(post, blog, Some("Blog"), Some("Posts"), CONVENTION)
        .unwrap();

    let foreign_key = model.foreign_key(fk).unwrap();
    assert_eq!(model.property_names(&foreign_key.properties), vec!["BlogId"]);
    assert_eq!(foreign_key.properties_source, None);
    let shadow = model.property(foreign_key.properties[0]).unwrap();
    assert!(shadow.is_implicit());
    assert!(shadow.is_nullable());
    assert!(!model.is_foreign_key_required(fk));

    let posts = model.find_navigation(blog, "Posts").unwrap();
    assert!(model.navigation(posts).unwrap().collection);
}

#[test]
fn removing_last_navigation_removes_convention_foreign_key_and_placeholders() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let post = entity_with_id(&mut model, "Post");
    let fk = model
        .add_relationship(post, blog, Some("Blog"), None, CONVENTION)
        .unwrap();
    let navigation = model.find_navigation(post, "Blog").unwrap();

    assert!(model.remove_navigation(navigation, EXPLICIT));

    assert!(model.foreign_key(fk).is_none());
    assert_eq!(model.find_property(TypeBaseId::Entity(post), "BlogId"), None);
}

#[test]
fn explicit_foreign_key_properties_replace_placeholders() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let post = entity_with_id(&mut model, "Post");
    let fk = model
        .add_relationship(post, blog, Some("Owner"), None, CONVENTION)
        .unwrap();
    assert_eq!(
        model.property_names(&model.foreign_key(fk).unwrap().properties),
        vec!["OwnerId"]
    );
    let blog_ref = model
        .add_property(TypeBaseId::Entity(post), "BlogRef", ValueType::new("int"), false, EXPLICIT)
        .unwrap();

    assert!(model.set_foreign_key_properties(fk, &[blog_ref], EXPLICIT));

    assert_eq!(model.foreign_key(fk).unwrap().properties, vec![blog_ref]);
    assert_eq!(model.find_property(TypeBaseId::Entity(post), "OwnerId"), None);
    assert!(model.is_foreign_key_required(fk));
    // A convention cannot take the properties back.
    assert!(!model.set_foreign_key_properties(fk, &[], CONVENTION));
}

#[test]
fn host_member_of_another_type_moves_the_placeholder_aside() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let post = entity_with_id(&mut model, "Post");
    let fk = model
        .add_relationship(post, blog, Some("Blog"), None, CONVENTION)
        .unwrap();
    let placeholder = model.foreign_key(fk).unwrap().properties[0];

    let host = model
        .add_property(TypeBaseId::Entity(post), "BlogId", ValueType::new("string"), false, CONVENTION)
        .unwrap();

    assert_ne!(host, placeholder);
    assert_eq!(model.property_name(placeholder), "BlogId1");
    assert!(model.property(placeholder).unwrap().is_implicit());
    assert_eq!(model.foreign_key(fk).unwrap().properties, vec![placeholder]);
    let host = model.property(host).unwrap();
    assert_eq!(host.value_type, ValueType::new("string"));
    assert!(!host.shadow);
}

#[test]
fn host_member_of_a_compatible_type_backs_the_placeholder() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let post = entity_with_id(&mut model, "Post");
    let fk = model
        .add_relationship(post, blog, Some("Blog"), None, CONVENTION)
        .unwrap();
    let placeholder = model.foreign_key(fk).unwrap().properties[0];

    let host = model
        .add_property(TypeBaseId::Entity(post), "BlogId", ValueType::new("int"), false, CONVENTION)
        .unwrap();

    assert_eq!(host, placeholder);
    assert!(!model.property(host).unwrap().shadow);
    assert!(model.find_property(TypeBaseId::Entity(post), "BlogId1").is_none());
}

#[test]
fn removing_principal_cascades_through_relationships() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let post = entity_with_id(&mut model, "Post");
    let fk = model
        .add_relationship(post, blog, Some("Blog"), Some("Posts"), EXPLICIT)
        .unwrap();

    assert!(model.remove_entity_type(blog, EXPLICIT));

    assert!(model.foreign_key(fk).is_none());
    assert!(model.entity_type(post).unwrap().navigations.is_empty());
    assert_eq!(model.find_property(TypeBaseId::Entity(post), "BlogId"), None);
    assert!(model.entity_type(post).unwrap().foreign_keys.is_empty());
}

#[test]
fn setting_base_type_folds_redeclared_properties_and_drops_keys() {
    let mut model = Model::new(HostCatalog::default());
    let animal = entity_with_id(&mut model, "Animal");
    let dog = entity_with_id(&mut model, "Dog");

    assert_eq!(model.set_base_type(dog, Some(animal), EXPLICIT), Ok(true));

    assert!(model.entity_type(dog).unwrap().keys.is_empty());
    assert!(model.declared_properties(TypeBaseId::Entity(dog)).is_empty());
    let inherited = model.find_property(TypeBaseId::Entity(dog), "Id").unwrap();
    assert_eq!(model.primary_key_properties(dog), vec![inherited]);
    assert!(matches!(
        model.set_base_type(animal, Some(dog), EXPLICIT),
        Err(ModelError::CyclicBaseType { .. })
    ));
}

#[test]
fn ignored_member_blocks_lower_sources_only() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let title = TypeBaseId::Entity(blog);
    model
        .add_property(title, "Title", ValueType::new("string"), false, CONVENTION)
        .unwrap();

    assert!(model.ignore_member(title, "Title", ConfigurationSource::DataAnnotation));
    assert_eq!(model.find_member(title, "Title"), None);
    assert_eq!(
        model.add_property(title, "Title", ValueType::new("string"), false, CONVENTION),
        None
    );

    let restored = model
        .add_property(title, "Title", ValueType::new("string"), false, EXPLICIT)
        .unwrap();
    assert_eq!(model.find_member(title, "Title"), Some(Member::Property(restored)));
    assert_eq!(model.is_member_ignored(title, "Title"), None);
}

#[test]
fn one_to_one_can_be_inverted() {
    let mut model = Model::new(HostCatalog::default());
    let blog = entity_with_id(&mut model, "Blog");
    let header = entity_with_id(&mut model, "Header");
    let fk = model
        .add_relationship(blog, header, Some("Header"), None, CONVENTION)
        .unwrap();
    assert!(model.set_foreign_key_unique(fk, true, CONVENTION));
    model.add_navigation(fk, "Blog", false, CONVENTION).unwrap();

    assert!(model.invert_foreign_key(fk, EXPLICIT));

    let foreign_key = model.foreign_key(fk).unwrap();
    assert_eq!(foreign_key.declaring_type, header);
    assert_eq!(foreign_key.principal_type, blog);
    assert_eq!(model.property_names(&foreign_key.properties), vec!["BlogId"]);
    assert_eq!(model.find_property(TypeBaseId::Entity(blog), "HeaderId"), None);
    let blog_nav = model.find_navigation(header, "Blog").unwrap();
    assert!(model.navigation(blog_nav).unwrap().on_dependent);
    // A convention may no longer flip it back.
    assert!(!model.set_principal_end(fk, header, CONVENTION));
}
