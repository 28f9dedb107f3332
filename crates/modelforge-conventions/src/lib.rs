//! Modelforge conventions: the inference rules that grow a schema from host
//! type descriptions.
//!
//! Every rule here reacts to model events and mutates the model at
//! [`ConfigurationSource::Convention`] (or `DataAnnotation` for the marker
//! rules), so anything configured explicitly wins. [`default_convention_set`]
//! wires them in the order they must run; [`build_model`] seeds a model with
//! entity types and lets the rules fill in the rest.
//!
//! ## Module Organization
//!
//! - `markers`: declarative markers (`Key`, `Required`, `NotMapped`, ...)
//! - `base_type`: base and derived type discovery from host ancestry
//! - `property_discovery`, `key_discovery`, `backing_field`: scalar mapping
//! - `relationship_discovery`: pairing reference and collection members
//! - `foreign_key_discovery`: naming-pattern search for dependent properties
//! - `foreign_key_index`, `value_generation`, `cascade_delete`: relationship
//!   follow-ups
//! - `many_to_many`: join entity types for skip navigation pairs
//! - `constructor_binding`, `validation`: finalizing rules

mod backing_field;
mod base_type;
mod cascade_delete;
mod constructor_binding;
mod foreign_key_discovery;
mod foreign_key_index;
mod host_scope;
mod key_discovery;
mod many_to_many;
mod markers;
mod property_discovery;
mod relationship_discovery;
mod validation;
mod value_generation;

use modelforge_metadata::{ConfigurationSource, ConventionSet, HostCatalog, Model, ModelOptions};
use tracing::debug;

pub use backing_field::BackingFieldConvention;
pub use base_type::{BaseTypeDiscoveryConvention, DerivedTypeDiscoveryConvention};
pub use cascade_delete::CascadeDeleteConvention;
pub use constructor_binding::ConstructorBindingConvention;
pub use foreign_key_discovery::ForeignKeyPropertyDiscoveryConvention;
pub use foreign_key_index::ForeignKeyIndexConvention;
pub use key_discovery::KeyDiscoveryConvention;
pub use many_to_many::ManyToManyJoinTypeConvention;
pub use markers::{
    BackingFieldMarkerConvention, DatabaseGeneratedMarkerConvention, ForeignKeyMarkerConvention,
    IndexMarkerConvention, InversePropertyMarkerConvention, KeyMarkerConvention,
    NotMappedMemberConvention, NotMappedTypeConvention, RequiredMarkerConvention,
};
pub use property_discovery::PropertyDiscoveryConvention;
pub use relationship_discovery::RelationshipDiscoveryConvention;
pub use validation::ValidationConvention;
pub use value_generation::ValueGenerationConvention;

/// Entity-type annotation listing navigations relationship discovery could
/// not pair. Validation rejects a non-empty list.
pub const AMBIGUOUS_NAVIGATIONS: &str = "discovery:ambiguous_navigations";

/// Every convention, registered in dispatch order.
pub fn default_convention_set() -> ConventionSet {
    let mut set = ConventionSet::new();
    set.add(NotMappedTypeConvention)
        .add(NotMappedMemberConvention)
        .add(BaseTypeDiscoveryConvention)
        .add(DerivedTypeDiscoveryConvention)
        .add(PropertyDiscoveryConvention)
        .add(KeyDiscoveryConvention)
        .add(KeyMarkerConvention)
        .add(RequiredMarkerConvention)
        .add(BackingFieldMarkerConvention)
        .add(DatabaseGeneratedMarkerConvention)
        .add(IndexMarkerConvention)
        .add(BackingFieldConvention)
        .add(RelationshipDiscoveryConvention)
        .add(InversePropertyMarkerConvention)
        .add(ForeignKeyMarkerConvention)
        .add(ForeignKeyPropertyDiscoveryConvention)
        .add(ForeignKeyIndexConvention)
        .add(ValueGenerationConvention)
        .add(CascadeDeleteConvention)
        .add(ManyToManyJoinTypeConvention)
        .add(ConstructorBindingConvention)
        .add(ValidationConvention);
    set
}

/// A model over `catalog` with the default conventions, seeded with the host
/// types named in `roots` (every non-complex host type when empty).
///
/// Types reachable from the roots through navigations are added by
/// relationship discovery.
pub fn build_model(catalog: HostCatalog, roots: &[String], options: ModelOptions) -> Model {
    let roots: Vec<String> = if roots.is_empty() {
        catalog
            .iter()
            .filter(|t| !t.is_complex())
            .map(|t| t.name.clone())
            .collect()
    } else {
        roots.to_vec()
    };
    let mut model = Model::with_conventions(catalog, default_convention_set(), options);
    for root in &roots {
        if model.host().get(root).is_none() {
            debug!(host_type = %root, "root is not in the catalog");
            continue;
        }
        model.add_entity_type(root, Some(root), ConfigurationSource::Convention);
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_orders_discovery() {
        let set = default_convention_set();
        let registrations = set.registrations();
        let finalizing = registrations
            .iter()
            .find(|(event, _)| *event == "model_finalizing")
            .map(|(_, rules)| rules.clone())
            .unwrap_or_default();
        assert_eq!(finalizing.last(), Some(&"validation"));
        let position = |name: &str| finalizing.iter().position(|r| *r == name);
        assert!(position("constructor_binding") < position("validation"));

        let entity_added = registrations
            .iter()
            .find(|(event, _)| *event == "entity_type_added")
            .map(|(_, rules)| rules.clone())
            .unwrap_or_default();
        assert_eq!(entity_added.first(), Some(&"not_mapped_type_marker"));
        let position = |name: &str| entity_added.iter().position(|r| *r == name);
        assert!(position("base_type_discovery") < position("property_discovery"));
        assert!(position("property_discovery") < position("key_discovery"));
        assert!(position("key_discovery") < position("relationship_discovery"));
    }
}
