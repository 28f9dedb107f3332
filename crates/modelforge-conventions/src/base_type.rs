//! Inheritance discovery in both directions.
//!
//! A new entity type picks the nearest mapped host ancestor as its base, and
//! already-mapped host descendants re-parent onto it when it is nearer than
//! the base they have.

use std::rc::Rc;

use modelforge_metadata::conventions::EntityTypeAddedConvention;
use modelforge_metadata::{
    codes, ConfigurationSource, Convention, ConventionContext, ConventionSet, DiagnosticLevel,
    EntityTypeId, Model,
};
use tracing::debug;

/// Position of `ancestor` in the host ancestry of `host`, nearest = 0.
fn ancestor_rank(model: &Model, host: &str, ancestor: &str) -> Option<usize> {
    model.host().ancestors(host).iter().position(|a| a == ancestor)
}

fn apply_base(model: &mut Model, entity_type: EntityTypeId, base: EntityTypeId) {
    if let Err(err) = model.set_base_type(entity_type, Some(base), ConfigurationSource::Convention)
    {
        model.report(DiagnosticLevel::Warning, codes::BASE_TYPE_REJECTED, err.to_string());
    }
}

pub struct BaseTypeDiscoveryConvention;

impl Convention for BaseTypeDiscoveryConvention {
    fn name(&self) -> &'static str {
        "base_type_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self);
    }
}

impl EntityTypeAddedConvention for BaseTypeDiscoveryConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        let Some(entity) = model.entity_type(entity_type) else {
            return;
        };
        if !entity.base_type.can_set(ConfigurationSource::Convention) {
            return;
        }
        let Some(host) = entity.host_type.clone() else {
            return;
        };
        let base = model
            .host()
            .ancestors(&host)
            .iter()
            .find_map(|ancestor| model.find_entity_type_by_host(ancestor))
            .filter(|base| *base != entity_type);
        if let Some(base) = base {
            debug!(entity_type = %host, base = %model.type_name(base.into()), "base type discovered");
            apply_base(model, entity_type, base);
        }
    }
}

pub struct DerivedTypeDiscoveryConvention;

impl Convention for DerivedTypeDiscoveryConvention {
    fn name(&self) -> &'static str {
        "derived_type_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self);
    }
}

impl EntityTypeAddedConvention for DerivedTypeDiscoveryConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        let Some(host) = model.entity_type(entity_type).and_then(|e| e.host_type.clone()) else {
            return;
        };
        let derived: Vec<EntityTypeId> = model
            .entity_types()
            .filter(|(id, _)| *id != entity_type)
            .filter(|(_, e)| e.base_type.can_set(ConfigurationSource::Convention))
            .filter_map(|(id, e)| {
                let own = e.host_type.as_deref()?;
                let rank = ancestor_rank(model, own, &host)?;
                let current = e
                    .base_type()
                    .and_then(|b| model.entity_type(b))
                    .and_then(|b| b.host_type.as_deref())
                    .and_then(|b| ancestor_rank(model, own, b));
                match current {
                    Some(current) if current <= rank => None,
                    _ => Some(id),
                }
            })
            .collect();
        for id in derived {
            if model.entity_type(entity_type).is_none() {
                return;
            }
            apply_base(model, id, entity_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use modelforge_metadata::{HostCatalog, HostMember, HostType, ModelOptions};

    use super::*;

    fn model(catalog: HostCatalog) -> Model {
        let mut set = ConventionSet::new();
        set.add(BaseTypeDiscoveryConvention)
            .add(DerivedTypeDiscoveryConvention);
        Model::with_conventions(catalog, set, ModelOptions::default())
    }

    fn catalog() -> HostCatalog {
        HostCatalog::new([
            HostType::new("A").with_member(HostMember::scalar("Id", "int")),
            HostType::new("B").with_base("A"),
            HostType::new("C").with_base("B"),
        ])
    }

    #[test]
    fn derived_type_added_first_is_reparented() {
        let mut model = model(catalog());
        let c = model.add_entity_type("C", Some("C"), ConfigurationSource::Convention).unwrap();
        let a = model.add_entity_type("A", Some("A"), ConfigurationSource::Convention).unwrap();
        assert_eq!(model.entity_type(c).unwrap().base_type(), Some(a));

        let b = model.add_entity_type("B", Some("B"), ConfigurationSource::Convention).unwrap();
        assert_eq!(model.entity_type(b).unwrap().base_type(), Some(a));
        assert_eq!(model.entity_type(c).unwrap().base_type(), Some(b));
    }

    #[test]
    fn explicit_base_is_left_alone() {
        let mut model = model(catalog());
        let a = model.add_entity_type("A", Some("A"), ConfigurationSource::Convention).unwrap();
        let c = model.add_entity_type("C", Some("C"), ConfigurationSource::Explicit).unwrap();
        model.set_base_type(c, None, ConfigurationSource::Explicit).unwrap();

        model.add_entity_type("B", Some("B"), ConfigurationSource::Convention).unwrap();

        assert_eq!(model.entity_type(c).unwrap().base_type(), None);
        assert!(model.entity_type(a).is_some());
    }
}
