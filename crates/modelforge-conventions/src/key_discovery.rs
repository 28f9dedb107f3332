//! Picks a primary key by name: `Id` first, then `<TypeName>Id`. Shadow
//! entity types are keyed by whoever created them.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    EntityTypeAddedConvention, EntityTypeBaseTypeChangedConvention, KeyRemovedConvention,
    PropertyAddedConvention, PropertyRemovedConvention,
};
use modelforge_metadata::{
    codes, ConfigurationSource, Convention, ConventionContext, ConventionSet, DiagnosticLevel,
    EntityTypeId, Key, Model, Property, PropertyId, TypeBaseId,
};
use tracing::debug;

use crate::host_scope::same_name;

pub struct KeyDiscoveryConvention;

impl KeyDiscoveryConvention {
    fn candidate(model: &mut Model, entity_type: EntityTypeId) -> Option<PropertyId> {
        let entity = model.entity_type(entity_type)?;
        let type_name = entity.name.clone();
        let declared: Vec<PropertyId> = entity
            .properties
            .iter()
            .copied()
            .filter(|p| model.property(*p).is_some_and(|p| !p.is_implicit()))
            .collect();

        for pattern in ["Id".to_string(), format!("{type_name}Id")] {
            let matches: Vec<PropertyId> = declared
                .iter()
                .copied()
                .filter(|p| same_name(model.property_name(*p), &pattern))
                .collect();
            match matches.as_slice() {
                [] => continue,
                [single] => return Some(*single),
                several => {
                    let names = model.property_names(several).join(", ");
                    model.report(
                        DiagnosticLevel::Warning,
                        codes::MULTIPLE_KEY_CANDIDATES,
                        format!("`{type_name}` has several key candidates named like `{pattern}`: {names}"),
                    );
                    return None;
                }
            }
        }
        None
    }

    fn discover(model: &mut Model, entity_type: EntityTypeId) {
        let Some(entity) = model.entity_type(entity_type) else {
            return;
        };
        if entity.base_type().is_some()
            || entity.is_shadow()
            || !entity.primary_key.can_set(ConfigurationSource::Convention)
        {
            return;
        }
        let current = entity.primary_key.get();
        match Self::candidate(model, entity_type) {
            Some(property) => {
                let unchanged = current
                    .and_then(|k| model.key(k))
                    .is_some_and(|k| k.properties == [property]);
                if unchanged {
                    return;
                }
                if let Err(err) =
                    model.set_primary_key(entity_type, &[property], ConfigurationSource::Convention)
                {
                    debug!(error = %err, "key discovery skipped");
                }
            }
            None if current
                .and_then(|k| model.key(k))
                .is_some_and(|k| k.properties.len() == 1) =>
            {
                model.remove_primary_key(entity_type, ConfigurationSource::Convention);
            }
            None => {}
        }
    }
}

impl Convention for KeyDiscoveryConvention {
    fn name(&self) -> &'static str {
        "key_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self.clone());
        set.entity_type_base_type_changed.push(self.clone());
        set.property_added.push(self.clone());
        set.property_removed.push(self.clone());
        set.key_removed.push(self);
    }
}

impl EntityTypeAddedConvention for KeyDiscoveryConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        Self::discover(model, entity_type);
    }
}

impl EntityTypeBaseTypeChangedConvention for KeyDiscoveryConvention {
    fn process_entity_type_base_type_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<EntityTypeId>,
        _old: Option<EntityTypeId>,
        _context: &mut ConventionContext<Option<EntityTypeId>>,
    ) {
        Self::discover(model, entity_type);
    }
}

impl PropertyAddedConvention for KeyDiscoveryConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        if let Some(TypeBaseId::Entity(entity_type)) =
            model.property(property).map(|p| p.declaring_type)
        {
            Self::discover(model, entity_type);
        }
    }
}

impl PropertyRemovedConvention for KeyDiscoveryConvention {
    fn process_property_removed(
        &self,
        model: &mut Model,
        declaring_type: TypeBaseId,
        _removed: &Property,
        _context: &mut ConventionContext<()>,
    ) {
        if let TypeBaseId::Entity(entity_type) = declaring_type {
            Self::discover(model, entity_type);
        }
    }
}

impl KeyRemovedConvention for KeyDiscoveryConvention {
    fn process_key_removed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _removed: &Key,
        _context: &mut ConventionContext<()>,
    ) {
        Self::discover(model, entity_type);
    }
}
