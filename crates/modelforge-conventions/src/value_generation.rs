//! Store-generated values for surrogate keys.
//!
//! A single-property primary key of an integer or `Guid` type is generated on
//! add unless it also carries a foreign key. Every other property settles on
//! `Never` at `Convention`.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    EntityTypeBaseTypeChangedConvention, EntityTypePrimaryKeyChangedConvention,
    ForeignKeyAddedConvention, ForeignKeyPrincipalEndChangedConvention,
    ForeignKeyPropertiesChangedConvention, ForeignKeyRemovedConvention, ModelFinalizingConvention,
};
use modelforge_metadata::{
    ConfigurationSource, Convention, ConventionContext, ConventionSet, EntityTypeId, ForeignKey,
    ForeignKeyId, KeyId, Model, PropertyId, TypeBaseId, ValueGenerated,
};

pub struct ValueGenerationConvention;

impl ValueGenerationConvention {
    fn is_foreign_key_property(model: &Model, property: PropertyId) -> bool {
        model
            .foreign_keys()
            .any(|(_, fk)| fk.properties.contains(&property))
    }

    fn generated_key(model: &Model, root: EntityTypeId) -> Option<PropertyId> {
        let key = model.primary_key_properties(root);
        let &[single] = key.as_slice() else {
            return None;
        };
        let property = model.property(single)?;
        let surrogate = property.value_type.is_integer() || property.value_type.is_guid();
        (surrogate && !Self::is_foreign_key_property(model, single)).then_some(single)
    }

    /// Re-evaluate every property of the hierarchy `entity_type` belongs to.
    fn refresh(model: &mut Model, entity_type: EntityTypeId) {
        let root = model.root_type(entity_type);
        let generated = Self::generated_key(model, root);
        let mut hierarchy = vec![root];
        hierarchy.extend(model.all_derived_types(root));
        let properties: Vec<PropertyId> = hierarchy
            .into_iter()
            .flat_map(|e| model.declared_properties(TypeBaseId::Entity(e)).to_vec())
            .collect();
        for property in properties {
            let value = if Some(property) == generated {
                ValueGenerated::OnAdd
            } else {
                ValueGenerated::Never
            };
            model.set_property_value_generated(property, value, ConfigurationSource::Convention);
        }
    }

    fn refresh_foreign_key(model: &mut Model, fk: ForeignKeyId) {
        if let Some(dependent) = model.foreign_key(fk).map(|f| f.declaring_type) {
            Self::refresh(model, dependent);
        }
    }
}

impl Convention for ValueGenerationConvention {
    fn name(&self) -> &'static str {
        "value_generation"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_primary_key_changed.push(self.clone());
        set.entity_type_base_type_changed.push(self.clone());
        set.foreign_key_added.push(self.clone());
        set.foreign_key_removed.push(self.clone());
        set.foreign_key_properties_changed.push(self.clone());
        set.foreign_key_principal_end_changed.push(self.clone());
        set.model_finalizing.push(self);
    }
}

impl EntityTypePrimaryKeyChangedConvention for ValueGenerationConvention {
    fn process_entity_type_primary_key_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<KeyId>,
        _old: Option<KeyId>,
        _context: &mut ConventionContext<Option<KeyId>>,
    ) {
        Self::refresh(model, entity_type);
    }
}

impl EntityTypeBaseTypeChangedConvention for ValueGenerationConvention {
    fn process_entity_type_base_type_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<EntityTypeId>,
        old: Option<EntityTypeId>,
        _context: &mut ConventionContext<Option<EntityTypeId>>,
    ) {
        Self::refresh(model, entity_type);
        if let Some(old) = old {
            Self::refresh(model, old);
        }
    }
}

impl ForeignKeyAddedConvention for ValueGenerationConvention {
    fn process_foreign_key_added(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::refresh_foreign_key(model, foreign_key);
    }
}

impl ForeignKeyRemovedConvention for ValueGenerationConvention {
    fn process_foreign_key_removed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _removed: &ForeignKey,
        _context: &mut ConventionContext<()>,
    ) {
        Self::refresh(model, entity_type);
    }
}

impl ForeignKeyPropertiesChangedConvention for ValueGenerationConvention {
    fn process_foreign_key_properties_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _old_properties: &[PropertyId],
        _old_principal_key: KeyId,
        _context: &mut ConventionContext<Vec<PropertyId>>,
    ) {
        Self::refresh_foreign_key(model, foreign_key);
    }
}

impl ForeignKeyPrincipalEndChangedConvention for ValueGenerationConvention {
    fn process_foreign_key_principal_end_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        let Some(fk) = model.foreign_key(foreign_key) else {
            return;
        };
        let principal = fk.principal_type;
        Self::refresh_foreign_key(model, foreign_key);
        Self::refresh(model, principal);
    }
}

impl ModelFinalizingConvention for ValueGenerationConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        let roots: Vec<EntityTypeId> = model
            .entity_types()
            .filter(|(_, e)| e.base_type().is_none())
            .map(|(id, _)| id)
            .collect();
        for root in roots {
            Self::refresh(model, root);
        }
    }
}
