//! Delete behavior follows requiredness: required relationships cascade,
//! optional ones null out their dependents on the client.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    ForeignKeyAddedConvention, ForeignKeyPrincipalEndChangedConvention,
    ForeignKeyPropertiesChangedConvention, ForeignKeyRequirednessChangedConvention,
    PropertyNullabilityChangedConvention,
};
use modelforge_metadata::{
    ConfigurationSource, Convention, ConventionContext, ConventionSet, DeleteBehavior,
    ForeignKeyId, KeyId, Model, PropertyId,
};

pub struct CascadeDeleteConvention;

impl CascadeDeleteConvention {
    fn apply(model: &mut Model, fk: ForeignKeyId) {
        let behavior = if model.is_foreign_key_required(fk) {
            DeleteBehavior::Cascade
        } else {
            DeleteBehavior::ClientSetNull
        };
        model.set_foreign_key_delete_behavior(fk, behavior, ConfigurationSource::Convention);
    }
}

impl Convention for CascadeDeleteConvention {
    fn name(&self) -> &'static str {
        "cascade_delete"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.foreign_key_added.push(self.clone());
        set.foreign_key_requiredness_changed.push(self.clone());
        set.foreign_key_properties_changed.push(self.clone());
        set.foreign_key_principal_end_changed.push(self.clone());
        set.property_nullability_changed.push(self);
    }
}

impl ForeignKeyAddedConvention for CascadeDeleteConvention {
    fn process_foreign_key_added(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::apply(model, foreign_key);
    }
}

impl ForeignKeyRequirednessChangedConvention for CascadeDeleteConvention {
    fn process_foreign_key_requiredness_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _required: bool,
        _context: &mut ConventionContext<bool>,
    ) {
        Self::apply(model, foreign_key);
    }
}

impl ForeignKeyPropertiesChangedConvention for CascadeDeleteConvention {
    fn process_foreign_key_properties_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _old_properties: &[PropertyId],
        _old_principal_key: KeyId,
        _context: &mut ConventionContext<Vec<PropertyId>>,
    ) {
        Self::apply(model, foreign_key);
    }
}

impl ForeignKeyPrincipalEndChangedConvention for CascadeDeleteConvention {
    fn process_foreign_key_principal_end_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::apply(model, foreign_key);
    }
}

impl PropertyNullabilityChangedConvention for CascadeDeleteConvention {
    fn process_property_nullability_changed(
        &self,
        model: &mut Model,
        property: PropertyId,
        _nullable: bool,
        _context: &mut ConventionContext<bool>,
    ) {
        let affected: Vec<ForeignKeyId> = model
            .foreign_keys()
            .filter(|(_, fk)| fk.properties.contains(&property))
            .map(|(id, _)| id)
            .collect();
        for fk in affected {
            Self::apply(model, fk);
        }
    }
}
