//! Maps scalar host members to properties and complex-typed members to
//! complex properties.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    ComplexPropertyAddedConvention, EntityTypeAddedConvention,
    EntityTypeBaseTypeChangedConvention,
};
use modelforge_metadata::{
    ComplexPropertyId, ConfigurationSource, Convention, ConventionContext, ConventionSet,
    EntityTypeId, MemberType, Model, TypeBaseId, ValueType,
};
use tracing::trace;

use crate::host_scope::{host_type_name, members_of};

pub struct PropertyDiscoveryConvention;

impl PropertyDiscoveryConvention {
    fn discover(model: &mut Model, ty: TypeBaseId) {
        for member in members_of(model, ty) {
            match &member.ty {
                MemberType::Scalar { .. } | MemberType::ScalarCollection { .. } => {
                    let Some(value_type) = member.ty.value_type() else {
                        continue;
                    };
                    let Some(property) = model.add_property(
                        ty,
                        &member.name,
                        value_type,
                        false,
                        ConfigurationSource::Convention,
                    ) else {
                        continue;
                    };
                    if let MemberType::ScalarCollection { element } = &member.ty {
                        model.set_property_element_type(
                            property,
                            Some(ValueType::parse(element)),
                            ConfigurationSource::Convention,
                        );
                    }
                }
                MemberType::Reference { target } | MemberType::Collection { target } => {
                    let complex = model.host().get(target).is_some_and(|t| t.is_complex());
                    if !complex || Self::is_nested_in(model, ty, target) {
                        continue;
                    }
                    model.add_complex_property(
                        ty,
                        &member.name,
                        target,
                        member.ty.is_collection(),
                        ConfigurationSource::Convention,
                    );
                }
            }
        }
    }

    /// `true` when `host_type` already encloses `ty`; stops a complex type
    /// from containing itself.
    fn is_nested_in(model: &Model, ty: TypeBaseId, host_type: &str) -> bool {
        let mut current = ty;
        loop {
            if host_type_name(model, current).as_deref() == Some(host_type) {
                return true;
            }
            let TypeBaseId::Complex(complex) = current else {
                return false;
            };
            let Some(owner) = model
                .complex_type(complex)
                .and_then(|c| model.complex_property(c.owner))
            else {
                return false;
            };
            current = owner.declaring_type;
        }
    }
}

impl Convention for PropertyDiscoveryConvention {
    fn name(&self) -> &'static str {
        "property_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self.clone());
        set.entity_type_base_type_changed.push(self.clone());
        set.complex_property_added.push(self);
    }
}

impl EntityTypeAddedConvention for PropertyDiscoveryConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        Self::discover(model, TypeBaseId::Entity(entity_type));
    }
}

impl EntityTypeBaseTypeChangedConvention for PropertyDiscoveryConvention {
    fn process_entity_type_base_type_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<EntityTypeId>,
        _old: Option<EntityTypeId>,
        _context: &mut ConventionContext<Option<EntityTypeId>>,
    ) {
        // Members that used to be inherited may now be ours to map.
        Self::discover(model, TypeBaseId::Entity(entity_type));
    }
}

impl ComplexPropertyAddedConvention for PropertyDiscoveryConvention {
    fn process_complex_property_added(
        &self,
        model: &mut Model,
        property: ComplexPropertyId,
        _context: &mut ConventionContext<ComplexPropertyId>,
    ) {
        let Some(complex_type) = model.complex_property(property).map(|p| p.complex_type) else {
            return;
        };
        trace!(complex_type = %complex_type, "discovering complex type members");
        Self::discover(model, TypeBaseId::Complex(complex_type));
    }
}
