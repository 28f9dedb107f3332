//! Property and complex-property mutations.

use std::collections::BTreeMap;

use tracing::debug;

use crate::annotations::Annotations;
use crate::arena::{ComplexPropertyId, PropertyId};
use crate::config_source::{ConfigurationSource, Facet, FacetWrite};
use crate::diagnostics::{codes, DiagnosticLevel};
use crate::entity_type::{ComplexType, TypeBaseId};
use crate::host::ValueType;
use crate::model::{Member, Model};
use crate::property::{ComplexProperty, Property, ValueGenerated};

impl Model {
    fn type_exists(&self, id: TypeBaseId) -> bool {
        match id {
            TypeBaseId::Entity(e) => self.entity_types.contains(e),
            TypeBaseId::Complex(c) => self.complex_types.contains(c),
        }
    }

    /// Clear the way for a new member named `name`: lift a weaker ignore and
    /// drop a weaker member of a different kind.
    fn make_room_for_member(
        &mut self,
        declaring_type: TypeBaseId,
        name: &str,
        source: ConfigurationSource,
        keep: impl Fn(Member) -> bool,
    ) -> Result<Option<Member>, ()> {
        if !self.try_unignore_member(declaring_type, name, source) {
            return Err(());
        }
        match self.find_member(declaring_type, name) {
            Some(member) if keep(member) => Ok(Some(member)),
            Some(member) => {
                if source.overrides_strictly(self.member_source(member)) {
                    self.remove_member_unchecked(member);
                    Ok(None)
                } else {
                    let type_name = self.type_name(declaring_type);
                    self.report(
                        DiagnosticLevel::Debug,
                        codes::MEMBER_CONFLICT,
                        format!("`{type_name}.{name}` is already mapped as a different kind of member"),
                    );
                    Err(())
                }
            }
            None => Ok(None),
        }
    }

    /// Add (or re-affirm) a scalar property.
    ///
    /// An inherited property of the same name is returned instead of being
    /// redeclared; same-named properties on derived types are folded into the
    /// new one.
    pub fn add_property(
        &mut self,
        declaring_type: TypeBaseId,
        name: &str,
        value_type: ValueType,
        shadow: bool,
        source: ConfigurationSource,
    ) -> Option<PropertyId> {
        if !self.type_exists(declaring_type) {
            return None;
        }
        let existing = self
            .make_room_for_member(declaring_type, name, source, |m| {
                matches!(m, Member::Property(_))
            })
            .ok()?;
        let existing = match existing {
            Some(Member::Property(placeholder))
                if !shadow && self.displaces_placeholder(placeholder, &value_type) =>
            {
                self.rename_placeholder(placeholder);
                None
            }
            other => other,
        };
        if let Some(Member::Property(existing)) = existing {
            if let Some(property) = self.properties.get_mut(existing) {
                property.source = source.max(Some(property.source));
                // A host member now backs a former placeholder.
                property.shadow &= shadow;
            }
            return Some(existing);
        }

        let id = self
            .properties
            .insert(Property::new(name, declaring_type, value_type, shadow, source));
        match declaring_type {
            TypeBaseId::Entity(e) => {
                if let Some(entity) = self.entity_types.get_mut(e) {
                    entity.properties.push(id);
                }
                let redeclared: Vec<PropertyId> = self
                    .all_derived_types(e)
                    .into_iter()
                    .flat_map(|d| self.declared_properties(TypeBaseId::Entity(d)).to_vec())
                    .filter(|p| self.property_name(*p) == name)
                    .collect();
                for property in redeclared {
                    self.remove_property_unchecked(property);
                }
            }
            TypeBaseId::Complex(c) => {
                if let Some(complex) = self.complex_types.get_mut(c) {
                    complex.properties.push(id);
                }
            }
        }
        debug!(property = name, declaring_type = %self.type_name(declaring_type), %source, "property added");
        self.on_property_added(id)
    }

    /// A synthesized placeholder whose type a host member of the same name
    /// cannot take over.
    fn displaces_placeholder(&self, placeholder: PropertyId, value_type: &ValueType) -> bool {
        self.property(placeholder).is_some_and(|p| {
            p.is_implicit()
                && matches!(p.declaring_type, TypeBaseId::Entity(_))
                && !p.value_type.is_compatible_with(value_type)
        })
    }

    /// Move a placeholder to the next free `<name><n>` so the host member can
    /// claim its name.
    fn rename_placeholder(&mut self, placeholder: PropertyId) {
        let Some((TypeBaseId::Entity(entity_type), old_name)) = self
            .property(placeholder)
            .map(|p| (p.declaring_type, p.name.clone()))
        else {
            return;
        };
        let new_name = self.unique_member_name(entity_type, &old_name);
        if let Some(property) = self.properties.get_mut(placeholder) {
            property.name = new_name.clone();
        }
        debug!(from = %old_name, to = %new_name, "placeholder renamed for a host member");
    }

    pub fn remove_property(&mut self, id: PropertyId, source: ConfigurationSource) -> bool {
        let Some(property) = self.property(id) else {
            return false;
        };
        if !source.overrides(Some(property.source)) {
            return false;
        }
        self.remove_property_unchecked(id);
        true
    }

    /// Keys and indexes using the property go with it; foreign keys whose
    /// properties were picked by convention fall back to fresh placeholders.
    pub(crate) fn remove_property_unchecked(&mut self, id: PropertyId) {
        if !self.properties.contains(id) {
            return;
        }
        self.batch(|m| {
            let foreign_keys: Vec<_> = m
                .foreign_keys
                .iter()
                .filter(|(_, fk)| fk.properties.contains(&id))
                .map(|(fk_id, fk)| (fk_id, fk.properties_source))
                .collect();
            for (fk, properties_source) in foreign_keys {
                if ConfigurationSource::Convention.overrides(properties_source) {
                    m.reset_foreign_key_properties(fk);
                } else {
                    m.remove_foreign_key_unchecked(fk);
                }
            }
            let keys: Vec<_> = m
                .keys
                .iter()
                .filter(|(_, k)| k.properties.contains(&id))
                .map(|(k, _)| k)
                .collect();
            for key in keys {
                m.remove_key_unchecked(key);
            }
            let indexes: Vec<_> = m
                .indexes
                .iter()
                .filter(|(_, i)| i.properties.contains(&id))
                .map(|(i, _)| i)
                .collect();
            for index in indexes {
                m.remove_index_unchecked(index);
            }

            let Some(removed) = m.properties.remove(id) else {
                return;
            };
            match removed.declaring_type {
                TypeBaseId::Entity(e) => {
                    if let Some(entity) = m.entity_types.get_mut(e) {
                        entity.properties.retain(|p| *p != id);
                    }
                }
                TypeBaseId::Complex(c) => {
                    if let Some(complex) = m.complex_types.get_mut(c) {
                        complex.properties.retain(|p| *p != id);
                    }
                }
            }
            let declaring_type = removed.declaring_type;
            m.on_property_removed(declaring_type, removed);
        });
    }

    pub fn is_key_property(&self, id: PropertyId) -> bool {
        self.keys.iter().any(|(_, k)| k.properties.contains(&id))
    }

    /// Key properties can never become nullable.
    pub fn set_property_nullable(
        &mut self,
        id: PropertyId,
        nullable: bool,
        source: ConfigurationSource,
    ) -> bool {
        if nullable && self.is_key_property(id) {
            debug!(property = %self.property_name(id), "key properties cannot be nullable");
            return false;
        }
        let write = match self.properties.get_mut(id) {
            Some(property) => property.nullable.try_set(nullable, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_property_nullability_changed(id, nullable);
                true
            }
        }
    }

    pub fn set_property_field(
        &mut self,
        id: PropertyId,
        field: Option<&str>,
        source: ConfigurationSource,
    ) -> bool {
        let new = field.map(str::to_string);
        let write = match self.properties.get_mut(id) {
            Some(property) => property.field.try_set(new.clone(), source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(old) => {
                self.on_property_field_changed(id, new, old);
                true
            }
        }
    }

    pub fn set_property_value_generated(
        &mut self,
        id: PropertyId,
        value_generated: ValueGenerated,
        source: ConfigurationSource,
    ) -> bool {
        self.properties
            .get_mut(id)
            .is_some_and(|p| p.value_generated.try_set(value_generated, source).applied())
    }

    pub fn set_property_element_type(
        &mut self,
        id: PropertyId,
        element_type: Option<ValueType>,
        source: ConfigurationSource,
    ) -> bool {
        let write = match self.properties.get_mut(id) {
            Some(property) => property.element_type.try_set(element_type.clone(), source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(old) => {
                self.on_property_element_type_changed(id, element_type, old);
                true
            }
        }
    }

    // ------------------------------------------------------------------------
    // Complex properties
    // ------------------------------------------------------------------------

    /// Add a complex property whose value is an instance of `host_type`. The
    /// owned complex type is created with it.
    pub fn add_complex_property(
        &mut self,
        declaring_type: TypeBaseId,
        name: &str,
        host_type: &str,
        collection: bool,
        source: ConfigurationSource,
    ) -> Option<ComplexPropertyId> {
        if !self.type_exists(declaring_type) {
            return None;
        }
        let existing = self
            .make_room_for_member(declaring_type, name, source, |m| {
                matches!(m, Member::ComplexProperty(_))
            })
            .ok()?;
        if let Some(Member::ComplexProperty(existing)) = existing {
            if let Some(property) = self.complex_properties.get_mut(existing) {
                property.source = source.max(Some(property.source));
            }
            return Some(existing);
        }

        let id = self.complex_properties.next_id();
        let complex_type = self.complex_types.insert(ComplexType {
            name: format!("{}.{name}#{host_type}", self.type_name(declaring_type)),
            host_type: host_type.to_string(),
            owner: id,
            properties: Vec::new(),
            complex_properties: Vec::new(),
            ignored_members: BTreeMap::new(),
            annotations: Annotations::default(),
        });
        let inserted = self.complex_properties.insert(ComplexProperty {
            name: name.to_string(),
            declaring_type,
            complex_type,
            collection,
            source,
            nullable: Facet::unset(false),
        });
        debug_assert_eq!(inserted, id);
        match declaring_type {
            TypeBaseId::Entity(e) => {
                if let Some(entity) = self.entity_types.get_mut(e) {
                    entity.complex_properties.push(id);
                }
            }
            TypeBaseId::Complex(c) => {
                if let Some(complex) = self.complex_types.get_mut(c) {
                    complex.complex_properties.push(id);
                }
            }
        }
        self.on_complex_property_added(id)
    }

    pub fn remove_complex_property(
        &mut self,
        id: ComplexPropertyId,
        source: ConfigurationSource,
    ) -> bool {
        let Some(property) = self.complex_property(id) else {
            return false;
        };
        if !source.overrides(Some(property.source)) {
            return false;
        }
        self.remove_complex_property_unchecked(id);
        true
    }

    pub(crate) fn remove_complex_property_unchecked(&mut self, id: ComplexPropertyId) {
        self.batch(|m| {
            let Some(property) = m.complex_property(id) else {
                return;
            };
            let complex_type = property.complex_type;
            if let Some(owned) = m.complex_type(complex_type) {
                let nested = owned.complex_properties.clone();
                let properties = owned.properties.clone();
                for nested in nested {
                    m.remove_complex_property_unchecked(nested);
                }
                for property in properties {
                    m.remove_property_unchecked(property);
                }
            }
            m.complex_types.remove(complex_type);
            let Some(removed) = m.complex_properties.remove(id) else {
                return;
            };
            match removed.declaring_type {
                TypeBaseId::Entity(e) => {
                    if let Some(entity) = m.entity_types.get_mut(e) {
                        entity.complex_properties.retain(|c| *c != id);
                    }
                }
                TypeBaseId::Complex(c) => {
                    if let Some(complex) = m.complex_types.get_mut(c) {
                        complex.complex_properties.retain(|p| *p != id);
                    }
                }
            }
            let declaring_type = removed.declaring_type;
            m.on_complex_property_removed(declaring_type, removed);
        });
    }

    pub fn set_complex_property_nullable(
        &mut self,
        id: ComplexPropertyId,
        nullable: bool,
        source: ConfigurationSource,
    ) -> bool {
        let write = match self.complex_properties.get_mut(id) {
            Some(property) => property.nullable.try_set(nullable, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_complex_property_nullability_changed(id, nullable);
                true
            }
        }
    }
}
