//! Entity-type level mutations: add, ignore, remove, base type, member ignore.

use tracing::debug;

use crate::arena::EntityTypeId;
use crate::config_source::ConfigurationSource;
use crate::entity_type::{EntityType, TypeBaseId};
use crate::error::ModelError;
use crate::model::{Member, Model};

impl Model {
    /// Add (or re-affirm) the entity type `name`.
    ///
    /// Returns `None` when the name is ignored at a higher source, or when a
    /// rule removed the new type while reacting to it.
    pub fn add_entity_type(
        &mut self,
        name: &str,
        host_type: Option<&str>,
        source: ConfigurationSource,
    ) -> Option<EntityTypeId> {
        if let Some(ignored) = self.is_ignored(name) {
            if !source.overrides(Some(ignored)) {
                debug!(entity_type = name, %ignored, %source, "entity type is ignored");
                return None;
            }
            self.ignored_types.remove(name);
        }
        if let Some(existing) = self.find_entity_type(name) {
            if let Some(entity) = self.entity_types.get_mut(existing) {
                entity.source = source.max(Some(entity.source));
            }
            return Some(existing);
        }
        let id = self
            .entity_types
            .insert(EntityType::new(name, host_type, source));
        debug!(entity_type = name, %source, "entity type added");
        self.on_entity_type_added(id)
    }

    /// Ignore `name`, removing the entity type if it exists at a source the
    /// caller may override.
    pub fn ignore_entity_type(&mut self, name: &str, source: ConfigurationSource) -> bool {
        if let Some(existing) = self.find_entity_type(name) {
            let existing_source = self.entity_type(existing).map(|e| e.source);
            if !source.overrides(existing_source) {
                return false;
            }
            self.remove_entity_type_unchecked(existing);
        }
        let ignored = source.max(self.ignored_types.get(name).copied());
        self.ignored_types.insert(name.to_string(), ignored);
        self.on_entity_type_ignored(name.to_string());
        true
    }

    pub fn remove_entity_type(&mut self, id: EntityTypeId, source: ConfigurationSource) -> bool {
        let Some(entity) = self.entity_type(id) else {
            return false;
        };
        if !source.overrides(Some(entity.source)) {
            return false;
        }
        self.remove_entity_type_unchecked(id);
        true
    }

    /// Cascading removal. Derived types are re-parented onto the removed
    /// type's base; relationships pointing at it from elsewhere go with it.
    pub(crate) fn remove_entity_type_unchecked(&mut self, id: EntityTypeId) {
        self.batch(|m| {
            let Some(entity) = m.entity_type(id) else {
                return;
            };
            let base = entity.base_type();
            let own_foreign_keys = entity.foreign_keys.clone();
            let own_skip_navigations = entity.skip_navigations.clone();
            let triggers = entity.triggers.clone();
            let indexes = entity.indexes.clone();
            let keys = entity.keys.clone();
            let complex_properties = entity.complex_properties.clone();
            let properties = entity.properties.clone();

            for derived in m.derived_types(id) {
                m.force_base_type(derived, base);
            }

            for fk in m.referencing_foreign_keys(id) {
                m.remove_foreign_key_unchecked(fk);
            }
            let inbound_skips: Vec<_> = m
                .skip_navigations
                .iter()
                .filter(|(_, s)| s.target_type == id && s.declaring_type != id)
                .map(|(skip, _)| skip)
                .collect();
            for skip in inbound_skips {
                m.remove_skip_navigation_unchecked(skip);
            }

            for fk in own_foreign_keys {
                m.remove_foreign_key_unchecked(fk);
            }
            for skip in own_skip_navigations {
                m.remove_skip_navigation_unchecked(skip);
            }
            for trigger in triggers {
                m.remove_trigger_unchecked(trigger);
            }
            for index in indexes {
                m.remove_index_unchecked(index);
            }
            for key in keys {
                m.remove_key_unchecked(key);
            }
            for complex in complex_properties {
                m.remove_complex_property_unchecked(complex);
            }
            for property in properties {
                m.remove_property_unchecked(property);
            }

            if let Some(removed) = m.entity_types.remove(id) {
                debug!(entity_type = %removed.name, "entity type removed");
                m.on_entity_type_removed(id, removed);
            }
        });
    }

    /// Re-point `id` at `base` keeping the existing stamp; used when the old
    /// base disappears.
    fn force_base_type(&mut self, id: EntityTypeId, base: Option<EntityTypeId>) {
        let Some(entity) = self.entity_types.get_mut(id) else {
            return;
        };
        let old = entity.base_type();
        if old == base {
            return;
        }
        let source = entity.base_type.source();
        entity.base_type.reset(base);
        if let Some(source) = source {
            entity.base_type.promote(source);
        }
        self.on_entity_type_base_type_changed(id, base, old);
    }

    /// Set (or clear) the base type of `id`.
    ///
    /// `Ok(false)` is a precedence loss. The new base's hierarchy takes over
    /// any same-named properties `id` declared, and `id` drops its keys.
    pub fn set_base_type(
        &mut self,
        id: EntityTypeId,
        base: Option<EntityTypeId>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let entity = self.entity_type(id).ok_or_else(|| ModelError::Missing {
            kind: "entity type",
            id: id.to_string(),
        })?;
        if !entity.base_type.can_set(source) {
            debug!(entity_type = %entity.name, %source, "base type change rejected");
            return Ok(false);
        }
        let old = entity.base_type();
        if let Some(base) = base {
            let base_entity = self.entity_type(base).ok_or_else(|| ModelError::Missing {
                kind: "entity type",
                id: base.to_string(),
            })?;
            if base == id || self.ancestors(base).contains(&id) {
                return Err(ModelError::CyclicBaseType {
                    entity: entity.name.clone(),
                    base: base_entity.name.clone(),
                });
            }
        }
        if old == base {
            if let Some(entity) = self.entity_types.get_mut(id) {
                entity.base_type.promote(source);
            }
            return Ok(true);
        }

        self.batch(|m| {
            if let Some(entity) = m.entity_types.get_mut(id) {
                entity.base_type.try_set(base, source);
            }
            if let Some(base) = base {
                let keys = m.entity_type(id).map(|e| e.keys.clone()).unwrap_or_default();
                for key in keys {
                    m.remove_key_unchecked(key);
                }
                let mut affected = vec![id];
                affected.extend(m.all_derived_types(id));
                let redeclared: Vec<_> = affected
                    .into_iter()
                    .flat_map(|e| m.declared_properties(TypeBaseId::Entity(e)).to_vec())
                    .filter(|p| {
                        m.find_property(TypeBaseId::Entity(base), m.property_name(*p))
                            .is_some()
                    })
                    .collect();
                for property in redeclared {
                    m.remove_property_unchecked(property);
                }
            }
            m.on_entity_type_base_type_changed(id, base, old);
        });
        Ok(true)
    }

    /// Ignore the member `name` on `declaring_type`, removing it when it is
    /// declared there at a source the caller may override.
    pub fn ignore_member(
        &mut self,
        declaring_type: TypeBaseId,
        name: &str,
        source: ConfigurationSource,
    ) -> bool {
        if let Some(member) = self.find_member(declaring_type, name) {
            if self.member_declaring_type(member) != Some(declaring_type) {
                debug!(member = name, "cannot ignore an inherited member");
                return false;
            }
            if !source.overrides(self.member_source(member)) {
                return false;
            }
            self.remove_member_unchecked(member);
        }
        let Some(ignored) = self.ignored_members_mut(declaring_type) else {
            return false;
        };
        let stamp = source.max(ignored.get(name).copied());
        ignored.insert(name.to_string(), stamp);
        match declaring_type {
            TypeBaseId::Entity(e) => {
                self.on_entity_type_member_ignored(e, name.to_string());
            }
            TypeBaseId::Complex(c) => {
                self.on_complex_type_member_ignored(c, name.to_string());
            }
        }
        true
    }

    /// Lift an ignore so a member can be added at `source`. Returns `false`
    /// when the ignore outranks `source`.
    pub(crate) fn try_unignore_member(
        &mut self,
        declaring_type: TypeBaseId,
        name: &str,
        source: ConfigurationSource,
    ) -> bool {
        let Some(ignored) = self.is_member_ignored(declaring_type, name) else {
            return true;
        };
        if !source.overrides(Some(ignored)) {
            debug!(member = name, %ignored, %source, "member is ignored");
            return false;
        }
        if let Some(map) = self.ignored_members_mut(declaring_type) {
            map.remove(name);
        }
        true
    }

    fn ignored_members_mut(
        &mut self,
        id: TypeBaseId,
    ) -> Option<&mut std::collections::BTreeMap<String, ConfigurationSource>> {
        match id {
            TypeBaseId::Entity(e) => self.entity_types.get_mut(e).map(|e| &mut e.ignored_members),
            TypeBaseId::Complex(c) => {
                self.complex_types.get_mut(c).map(|c| &mut c.ignored_members)
            }
        }
    }

    pub fn member_source(&self, member: Member) -> Option<ConfigurationSource> {
        match member {
            Member::Property(p) => self.property(p).map(|p| p.source),
            Member::ComplexProperty(c) => self.complex_property(c).map(|c| c.source),
            Member::Navigation(n) => self.navigation(n).map(|n| n.source),
            Member::SkipNavigation(s) => self.skip_navigation(s).map(|s| s.source),
        }
    }

    pub fn member_declaring_type(&self, member: Member) -> Option<TypeBaseId> {
        match member {
            Member::Property(p) => self.property(p).map(|p| p.declaring_type),
            Member::ComplexProperty(c) => self.complex_property(c).map(|c| c.declaring_type),
            Member::Navigation(n) => self.navigation(n).map(|n| n.declaring_type.into()),
            Member::SkipNavigation(s) => self.skip_navigation(s).map(|s| s.declaring_type.into()),
        }
    }

    pub(crate) fn remove_member_unchecked(&mut self, member: Member) {
        match member {
            Member::Property(p) => self.remove_property_unchecked(p),
            Member::ComplexProperty(c) => self.remove_complex_property_unchecked(c),
            Member::Navigation(n) => self.remove_navigation_unchecked(n),
            Member::SkipNavigation(s) => self.remove_skip_navigation_unchecked(s),
        }
    }
}
