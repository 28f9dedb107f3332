//! Key and index mutations.

use tracing::debug;

use crate::annotations::Annotations;
use crate::arena::{EntityTypeId, IndexId, KeyId, PropertyId};
use crate::config_source::{ConfigurationSource, Facet, FacetWrite};
use crate::error::ModelError;
use crate::key::{Index, Key};
use crate::model::Model;

impl Model {
    fn validate_key_request(
        &self,
        entity: EntityTypeId,
        properties: &[PropertyId],
    ) -> Result<(), ModelError> {
        let entity_type = self.entity_type(entity).ok_or_else(|| ModelError::Missing {
            kind: "entity type",
            id: entity.to_string(),
        })?;
        if properties.is_empty() {
            return Err(ModelError::EmptyKey {
                entity: entity_type.name.clone(),
            });
        }
        if let Some(base) = entity_type.base_type() {
            return Err(ModelError::KeyOnDerivedType {
                entity: entity_type.name.clone(),
                base: self
                    .entity_type(base)
                    .map(|b| b.name.clone())
                    .unwrap_or_default(),
            });
        }
        let visible = self.properties_of(entity);
        if let Some(foreign) = properties.iter().find(|p| !visible.contains(p)) {
            return Err(ModelError::ForeignProperty {
                entity: entity_type.name.clone(),
                property: self.property_name(*foreign).to_string(),
            });
        }
        Ok(())
    }

    /// Make `properties` the primary key of `entity`.
    ///
    /// `Ok(None)` is a precedence loss. A replaced primary key survives as an
    /// alternate key while some foreign key still references it.
    pub fn set_primary_key(
        &mut self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<Option<KeyId>, ModelError> {
        self.validate_key_request(entity, properties)?;
        let Some(entity_type) = self.entity_type(entity) else {
            return Ok(None);
        };
        if !entity_type.primary_key.can_set(source) {
            debug!(entity_type = %entity_type.name, %source, "primary key change rejected");
            return Ok(None);
        }
        let old = entity_type.primary_key.get();
        if let Some(old_key) = old {
            if self.key(old_key).is_some_and(|k| k.properties == properties) {
                if let Some(entity_type) = self.entity_types.get_mut(entity) {
                    entity_type.primary_key.promote(source);
                }
                if let Some(key) = self.keys.get_mut(old_key) {
                    key.source = source.max(Some(key.source));
                }
                return Ok(Some(old_key));
            }
        }

        let key = self.batch(|m| {
            let key = m.add_key_unchecked(entity, properties, source);
            if let Some(entity_type) = m.entity_types.get_mut(entity) {
                entity_type.primary_key.try_set(Some(key), source);
            }
            for property in properties {
                if m.property(*property).is_some_and(|p| p.is_nullable()) {
                    m.set_property_nullable(*property, false, source);
                }
            }
            if let Some(old_key) = old {
                m.release_replaced_key(old_key, source);
            }
            m.on_entity_type_primary_key_changed(entity, Some(key), old);
            key
        });
        Ok(Some(key))
    }

    /// Drop a key that stopped being primary unless something still needs it.
    /// Convention relationships are re-discovered against the new key.
    fn release_replaced_key(&mut self, key: KeyId, source: ConfigurationSource) {
        let convention_foreign_keys: Vec<_> = self
            .foreign_keys
            .iter()
            .filter(|(_, fk)| {
                fk.principal_key == key
                    && fk.source == ConfigurationSource::Convention
                    && ConfigurationSource::Convention.overrides(fk.properties_source)
            })
            .map(|(id, _)| id)
            .collect();
        for fk in convention_foreign_keys {
            self.remove_foreign_key_unchecked(fk);
        }
        let removable = self
            .key(key)
            .is_some_and(|k| source.overrides(Some(k.source)));
        if removable && !self.is_key_referenced(key) {
            self.remove_key_unchecked(key);
        }
    }

    pub fn remove_primary_key(&mut self, entity: EntityTypeId, source: ConfigurationSource) -> bool {
        let Some(entity_type) = self.entity_type(entity) else {
            return false;
        };
        if !entity_type.primary_key.can_set(source) {
            return false;
        }
        let Some(old) = entity_type.primary_key.get() else {
            return true;
        };
        self.batch(|m| {
            if let Some(entity_type) = m.entity_types.get_mut(entity) {
                entity_type.primary_key.try_set(None, source);
            }
            m.release_replaced_key(old, source);
            m.on_entity_type_primary_key_changed(entity, None, Some(old));
        });
        true
    }

    /// Add (or re-affirm) an alternate key.
    pub fn add_key(
        &mut self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<Option<KeyId>, ModelError> {
        self.validate_key_request(entity, properties)?;
        Ok(Some(self.add_key_unchecked(entity, properties, source)))
    }

    fn add_key_unchecked(
        &mut self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> KeyId {
        if let Some(existing) = self.find_key(entity, properties) {
            if let Some(key) = self.keys.get_mut(existing) {
                key.source = source.max(Some(key.source));
            }
            return existing;
        }
        let id = self.keys.insert(Key {
            entity_type: entity,
            properties: properties.to_vec(),
            source,
            annotations: Annotations::default(),
        });
        if let Some(entity_type) = self.entity_types.get_mut(entity) {
            entity_type.keys.push(id);
        }
        self.on_key_added(id);
        id
    }

    pub fn remove_key(&mut self, key: KeyId, source: ConfigurationSource) -> bool {
        let Some(existing) = self.key(key) else {
            return false;
        };
        if !source.overrides(Some(existing.source)) {
            return false;
        }
        self.remove_key_unchecked(key);
        true
    }

    /// Referencing foreign keys are removed first; removing the primary key
    /// clears it on the entity type.
    pub(crate) fn remove_key_unchecked(&mut self, key: KeyId) {
        self.batch(|m| {
            let Some(entity) = m.key(key).map(|k| k.entity_type) else {
                return;
            };
            let referencing: Vec<_> = m
                .foreign_keys
                .iter()
                .filter(|(_, fk)| fk.principal_key == key)
                .map(|(id, _)| id)
                .collect();
            for fk in referencing {
                m.remove_foreign_key_unchecked(fk);
            }
            let was_primary = m
                .entity_type(entity)
                .is_some_and(|e| e.primary_key.get() == Some(key));
            if was_primary {
                if let Some(entity_type) = m.entity_types.get_mut(entity) {
                    entity_type.primary_key.reset(None);
                }
                m.on_entity_type_primary_key_changed(entity, None, Some(key));
            }
            if let Some(entity_type) = m.entity_types.get_mut(entity) {
                entity_type.keys.retain(|k| *k != key);
            }
            if let Some(removed) = m.keys.remove(key) {
                m.on_key_removed(entity, removed);
            }
        });
    }

    // ------------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------------

    pub fn add_index(
        &mut self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        name: Option<&str>,
        source: ConfigurationSource,
    ) -> Option<IndexId> {
        if properties.is_empty() || !self.entity_types.contains(entity) {
            return None;
        }
        let visible = self.properties_of(entity);
        if properties.iter().any(|p| !visible.contains(p)) {
            return None;
        }
        let existing = self.entity_type(entity)?.indexes.iter().copied().find(|i| {
            self.index(*i)
                .is_some_and(|i| i.properties == properties && i.name.as_deref() == name)
        });
        if let Some(existing) = existing {
            if let Some(index) = self.indexes.get_mut(existing) {
                index.source = source.max(Some(index.source));
            }
            return Some(existing);
        }
        let id = self.indexes.insert(Index {
            entity_type: entity,
            properties: properties.to_vec(),
            name: name.map(str::to_string),
            unique: Facet::unset(false),
            source,
            annotations: Annotations::default(),
        });
        if let Some(entity_type) = self.entity_types.get_mut(entity) {
            entity_type.indexes.push(id);
        }
        self.on_index_added(id)
    }

    pub fn remove_index(&mut self, index: IndexId, source: ConfigurationSource) -> bool {
        let Some(existing) = self.index(index) else {
            return false;
        };
        if !source.overrides(Some(existing.source)) {
            return false;
        }
        self.remove_index_unchecked(index);
        true
    }

    pub(crate) fn remove_index_unchecked(&mut self, index: IndexId) {
        let Some(removed) = self.indexes.remove(index) else {
            return;
        };
        let entity = removed.entity_type;
        if let Some(entity_type) = self.entity_types.get_mut(entity) {
            entity_type.indexes.retain(|i| *i != index);
        }
        self.on_index_removed(entity, removed);
    }

    pub fn set_index_unique(
        &mut self,
        index: IndexId,
        unique: bool,
        source: ConfigurationSource,
    ) -> bool {
        let write = match self.indexes.get_mut(index) {
            Some(existing) => existing.unique.try_set(unique, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_index_uniqueness_changed(index, unique);
                true
            }
        }
    }
}
