//! Keeps an index on the properties of every foreign key.
//!
//! The index is unnamed, stamped `Convention` and unique exactly when every
//! foreign key sharing the property list is unique. A key or a configured
//! index starting with the same properties makes it unnecessary.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    EntityTypeBaseTypeChangedConvention, ForeignKeyAddedConvention,
    ForeignKeyPrincipalEndChangedConvention, ForeignKeyPropertiesChangedConvention,
    ForeignKeyRemovedConvention, ForeignKeyUniquenessChangedConvention, IndexAddedConvention,
    IndexRemovedConvention, KeyAddedConvention, KeyRemovedConvention,
};
use modelforge_metadata::{
    ConfigurationSource, Convention, ConventionContext, ConventionSet, EntityTypeId, ForeignKey,
    ForeignKeyId, Index, IndexId, Key, KeyId, Model, PropertyId,
};

const CONVENTION: ConfigurationSource = ConfigurationSource::Convention;

pub struct ForeignKeyIndexConvention;

fn is_managed(index: &Index) -> bool {
    index.source == CONVENTION && index.name.is_none()
}

impl ForeignKeyIndexConvention {
    /// Property lists needing an index on `entity_type`, with uniqueness.
    fn wanted(model: &Model, entity_type: EntityTypeId) -> Vec<(Vec<PropertyId>, bool)> {
        let Some(entity) = model.entity_type(entity_type) else {
            return Vec::new();
        };
        let mut wanted: Vec<(Vec<PropertyId>, bool)> = Vec::new();
        for fk in entity.foreign_keys.iter().filter_map(|fk| model.foreign_key(*fk)) {
            if fk.properties.is_empty() {
                continue;
            }
            match wanted.iter_mut().find(|(p, _)| *p == fk.properties) {
                Some((_, unique)) => *unique &= fk.is_unique(),
                None => wanted.push((fk.properties.clone(), fk.is_unique())),
            }
        }
        let lists: Vec<Vec<PropertyId>> = wanted.iter().map(|(p, _)| p.clone()).collect();
        wanted.retain(|(properties, unique)| {
            let longer_wanted = !unique
                && lists
                    .iter()
                    .any(|other| other.len() > properties.len() && other.starts_with(properties));
            !longer_wanted && !Self::covered(model, entity_type, properties, *unique)
        });
        wanted
    }

    fn covered(
        model: &Model,
        entity_type: EntityTypeId,
        properties: &[PropertyId],
        unique: bool,
    ) -> bool {
        let by_key = model
            .hierarchy_up(entity_type)
            .into_iter()
            .filter_map(|e| model.entity_type(e))
            .flat_map(|e| e.keys.iter())
            .filter_map(|k| model.key(*k))
            .any(|k| {
                if unique {
                    k.properties == properties
                } else {
                    k.properties.starts_with(properties)
                }
            });
        by_key
            || model
                .entity_type(entity_type)
                .into_iter()
                .flat_map(|e| e.indexes.iter())
                .filter_map(|i| model.index(*i))
                .filter(|i| !is_managed(i))
                .any(|i| {
                    if unique {
                        i.is_unique() && i.properties == properties
                    } else {
                        i.properties.starts_with(properties)
                    }
                })
    }

    fn refresh(model: &mut Model, entity_type: EntityTypeId) {
        let wanted = Self::wanted(model, entity_type);
        let stale: Vec<IndexId> = model
            .entity_type(entity_type)
            .into_iter()
            .flat_map(|e| e.indexes.iter().copied())
            .filter(|i| {
                model.index(*i).is_some_and(|index| {
                    is_managed(index) && !wanted.iter().any(|(p, _)| *p == index.properties)
                })
            })
            .collect();
        for index in stale {
            model.remove_index(index, CONVENTION);
        }
        for (properties, unique) in wanted {
            if let Some(index) = model.add_index(entity_type, &properties, None, CONVENTION) {
                model.set_index_unique(index, unique, CONVENTION);
            }
        }
    }

    fn refresh_hierarchy(model: &mut Model, entity_type: EntityTypeId) {
        let mut affected = vec![entity_type];
        affected.extend(model.all_derived_types(entity_type));
        for entity_type in affected {
            Self::refresh(model, entity_type);
        }
    }

    fn refresh_foreign_key(model: &mut Model, fk: ForeignKeyId) {
        if let Some(fk) = model.foreign_key(fk) {
            let (dependent, principal) = (fk.declaring_type, fk.principal_type);
            Self::refresh(model, dependent);
            if principal != dependent {
                Self::refresh(model, principal);
            }
        }
    }
}

impl Convention for ForeignKeyIndexConvention {
    fn name(&self) -> &'static str {
        "foreign_key_index"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.foreign_key_added.push(self.clone());
        set.foreign_key_removed.push(self.clone());
        set.foreign_key_properties_changed.push(self.clone());
        set.foreign_key_principal_end_changed.push(self.clone());
        set.foreign_key_uniqueness_changed.push(self.clone());
        set.key_added.push(self.clone());
        set.key_removed.push(self.clone());
        set.index_added.push(self.clone());
        set.index_removed.push(self.clone());
        set.entity_type_base_type_changed.push(self);
    }
}

impl ForeignKeyAddedConvention for ForeignKeyIndexConvention {
    fn process_foreign_key_added(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::refresh_foreign_key(model, foreign_key);
    }
}

impl ForeignKeyRemovedConvention for ForeignKeyIndexConvention {
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

impl ForeignKeyPropertiesChangedConvention for ForeignKeyIndexConvention {
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

impl ForeignKeyPrincipalEndChangedConvention for ForeignKeyIndexConvention {
    fn process_foreign_key_principal_end_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::refresh_foreign_key(model, foreign_key);
    }
}

impl ForeignKeyUniquenessChangedConvention for ForeignKeyIndexConvention {
    fn process_foreign_key_uniqueness_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _unique: bool,
        _context: &mut ConventionContext<bool>,
    ) {
        Self::refresh_foreign_key(model, foreign_key);
    }
}

impl KeyAddedConvention for ForeignKeyIndexConvention {
    fn process_key_added(
        &self,
        model: &mut Model,
        key: KeyId,
        _context: &mut ConventionContext<KeyId>,
    ) {
        if let Some(entity_type) = model.key(key).map(|k| k.entity_type) {
            Self::refresh_hierarchy(model, entity_type);
        }
    }
}

impl KeyRemovedConvention for ForeignKeyIndexConvention {
    fn process_key_removed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _removed: &Key,
        _context: &mut ConventionContext<()>,
    ) {
        Self::refresh_hierarchy(model, entity_type);
    }
}

impl IndexAddedConvention for ForeignKeyIndexConvention {
    fn process_index_added(
        &self,
        model: &mut Model,
        index: IndexId,
        _context: &mut ConventionContext<IndexId>,
    ) {
        match model.index(index) {
            Some(added) if !is_managed(added) => {
                let entity_type = added.entity_type;
                Self::refresh(model, entity_type);
            }
            _ => {}
        }
    }
}

impl IndexRemovedConvention for ForeignKeyIndexConvention {
    fn process_index_removed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        removed: &Index,
        _context: &mut ConventionContext<()>,
    ) {
        if !is_managed(removed) {
            Self::refresh(model, entity_type);
        }
    }
}

impl EntityTypeBaseTypeChangedConvention for ForeignKeyIndexConvention {
    fn process_entity_type_base_type_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<EntityTypeId>,
        _old: Option<EntityTypeId>,
        _context: &mut ConventionContext<Option<EntityTypeId>>,
    ) {
        Self::refresh_hierarchy(model, entity_type);
    }
}
