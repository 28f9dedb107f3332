//! Synthesizes join entity types for collection/collection relationships.
//!
//! A pair of inverse skip navigations without foreign keys gets a shadow
//! entity type named after both ends (`PostTag`), one relationship from it to
//! each end and a composite primary key over both foreign keys. The join
//! type is dropped again once its skip navigations are gone.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    EntityTypePrimaryKeyChangedConvention, SkipNavigationAddedConvention,
    SkipNavigationForeignKeyChangedConvention, SkipNavigationInverseChangedConvention,
    SkipNavigationRemovedConvention,
};
use modelforge_metadata::{
    codes, ConfigurationSource, Convention, ConventionContext, ConventionSet, DiagnosticLevel,
    EntityTypeId, ForeignKeyId, KeyId, Model, PropertyId, SkipNavigation, SkipNavigationId,
};
use tracing::debug;

const CONVENTION: ConfigurationSource = ConfigurationSource::Convention;

pub struct ManyToManyJoinTypeConvention;

/// The join type a skip navigation currently runs through.
fn join_type_of(model: &Model, skip: &SkipNavigation) -> Option<EntityTypeId> {
    skip.foreign_key()
        .and_then(|fk| model.foreign_key(fk))
        .map(|fk| fk.declaring_type)
}

fn is_convention_join(model: &Model, join: EntityTypeId) -> bool {
    model
        .entity_type(join)
        .is_some_and(|e| e.is_shadow() && e.source == CONVENTION)
}

fn join_type_name(model: &Model, left: EntityTypeId, right: EntityTypeId) -> String {
    let base = format!(
        "{}{}",
        model.type_name(left.into()),
        model.type_name(right.into())
    );
    let taken = |name: &str| model.find_entity_type(name).is_some() || model.is_ignored(name).is_some();
    if !taken(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|name| !taken(name))
        .unwrap_or(base)
}

impl ManyToManyJoinTypeConvention {
    fn ensure_join(model: &mut Model, skip: SkipNavigationId) {
        let Some(this) = model.skip_navigation(skip) else {
            return;
        };
        let Some(inverse) = this.inverse() else {
            return;
        };
        let Some(other) = model.skip_navigation(inverse) else {
            return;
        };
        if other.inverse() != Some(skip) || !this.collection || !other.collection {
            return;
        }
        if this.foreign_key().is_some() && other.foreign_key().is_some() {
            return;
        }
        if !this.foreign_key.can_set(CONVENTION) || !other.foreign_key.can_set(CONVENTION) {
            return;
        }
        let stale = join_type_of(model, this)
            .or_else(|| join_type_of(model, other))
            .filter(|join| is_convention_join(model, *join));

        // Order both ends by type name, then navigation name.
        let mut ends = [
            (model.type_name(this.declaring_type.into()), this.name.clone(), skip, this.declaring_type),
            (model.type_name(other.declaring_type.into()), other.name.clone(), inverse, other.declaring_type),
        ];
        ends.sort();
        let [(_, _, left_skip, left), (_, _, right_skip, right)] = ends;

        if model.primary_key(left).is_none() || model.primary_key(right).is_none() {
            let message = format!(
                "join type between `{}` and `{}` waits for both primary keys",
                model.type_name(left.into()),
                model.type_name(right.into())
            );
            model.report(DiagnosticLevel::Debug, codes::RELATIONSHIP_DEFERRED, message);
            return;
        }

        model.batch(|m| {
            if let Some(stale) = stale {
                m.remove_entity_type(stale, CONVENTION);
            }
            let name = join_type_name(m, left, right);
            let Some(join) = m.add_entity_type(&name, None, CONVENTION) else {
                return;
            };
            let (Some(left_fk), Some(right_fk)) = (
                m.add_relationship(join, left, None, None, CONVENTION),
                m.add_relationship(join, right, None, None, CONVENTION),
            ) else {
                m.remove_entity_type(join, CONVENTION);
                return;
            };
            let key: Vec<PropertyId> = [left_fk, right_fk]
                .iter()
                .filter_map(|fk| m.foreign_key(*fk))
                .flat_map(|fk| fk.properties.clone())
                .collect();
            if let Err(err) = m.set_primary_key(join, &key, CONVENTION) {
                debug!(join_type = %name, error = %err, "join type key rejected");
            }
            for (skip, fk) in [(left_skip, left_fk), (right_skip, right_fk)] {
                m.set_skip_navigation_foreign_key(skip, Some(fk), CONVENTION);
            }
            debug!(join_type = %name, "many-to-many join type created");
        });
    }

    fn drop_orphan(model: &mut Model, join: EntityTypeId) {
        if !is_convention_join(model, join) {
            return;
        }
        let used = model.skip_navigations().any(|(_, s)| {
            s.foreign_key()
                .and_then(|fk| model.foreign_key(fk))
                .is_some_and(|fk| fk.declaring_type == join)
        });
        if !used {
            debug!(join_type = %model.type_name(join.into()), "orphaned join type removed");
            model.remove_entity_type(join, CONVENTION);
        }
    }

    fn pending_for(model: &Model, entity_type: EntityTypeId) -> Vec<SkipNavigationId> {
        model
            .skip_navigations()
            .filter(|(_, s)| {
                s.foreign_key().is_none()
                    && (model.is_same_hierarchy(s.declaring_type, entity_type)
                        || model.is_same_hierarchy(s.target_type, entity_type))
            })
            .map(|(id, _)| id)
            .collect()
    }
}

impl Convention for ManyToManyJoinTypeConvention {
    fn name(&self) -> &'static str {
        "many_to_many_join_type"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.skip_navigation_added.push(self.clone());
        set.skip_navigation_inverse_changed.push(self.clone());
        set.skip_navigation_foreign_key_changed.push(self.clone());
        set.skip_navigation_removed.push(self.clone());
        set.entity_type_primary_key_changed.push(self);
    }
}

impl SkipNavigationAddedConvention for ManyToManyJoinTypeConvention {
    fn process_skip_navigation_added(
        &self,
        model: &mut Model,
        navigation: SkipNavigationId,
        _context: &mut ConventionContext<SkipNavigationId>,
    ) {
        Self::ensure_join(model, navigation);
    }
}

impl SkipNavigationInverseChangedConvention for ManyToManyJoinTypeConvention {
    fn process_skip_navigation_inverse_changed(
        &self,
        model: &mut Model,
        navigation: SkipNavigationId,
        new: Option<SkipNavigationId>,
        _old: Option<SkipNavigationId>,
        _context: &mut ConventionContext<Option<SkipNavigationId>>,
    ) {
        if new.is_some() {
            Self::ensure_join(model, navigation);
        }
    }
}

impl SkipNavigationForeignKeyChangedConvention for ManyToManyJoinTypeConvention {
    fn process_skip_navigation_foreign_key_changed(
        &self,
        model: &mut Model,
        navigation: SkipNavigationId,
        new: Option<ForeignKeyId>,
        _old: Option<ForeignKeyId>,
        _context: &mut ConventionContext<Option<ForeignKeyId>>,
    ) {
        if new.is_none() {
            Self::ensure_join(model, navigation);
        }
    }
}

impl SkipNavigationRemovedConvention for ManyToManyJoinTypeConvention {
    fn process_skip_navigation_removed(
        &self,
        model: &mut Model,
        _declaring_type: EntityTypeId,
        removed: &SkipNavigation,
        _context: &mut ConventionContext<()>,
    ) {
        if let Some(join) = join_type_of(model, removed) {
            Self::drop_orphan(model, join);
        }
    }
}

impl EntityTypePrimaryKeyChangedConvention for ManyToManyJoinTypeConvention {
    fn process_entity_type_primary_key_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        new: Option<KeyId>,
        _old: Option<KeyId>,
        _context: &mut ConventionContext<Option<KeyId>>,
    ) {
        if new.is_none() {
            return;
        }
        for skip in Self::pending_for(model, entity_type) {
            Self::ensure_join(model, skip);
        }
    }
}
