//! Foreign keys, navigations, skip navigations and triggers.

use tracing::debug;

use crate::annotations::Annotations;
use crate::arena::{
    EntityTypeId, ForeignKeyId, KeyId, NavigationId, PropertyId, SkipNavigationId, TriggerId,
};
use crate::config_source::{can_set, ConfigurationSource, Facet, FacetWrite};
use crate::diagnostics::{codes, DiagnosticLevel};
use crate::entity_type::{ConstructorBinding, Trigger, TypeBaseId};
use crate::foreign_key::{DeleteBehavior, ForeignKey, Navigation, SkipNavigation};
use crate::host::HostMember;
use crate::model::{Member, Model};

impl Model {
    // ------------------------------------------------------------------------
    // Foreign keys
    // ------------------------------------------------------------------------

    /// `true` when `properties` can point at `principal_key` from `dependent`.
    fn foreign_key_properties_fit(
        &self,
        dependent: EntityTypeId,
        principal_key: KeyId,
        properties: &[PropertyId],
    ) -> bool {
        let Some(key) = self.key(principal_key) else {
            return false;
        };
        if key.properties.len() != properties.len() {
            return false;
        }
        let visible = self.properties_of(dependent);
        properties.iter().zip(&key.properties).all(|(dep, principal)| {
            visible.contains(dep)
                && match (self.property(*dep), self.property(*principal)) {
                    (Some(dep), Some(principal)) => {
                        dep.value_type.is_compatible_with(&principal.value_type)
                    }
                    _ => false,
                }
        })
    }

    fn find_foreign_key(
        &self,
        dependent: EntityTypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
        principal: EntityTypeId,
    ) -> Option<ForeignKeyId> {
        self.foreign_keys_of(dependent).into_iter().find(|fk| {
            self.foreign_key(*fk).is_some_and(|fk| {
                fk.properties == properties
                    && fk.principal_key == principal_key
                    && fk.principal_type == principal
            })
        })
    }

    /// Add a foreign key with explicit dependent properties.
    ///
    /// `principal_key` defaults to the principal's primary key. Returns the
    /// existing foreign key when the same triple is already declared.
    pub fn add_foreign_key(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        principal_key: Option<KeyId>,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Option<ForeignKeyId> {
        if !self.entity_types.contains(dependent) {
            return None;
        }
        let principal_key = principal_key.or_else(|| self.primary_key(principal))?;
        if !self.foreign_key_properties_fit(dependent, principal_key, properties) {
            debug!(
                dependent = %self.type_name(dependent.into()),
                "foreign key properties do not match the principal key"
            );
            return None;
        }
        if let Some(existing) = self.find_foreign_key(dependent, properties, principal_key, principal)
        {
            if let Some(fk) = self.foreign_keys.get_mut(existing) {
                fk.source = source.max(Some(fk.source));
                fk.properties_source = Some(source.max(fk.properties_source));
            }
            return Some(existing);
        }
        let id = self.insert_foreign_key(
            dependent,
            principal,
            principal_key,
            properties.to_vec(),
            Some(source),
            source,
        );
        self.on_foreign_key_added(id)
    }

    fn insert_foreign_key(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        principal_key: KeyId,
        properties: Vec<PropertyId>,
        properties_source: Option<ConfigurationSource>,
        source: ConfigurationSource,
    ) -> ForeignKeyId {
        let id = self.foreign_keys.insert(ForeignKey {
            declaring_type: dependent,
            properties,
            properties_source,
            principal_key,
            principal_type: principal,
            principal_end_source: None,
            unique: Facet::unset(false),
            required: Facet::unset(false),
            required_dependent: Facet::unset(false),
            ownership: Facet::unset(false),
            delete_behavior: Facet::default(),
            dependent_to_principal: None,
            principal_to_dependent: None,
            source,
            annotations: Annotations::default(),
        });
        if let Some(entity) = self.entity_types.get_mut(dependent) {
            entity.foreign_keys.push(id);
        }
        id
    }

    /// Synthesize nullable shadow properties mirroring `principal_key`,
    /// named `<navigation><key property>` or `<principal type><key property>`.
    fn create_shadow_foreign_key_properties(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        principal_key: KeyId,
        navigation: Option<&str>,
    ) -> Option<Vec<PropertyId>> {
        let prefix = match navigation {
            Some(navigation) => navigation.to_string(),
            None => self.entity_type(principal)?.name.clone(),
        };
        let key_properties = self.key(principal_key)?.properties.clone();
        let mut created = Vec::with_capacity(key_properties.len());
        for key_property in key_properties {
            let property = self.property(key_property)?;
            let value_type = property.value_type.as_nullable();
            let name = self.unique_member_name(dependent, &format!("{prefix}{}", property.name));
            let id = self.add_property(
                TypeBaseId::Entity(dependent),
                &name,
                value_type,
                true,
                ConfigurationSource::Convention,
            )?;
            created.push(id);
        }
        Some(created)
    }

    /// Create a relationship whose dependent properties are placeholders for
    /// discovery to replace, plus its navigations.
    ///
    /// Returns `None` while the principal has no primary key.
    pub fn add_relationship(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        to_principal: Option<&str>,
        to_dependent: Option<&str>,
        source: ConfigurationSource,
    ) -> Option<ForeignKeyId> {
        if !self.entity_types.contains(dependent) {
            return None;
        }
        let Some(principal_key) = self.primary_key(principal) else {
            let message = format!(
                "relationship from `{}` to `{}` waits for a primary key on the principal",
                self.type_name(dependent.into()),
                self.type_name(principal.into()),
            );
            self.report(DiagnosticLevel::Debug, codes::RELATIONSHIP_DEFERRED, message);
            return None;
        };
        let unique = to_dependent.is_some_and(|name| self.is_reference_member(principal, name));
        self.batch(|m| {
            let properties =
                m.create_shadow_foreign_key_properties(dependent, principal, principal_key, to_principal)?;
            let fk = m.insert_foreign_key(dependent, principal, principal_key, properties, None, source);
            m.on_foreign_key_added(fk);
            if unique {
                m.set_foreign_key_unique(fk, true, source);
            }
            if let Some(name) = to_principal {
                m.add_navigation(fk, name, true, source);
            }
            if let Some(name) = to_dependent {
                m.add_navigation(fk, name, false, source);
            }
            Some(fk)
        })
        .filter(|fk| self.foreign_keys.contains(*fk))
    }

    fn is_reference_member(&self, entity: EntityTypeId, name: &str) -> bool {
        self.host_members_in_scope(entity)
            .into_iter()
            .find(|m| m.name == name)
            .is_some_and(|m| !m.ty.is_collection())
    }

    /// Host members visible on `entity`: those of its host type and of every
    /// host ancestor below the host type of its mapped base.
    pub fn host_members_in_scope(&self, entity: EntityTypeId) -> Vec<&HostMember> {
        let Some(host_type) = self.host_type_of(entity) else {
            return Vec::new();
        };
        let mapped_base = self
            .entity_type(entity)
            .and_then(|e| e.base_type())
            .and_then(|b| self.entity_type(b))
            .and_then(|b| b.host_type.clone());
        let mut scope = vec![host_type.name.clone()];
        for ancestor in self.host.ancestors(&host_type.name) {
            if Some(&ancestor) == mapped_base.as_ref() {
                break;
            }
            scope.push(ancestor);
        }
        scope
            .iter()
            .filter_map(|name| self.host.get(name))
            .flat_map(|host| host.members.iter())
            .collect()
    }

    pub fn remove_foreign_key(&mut self, id: ForeignKeyId, source: ConfigurationSource) -> bool {
        let Some(fk) = self.foreign_key(id) else {
            return false;
        };
        if !source.overrides(Some(fk.source)) {
            return false;
        }
        self.remove_foreign_key_unchecked(id);
        true
    }

    /// Navigations go with the foreign key; placeholder properties nothing
    /// else uses are dropped afterwards.
    pub(crate) fn remove_foreign_key_unchecked(&mut self, id: ForeignKeyId) {
        self.batch(|m| {
            let Some(fk) = m.foreign_key(id) else {
                return;
            };
            let navigations: Vec<_> = fk.navigations().collect();
            for navigation in navigations {
                m.detach_navigation(navigation);
            }
            let skips: Vec<_> = m
                .skip_navigations
                .iter()
                .filter(|(_, s)| s.foreign_key() == Some(id))
                .map(|(s, _)| s)
                .collect();
            for skip in skips {
                if let Some(s) = m.skip_navigations.get_mut(skip) {
                    s.foreign_key.reset(None);
                }
                m.on_skip_navigation_foreign_key_changed(skip, None, Some(id));
            }
            let Some(removed) = m.foreign_keys.remove(id) else {
                return;
            };
            let dependent = removed.declaring_type;
            if let Some(entity) = m.entity_types.get_mut(dependent) {
                entity.foreign_keys.retain(|fk| *fk != id);
            }
            let properties = removed.properties.clone();
            debug!(dependent = %m.type_name(dependent.into()), "foreign key removed");
            m.on_foreign_key_removed(dependent, removed);
            m.remove_unused_implicit_properties(&properties);
        });
    }

    /// Indexes do not keep a placeholder alive; they go with the property.
    fn remove_unused_implicit_properties(&mut self, properties: &[PropertyId]) {
        for property in properties {
            let unused = self.property(*property).is_some_and(|p| {
                p.is_implicit()
                    && !self.is_key_property(*property)
                    && !self
                        .foreign_keys
                        .iter()
                        .any(|(_, fk)| fk.properties.contains(property))
            });
            if unused {
                self.remove_property_unchecked(*property);
            }
        }
    }

    /// Point `fk` at `properties`. Fails on a precedence loss, on a mismatch
    /// with the principal key, or when another foreign key on the dependent
    /// already uses the same properties for the same principal key.
    pub fn set_foreign_key_properties(
        &mut self,
        id: ForeignKeyId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> bool {
        let Some(fk) = self.foreign_key(id) else {
            return false;
        };
        if !can_set(fk.properties_source, source) {
            return false;
        }
        let (dependent, principal, principal_key) =
            (fk.declaring_type, fk.principal_type, fk.principal_key);
        if fk.properties == properties {
            if let Some(fk) = self.foreign_keys.get_mut(id) {
                fk.properties_source = Some(source.max(fk.properties_source));
            }
            return true;
        }
        if !self.foreign_key_properties_fit(dependent, principal_key, properties) {
            return false;
        }
        if self
            .find_foreign_key(dependent, properties, principal_key, principal)
            .is_some_and(|other| other != id)
        {
            return false;
        }
        let old = match self.foreign_keys.get_mut(id) {
            Some(fk) => {
                fk.properties_source = Some(source);
                std::mem::replace(&mut fk.properties, properties.to_vec())
            }
            None => return false,
        };
        debug!(
            dependent = %self.type_name(dependent.into()),
            properties = ?self.property_names(properties),
            %source,
            "foreign key properties set"
        );
        self.on_foreign_key_properties_changed(id, old.clone(), principal_key);
        self.remove_unused_implicit_properties(&old);
        true
    }

    /// Give the properties of `fk` back to discovery. Fresh placeholders
    /// replace them when `source` may override whoever chose them.
    pub fn release_foreign_key_properties(
        &mut self,
        id: ForeignKeyId,
        source: ConfigurationSource,
    ) -> bool {
        let Some(fk) = self.foreign_key(id) else {
            return false;
        };
        match fk.properties_source {
            None => true,
            Some(existing) if source.overrides(Some(existing)) => {
                self.reset_foreign_key_properties(id);
                true
            }
            Some(_) => false,
        }
    }

    /// Replace the properties of `fk` with fresh placeholders and forget who
    /// chose the old ones.
    pub(crate) fn reset_foreign_key_properties(&mut self, id: ForeignKeyId) {
        let Some(fk) = self.foreign_key(id) else {
            return;
        };
        let (dependent, principal, principal_key) =
            (fk.declaring_type, fk.principal_type, fk.principal_key);
        let navigation = fk
            .dependent_to_principal
            .and_then(|n| self.navigation(n))
            .map(|n| n.name.clone());
        let Some(shadow) = self.create_shadow_foreign_key_properties(
            dependent,
            principal,
            principal_key,
            navigation.as_deref(),
        ) else {
            self.remove_foreign_key_unchecked(id);
            return;
        };
        let old = match self.foreign_keys.get_mut(id) {
            Some(fk) => {
                fk.properties_source = None;
                std::mem::replace(&mut fk.properties, shadow)
            }
            None => return,
        };
        self.on_foreign_key_properties_changed(id, old.clone(), principal_key);
        self.remove_unused_implicit_properties(&old);
    }

    /// Make `principal` the principal end of `fk`. Passing the current
    /// dependent inverts a one-to-one relationship: properties become fresh
    /// placeholders on the new dependent and the navigations swap sides.
    pub fn set_principal_end(
        &mut self,
        id: ForeignKeyId,
        principal: EntityTypeId,
        source: ConfigurationSource,
    ) -> bool {
        let Some(fk) = self.foreign_key(id) else {
            return false;
        };
        if !can_set(fk.principal_end_source, source) {
            return false;
        }
        if fk.principal_type == principal {
            let newly_known = fk.principal_end_source.is_none();
            if let Some(fk) = self.foreign_keys.get_mut(id) {
                fk.principal_end_source = Some(source.max(fk.principal_end_source));
            }
            // A known end makes the dependent's primary key eligible.
            if newly_known {
                self.on_foreign_key_principal_end_changed(id);
            }
            return true;
        }
        if fk.declaring_type != principal {
            return false;
        }
        let to_dependent_is_collection = fk
            .principal_to_dependent
            .and_then(|n| self.navigation(n))
            .is_some_and(|n| n.collection);
        if to_dependent_is_collection || !fk.is_unique() {
            debug!("only one-to-one relationships can be inverted");
            return false;
        }
        let new_dependent = fk.principal_type;
        let new_principal = fk.declaring_type;
        let Some(principal_key) = self.primary_key(new_principal) else {
            return false;
        };
        let new_to_principal = fk
            .principal_to_dependent
            .and_then(|n| self.navigation(n))
            .map(|n| n.name.clone());

        self.batch(|m| {
            let Some(shadow) = m.create_shadow_foreign_key_properties(
                new_dependent,
                new_principal,
                principal_key,
                new_to_principal.as_deref(),
            ) else {
                return;
            };
            let Some(fk) = m.foreign_keys.get_mut(id) else {
                return;
            };
            let old_properties = std::mem::replace(&mut fk.properties, shadow);
            fk.declaring_type = new_dependent;
            fk.principal_type = new_principal;
            fk.principal_key = principal_key;
            fk.properties_source = None;
            fk.principal_end_source = Some(source);
            std::mem::swap(&mut fk.dependent_to_principal, &mut fk.principal_to_dependent);
            let navigations: Vec<NavigationId> = fk.navigations().collect();
            for navigation in navigations {
                if let Some(nav) = m.navigations.get_mut(navigation) {
                    nav.on_dependent = !nav.on_dependent;
                }
            }
            if let Some(entity) = m.entity_types.get_mut(new_principal) {
                entity.foreign_keys.retain(|f| *f != id);
            }
            if let Some(entity) = m.entity_types.get_mut(new_dependent) {
                entity.foreign_keys.push(id);
            }
            m.on_foreign_key_principal_end_changed(id);
            m.remove_unused_implicit_properties(&old_properties);
        });
        true
    }

    pub fn invert_foreign_key(&mut self, id: ForeignKeyId, source: ConfigurationSource) -> bool {
        match self.foreign_key(id) {
            Some(fk) => {
                let dependent = fk.declaring_type;
                self.set_principal_end(id, dependent, source)
            }
            None => false,
        }
    }

    /// Uniqueness must agree with the shape of the navigation to the
    /// dependent, when there is one.
    pub fn set_foreign_key_unique(
        &mut self,
        id: ForeignKeyId,
        unique: bool,
        source: ConfigurationSource,
    ) -> bool {
        let Some(fk) = self.foreign_key(id) else {
            return false;
        };
        let conflicts = fk
            .principal_to_dependent
            .and_then(|n| self.navigation(n))
            .is_some_and(|n| n.collection == unique);
        if conflicts {
            return false;
        }
        let write = match self.foreign_keys.get_mut(id) {
            Some(fk) => fk.unique.try_set(unique, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_foreign_key_uniqueness_changed(id, unique);
                true
            }
        }
    }

    pub fn set_foreign_key_required(
        &mut self,
        id: ForeignKeyId,
        required: bool,
        source: ConfigurationSource,
    ) -> bool {
        let write = match self.foreign_keys.get_mut(id) {
            Some(fk) => fk.required.try_set(required, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_foreign_key_requiredness_changed(id, required);
                true
            }
        }
    }

    pub fn set_foreign_key_required_dependent(
        &mut self,
        id: ForeignKeyId,
        required: bool,
        source: ConfigurationSource,
    ) -> bool {
        let write = match self.foreign_keys.get_mut(id) {
            Some(fk) => fk.required_dependent.try_set(required, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_foreign_key_dependent_requiredness_changed(id, required);
                true
            }
        }
    }

    pub fn set_foreign_key_ownership(
        &mut self,
        id: ForeignKeyId,
        ownership: bool,
        source: ConfigurationSource,
    ) -> bool {
        let write = match self.foreign_keys.get_mut(id) {
            Some(fk) => fk.ownership.try_set(ownership, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(_) => {
                self.on_foreign_key_ownership_changed(id, ownership);
                true
            }
        }
    }

    pub fn set_foreign_key_delete_behavior(
        &mut self,
        id: ForeignKeyId,
        behavior: DeleteBehavior,
        source: ConfigurationSource,
    ) -> bool {
        self.foreign_keys
            .get_mut(id)
            .is_some_and(|fk| fk.delete_behavior.try_set(behavior, source).applied())
    }

    // ------------------------------------------------------------------------
    // Navigations
    // ------------------------------------------------------------------------

    /// Attach a navigation named `name` to one end of `fk`.
    ///
    /// `on_dependent` picks the dependent→principal side. An existing
    /// navigation on that side is replaced when `source` may override it.
    pub fn add_navigation(
        &mut self,
        fk: ForeignKeyId,
        name: &str,
        on_dependent: bool,
        source: ConfigurationSource,
    ) -> Option<NavigationId> {
        let foreign_key = self.foreign_key(fk)?;
        let (declaring, target, slot) = if on_dependent {
            (
                foreign_key.declaring_type,
                foreign_key.principal_type,
                foreign_key.dependent_to_principal,
            )
        } else {
            (
                foreign_key.principal_type,
                foreign_key.declaring_type,
                foreign_key.principal_to_dependent,
            )
        };
        let unique = foreign_key.is_unique();
        if let Some(existing) = slot {
            let nav = self.navigation(existing)?;
            if nav.name == name {
                let promoted = source.max(Some(nav.source));
                if let Some(nav) = self.navigations.get_mut(existing) {
                    nav.source = promoted;
                }
                return Some(existing);
            }
            if !source.overrides(Some(nav.source)) {
                return None;
            }
            self.detach_navigation(existing);
        }
        if !self.try_unignore_member(TypeBaseId::Entity(declaring), name, source) {
            return None;
        }
        if let Some(member) = self.find_member(TypeBaseId::Entity(declaring), name) {
            if source.overrides_strictly(self.member_source(member)) {
                self.remove_member_unchecked(member);
            } else {
                let message = format!(
                    "`{}.{name}` is already mapped as another member",
                    self.type_name(declaring.into())
                );
                self.report(DiagnosticLevel::Debug, codes::MEMBER_CONFLICT, message);
                return None;
            }
        }
        if !self.foreign_keys.contains(fk) {
            return None;
        }
        let collection = self
            .host_members_in_scope(declaring)
            .into_iter()
            .find(|m| m.name == name)
            .map_or(!on_dependent && !unique, |m| m.ty.is_collection());
        let id = self.navigations.insert(Navigation {
            name: name.to_string(),
            declaring_type: declaring,
            target_type: target,
            foreign_key: fk,
            on_dependent,
            collection,
            source,
            annotations: Annotations::default(),
        });
        if let Some(foreign_key) = self.foreign_keys.get_mut(fk) {
            if on_dependent {
                foreign_key.dependent_to_principal = Some(id);
            } else {
                foreign_key.principal_to_dependent = Some(id);
            }
        }
        if let Some(entity) = self.entity_types.get_mut(declaring) {
            entity.navigations.push(id);
        }
        self.on_navigation_added(id)
    }

    pub fn remove_navigation(&mut self, id: NavigationId, source: ConfigurationSource) -> bool {
        let Some(nav) = self.navigation(id) else {
            return false;
        };
        if !source.overrides(Some(nav.source)) {
            return false;
        }
        self.remove_navigation_unchecked(id);
        true
    }

    /// A convention-created foreign key left without navigations goes too.
    pub(crate) fn remove_navigation_unchecked(&mut self, id: NavigationId) {
        self.batch(|m| {
            let Some(fk) = m.navigation(id).map(|n| n.foreign_key) else {
                return;
            };
            m.detach_navigation(id);
            let orphaned = m.foreign_key(fk).is_some_and(|fk| {
                fk.source == ConfigurationSource::Convention && fk.navigations().next().is_none()
            });
            if orphaned {
                m.remove_foreign_key_unchecked(fk);
            }
        });
    }

    fn detach_navigation(&mut self, id: NavigationId) {
        let Some(removed) = self.navigations.remove(id) else {
            return;
        };
        if let Some(fk) = self.foreign_keys.get_mut(removed.foreign_key) {
            if fk.dependent_to_principal == Some(id) {
                fk.dependent_to_principal = None;
            }
            if fk.principal_to_dependent == Some(id) {
                fk.principal_to_dependent = None;
            }
        }
        if let Some(entity) = self.entity_types.get_mut(removed.declaring_type) {
            entity.navigations.retain(|n| *n != id);
        }
        self.on_navigation_removed(removed.declaring_type, removed.target_type, removed.name);
    }

    // ------------------------------------------------------------------------
    // Skip navigations
    // ------------------------------------------------------------------------

    pub fn add_skip_navigation(
        &mut self,
        declaring: EntityTypeId,
        name: &str,
        target: EntityTypeId,
        collection: bool,
        source: ConfigurationSource,
    ) -> Option<SkipNavigationId> {
        if !self.entity_types.contains(declaring) || !self.entity_types.contains(target) {
            return None;
        }
        if !self.try_unignore_member(TypeBaseId::Entity(declaring), name, source) {
            return None;
        }
        match self.find_member(TypeBaseId::Entity(declaring), name) {
            Some(Member::SkipNavigation(existing))
                if self
                    .skip_navigation(existing)
                    .is_some_and(|s| s.target_type == target) =>
            {
                if let Some(skip) = self.skip_navigations.get_mut(existing) {
                    skip.source = source.max(Some(skip.source));
                }
                return Some(existing);
            }
            Some(member) => {
                if source.overrides_strictly(self.member_source(member)) {
                    self.remove_member_unchecked(member);
                } else {
                    return None;
                }
            }
            None => {}
        }
        let id = self.skip_navigations.insert(SkipNavigation {
            name: name.to_string(),
            declaring_type: declaring,
            target_type: target,
            collection,
            foreign_key: Facet::default(),
            inverse: Facet::default(),
            source,
            annotations: Annotations::default(),
        });
        if let Some(entity) = self.entity_types.get_mut(declaring) {
            entity.skip_navigations.push(id);
        }
        self.on_skip_navigation_added(id)
    }

    pub fn remove_skip_navigation(
        &mut self,
        id: SkipNavigationId,
        source: ConfigurationSource,
    ) -> bool {
        let Some(skip) = self.skip_navigation(id) else {
            return false;
        };
        if !source.overrides(Some(skip.source)) {
            return false;
        }
        self.remove_skip_navigation_unchecked(id);
        true
    }

    pub(crate) fn remove_skip_navigation_unchecked(&mut self, id: SkipNavigationId) {
        self.batch(|m| {
            let partners: Vec<_> = m
                .skip_navigations
                .iter()
                .filter(|(other, s)| *other != id && s.inverse() == Some(id))
                .map(|(other, _)| other)
                .collect();
            for partner in partners {
                if let Some(skip) = m.skip_navigations.get_mut(partner) {
                    skip.inverse.reset(None);
                }
                m.on_skip_navigation_inverse_changed(partner, None, Some(id));
            }
            let Some(removed) = m.skip_navigations.remove(id) else {
                return;
            };
            let declaring = removed.declaring_type;
            if let Some(entity) = m.entity_types.get_mut(declaring) {
                entity.skip_navigations.retain(|s| *s != id);
            }
            m.on_skip_navigation_removed(declaring, removed);
        });
    }

    /// The inverse must point back from the target to the declaring type.
    pub fn set_skip_navigation_inverse(
        &mut self,
        id: SkipNavigationId,
        inverse: Option<SkipNavigationId>,
        source: ConfigurationSource,
    ) -> bool {
        let Some(skip) = self.skip_navigation(id) else {
            return false;
        };
        if let Some(inverse) = inverse {
            let fits = self.skip_navigation(inverse).is_some_and(|other| {
                inverse != id
                    && self.is_same_hierarchy(other.declaring_type, skip.target_type)
                    && self.is_same_hierarchy(other.target_type, skip.declaring_type)
            });
            if !fits {
                return false;
            }
        }
        let write = match self.skip_navigations.get_mut(id) {
            Some(skip) => skip.inverse.try_set(inverse, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(old) => {
                self.on_skip_navigation_inverse_changed(id, inverse, old);
                true
            }
        }
    }

    /// The foreign key must live on a join type and have the skip
    /// navigation's declaring hierarchy as principal.
    pub fn set_skip_navigation_foreign_key(
        &mut self,
        id: SkipNavigationId,
        foreign_key: Option<ForeignKeyId>,
        source: ConfigurationSource,
    ) -> bool {
        let Some(skip) = self.skip_navigation(id) else {
            return false;
        };
        if let Some(fk) = foreign_key {
            let fits = self
                .foreign_key(fk)
                .is_some_and(|fk| self.is_same_hierarchy(fk.principal_type, skip.declaring_type));
            if !fits {
                return false;
            }
        }
        let write = match self.skip_navigations.get_mut(id) {
            Some(skip) => skip.foreign_key.try_set(foreign_key, source),
            None => return false,
        };
        match write {
            FacetWrite::Rejected => false,
            FacetWrite::Unchanged => true,
            FacetWrite::Changed(old) => {
                self.on_skip_navigation_foreign_key_changed(id, foreign_key, old);
                true
            }
        }
    }

    // ------------------------------------------------------------------------
    // Triggers and construction
    // ------------------------------------------------------------------------

    pub fn add_trigger(
        &mut self,
        entity: EntityTypeId,
        name: &str,
        source: ConfigurationSource,
    ) -> Option<TriggerId> {
        let entity_type = self.entity_type(entity)?;
        let existing = entity_type
            .triggers
            .iter()
            .copied()
            .find(|t| self.trigger(*t).is_some_and(|t| t.name == name));
        if let Some(existing) = existing {
            if let Some(trigger) = self.triggers.get_mut(existing) {
                trigger.source = source.max(Some(trigger.source));
            }
            return Some(existing);
        }
        let id = self.triggers.insert(Trigger {
            name: name.to_string(),
            entity_type: entity,
            source,
        });
        if let Some(entity_type) = self.entity_types.get_mut(entity) {
            entity_type.triggers.push(id);
        }
        self.on_trigger_added(id)
    }

    pub fn remove_trigger(&mut self, id: TriggerId, source: ConfigurationSource) -> bool {
        let Some(trigger) = self.trigger(id) else {
            return false;
        };
        if !source.overrides(Some(trigger.source)) {
            return false;
        }
        self.remove_trigger_unchecked(id);
        true
    }

    pub(crate) fn remove_trigger_unchecked(&mut self, id: TriggerId) {
        let Some(removed) = self.triggers.remove(id) else {
            return;
        };
        let entity = removed.entity_type;
        if let Some(entity_type) = self.entity_types.get_mut(entity) {
            entity_type.triggers.retain(|t| *t != id);
        }
        self.on_trigger_removed(entity, removed);
    }

    pub fn set_constructor_binding(
        &mut self,
        entity: EntityTypeId,
        binding: Option<ConstructorBinding>,
        source: ConfigurationSource,
    ) -> bool {
        self.entity_types
            .get_mut(entity)
            .is_some_and(|e| e.constructor_binding.try_set(binding, source).applied())
    }
}
