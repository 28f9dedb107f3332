//! The schema graph root.
//!
//! `Model` owns one arena per element kind. Every cross-link is an arena id and
//! is resolved through the model, so rules only ever see `&EntityType`-style
//! shared views; all writes go through the mutation methods in the
//! `model_*` modules, which check precedence, mutate and then dispatch.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::annotations::Annotations;
use crate::arena::{
    Arena, ComplexPropertyId, ComplexTypeId, EntityTypeId, ForeignKeyId, IndexId, KeyId,
    NavigationId, PropertyId, SkipNavigationId, TriggerId,
};
use crate::config_source::ConfigurationSource;
use crate::conventions::ConventionSet;
use crate::diagnostics::{Diagnostic, DiagnosticLevel};
use crate::dispatcher::DispatchState;
use crate::entity_type::{ComplexType, EntityType, Trigger, TypeBaseId};
use crate::foreign_key::{ForeignKey, Navigation, SkipNavigation};
use crate::host::{HostCatalog, HostType};
use crate::key::{Index, Key};
use crate::options::ModelOptions;
use crate::property::{ComplexProperty, Property};

/// A named member of a structural type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Property(PropertyId),
    ComplexProperty(ComplexPropertyId),
    Navigation(NavigationId),
    SkipNavigation(SkipNavigationId),
}

pub struct Model {
    pub(crate) host: HostCatalog,
    pub(crate) options: ModelOptions,
    pub(crate) conventions: ConventionSet,
    pub(crate) entity_types: Arena<EntityTypeId, EntityType>,
    pub(crate) complex_types: Arena<ComplexTypeId, ComplexType>,
    pub(crate) properties: Arena<PropertyId, Property>,
    pub(crate) complex_properties: Arena<ComplexPropertyId, ComplexProperty>,
    pub(crate) keys: Arena<KeyId, Key>,
    pub(crate) indexes: Arena<IndexId, Index>,
    pub(crate) foreign_keys: Arena<ForeignKeyId, ForeignKey>,
    pub(crate) navigations: Arena<NavigationId, Navigation>,
    pub(crate) skip_navigations: Arena<SkipNavigationId, SkipNavigation>,
    pub(crate) triggers: Arena<TriggerId, Trigger>,
    pub(crate) ignored_types: BTreeMap<String, ConfigurationSource>,
    pub(crate) annotations: Annotations,
    pub(crate) dispatch: DispatchState,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) errors: BTreeMap<String, Vec<String>>,
}

impl Model {
    /// A model with no conventions; every mutation is applied as requested.
    pub fn new(host: HostCatalog) -> Self {
        Self {
            host,
            options: ModelOptions::default(),
            conventions: ConventionSet::default(),
            entity_types: Arena::default(),
            complex_types: Arena::default(),
            properties: Arena::default(),
            complex_properties: Arena::default(),
            keys: Arena::default(),
            indexes: Arena::default(),
            foreign_keys: Arena::default(),
            navigations: Arena::default(),
            skip_navigations: Arena::default(),
            triggers: Arena::default(),
            ignored_types: BTreeMap::new(),
            annotations: Annotations::default(),
            dispatch: DispatchState::default(),
            diagnostics: Vec::new(),
            errors: BTreeMap::new(),
        }
    }

    /// A model driven by `conventions`; fires `ModelInitialized`.
    pub fn with_conventions(
        host: HostCatalog,
        conventions: ConventionSet,
        options: ModelOptions,
    ) -> Self {
        let mut model = Self::new(host);
        model.options = options;
        model.conventions = conventions;
        model.on_model_initialized();
        model
    }

    pub fn host(&self) -> &HostCatalog {
        &self.host
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn conventions(&self) -> &ConventionSet {
        &self.conventions
    }

    /// Registry changes take effect for the next dispatch; a dispatch already
    /// running keeps iterating its own snapshot.
    pub fn conventions_mut(&mut self) -> &mut ConventionSet {
        &mut self.conventions
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    // ------------------------------------------------------------------------
    // Element lookup
    // ------------------------------------------------------------------------

    pub fn entity_type(&self, id: EntityTypeId) -> Option<&EntityType> {
        self.entity_types.get(id)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = (EntityTypeId, &EntityType)> + '_ {
        self.entity_types.iter()
    }

    pub fn entity_type_ids(&self) -> Vec<EntityTypeId> {
        self.entity_types.ids()
    }

    pub fn find_entity_type(&self, name: &str) -> Option<EntityTypeId> {
        self.entity_types
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, _)| id)
    }

    pub fn find_entity_type_by_host(&self, host_type: &str) -> Option<EntityTypeId> {
        self.entity_types
            .iter()
            .find(|(_, e)| e.host_type.as_deref() == Some(host_type))
            .map(|(id, _)| id)
    }

    pub fn complex_type(&self, id: ComplexTypeId) -> Option<&ComplexType> {
        self.complex_types.get(id)
    }

    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.properties.get(id)
    }

    pub fn complex_property(&self, id: ComplexPropertyId) -> Option<&ComplexProperty> {
        self.complex_properties.get(id)
    }

    pub fn key(&self, id: KeyId) -> Option<&Key> {
        self.keys.get(id)
    }

    pub fn index(&self, id: IndexId) -> Option<&Index> {
        self.indexes.get(id)
    }

    pub fn foreign_key(&self, id: ForeignKeyId) -> Option<&ForeignKey> {
        self.foreign_keys.get(id)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (ForeignKeyId, &ForeignKey)> + '_ {
        self.foreign_keys.iter()
    }

    pub fn navigation(&self, id: NavigationId) -> Option<&Navigation> {
        self.navigations.get(id)
    }

    pub fn skip_navigation(&self, id: SkipNavigationId) -> Option<&SkipNavigation> {
        self.skip_navigations.get(id)
    }

    pub fn skip_navigations(
        &self,
    ) -> impl Iterator<Item = (SkipNavigationId, &SkipNavigation)> + '_ {
        self.skip_navigations.iter()
    }

    pub fn trigger(&self, id: TriggerId) -> Option<&Trigger> {
        self.triggers.get(id)
    }

    pub fn is_ignored(&self, type_name: &str) -> Option<ConfigurationSource> {
        self.ignored_types.get(type_name).copied()
    }

    /// The host descriptor behind an entity type, if it has one.
    pub fn host_type_of(&self, id: EntityTypeId) -> Option<&HostType> {
        let host_type = self.entity_type(id)?.host_type.as_deref()?;
        self.host.get(host_type)
    }

    pub fn type_name(&self, id: TypeBaseId) -> String {
        match id {
            TypeBaseId::Entity(id) => self.entity_type(id).map(|e| e.name.clone()),
            TypeBaseId::Complex(id) => self.complex_type(id).map(|c| c.name.clone()),
        }
        .unwrap_or_else(|| "<removed>".to_string())
    }

    pub fn property_name(&self, id: PropertyId) -> &str {
        self.property(id).map_or("<removed>", |p| p.name.as_str())
    }

    pub fn property_names(&self, ids: &[PropertyId]) -> Vec<String> {
        ids.iter().map(|id| self.property_name(*id).to_string()).collect()
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    /// Base types of `id`, nearest first.
    pub fn ancestors(&self, id: EntityTypeId) -> Vec<EntityTypeId> {
        let mut out = Vec::new();
        let mut current = self.entity_type(id).and_then(EntityType::base_type);
        while let Some(base) = current {
            if base == id || out.contains(&base) {
                break;
            }
            out.push(base);
            current = self.entity_type(base).and_then(EntityType::base_type);
        }
        out
    }

    pub fn root_type(&self, id: EntityTypeId) -> EntityTypeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// `id` followed by its ancestors, nearest first.
    pub fn hierarchy_up(&self, id: EntityTypeId) -> Vec<EntityTypeId> {
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));
        chain
    }

    pub fn derived_types(&self, id: EntityTypeId) -> Vec<EntityTypeId> {
        self.entity_types
            .iter()
            .filter(|(_, e)| e.base_type() == Some(id))
            .map(|(derived, _)| derived)
            .collect()
    }

    /// Every type deriving from `id`, transitively.
    pub fn all_derived_types(&self, id: EntityTypeId) -> Vec<EntityTypeId> {
        let mut out = Vec::new();
        let mut pending = self.derived_types(id);
        while let Some(next) = pending.pop() {
            if next == id || out.contains(&next) {
                continue;
            }
            pending.extend(self.derived_types(next));
            out.push(next);
        }
        out
    }

    pub fn is_same_hierarchy(&self, a: EntityTypeId, b: EntityTypeId) -> bool {
        self.root_type(a) == self.root_type(b)
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    pub fn declared_properties(&self, id: TypeBaseId) -> &[PropertyId] {
        match id {
            TypeBaseId::Entity(id) => self.entity_type(id).map(|e| e.properties.as_slice()),
            TypeBaseId::Complex(id) => self.complex_type(id).map(|c| c.properties.as_slice()),
        }
        .unwrap_or(&[])
    }

    /// Declared and inherited properties, root first.
    pub fn properties_of(&self, id: EntityTypeId) -> Vec<PropertyId> {
        let mut chain = self.hierarchy_up(id);
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|e| self.declared_properties(TypeBaseId::Entity(e)).to_vec())
            .collect()
    }

    fn declaring_scope(&self, id: TypeBaseId) -> Vec<TypeBaseId> {
        match id {
            TypeBaseId::Entity(id) => self
                .hierarchy_up(id)
                .into_iter()
                .map(TypeBaseId::Entity)
                .collect(),
            TypeBaseId::Complex(_) => vec![id],
        }
    }

    /// A declared or inherited property named exactly `name`.
    pub fn find_property(&self, id: TypeBaseId, name: &str) -> Option<PropertyId> {
        self.declaring_scope(id).into_iter().find_map(|scope| {
            self.declared_properties(scope)
                .iter()
                .copied()
                .find(|p| self.property_name(*p) == name)
        })
    }

    pub fn find_property_ignore_case(&self, id: EntityTypeId, name: &str) -> Option<PropertyId> {
        self.properties_of(id)
            .into_iter()
            .find(|p| self.property_name(*p).eq_ignore_ascii_case(name))
    }

    /// A declared or inherited member of any kind named `name`.
    pub fn find_member(&self, id: TypeBaseId, name: &str) -> Option<Member> {
        if let Some(property) = self.find_property(id, name) {
            return Some(Member::Property(property));
        }
        for scope in self.declaring_scope(id) {
            let complex = match scope {
                TypeBaseId::Entity(e) => self
                    .entity_type(e)
                    .map(|e| e.complex_properties.clone())
                    .unwrap_or_default(),
                TypeBaseId::Complex(c) => self
                    .complex_type(c)
                    .map(|c| c.complex_properties.clone())
                    .unwrap_or_default(),
            };
            if let Some(cp) = complex
                .into_iter()
                .find(|cp| self.complex_property(*cp).is_some_and(|cp| cp.name == name))
            {
                return Some(Member::ComplexProperty(cp));
            }
            if let TypeBaseId::Entity(e) = scope {
                if let Some(nav) = self.declared_navigation(e, name) {
                    return Some(Member::Navigation(nav));
                }
                if let Some(skip) = self.declared_skip_navigation(e, name) {
                    return Some(Member::SkipNavigation(skip));
                }
            }
        }
        None
    }

    /// Member names declared on `id`, its ancestors and its derived types.
    pub(crate) fn member_name_taken(&self, id: EntityTypeId, name: &str) -> bool {
        if self.find_member(TypeBaseId::Entity(id), name).is_some()
            || self.is_member_ignored(TypeBaseId::Entity(id), name).is_some()
        {
            return true;
        }
        self.all_derived_types(id).into_iter().any(|derived| {
            self.entity_type(derived).is_some_and(|e| {
                e.properties.iter().any(|p| self.property_name(*p) == name)
                    || self.declared_navigation(derived, name).is_some()
                    || self.declared_skip_navigation(derived, name).is_some()
            })
        })
    }

    /// `base` when free, else `base1`, `base2`, ...
    pub fn unique_member_name(&self, id: EntityTypeId, base: &str) -> String {
        if !self.member_name_taken(id, base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !self.member_name_taken(id, candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn declared_navigation(&self, id: EntityTypeId, name: &str) -> Option<NavigationId> {
        self.entity_type(id)?
            .navigations
            .iter()
            .copied()
            .find(|n| self.navigation(*n).is_some_and(|n| n.name == name))
    }

    pub fn find_navigation(&self, id: EntityTypeId, name: &str) -> Option<NavigationId> {
        self.hierarchy_up(id)
            .into_iter()
            .find_map(|e| self.declared_navigation(e, name))
    }

    pub fn declared_skip_navigation(
        &self,
        id: EntityTypeId,
        name: &str,
    ) -> Option<SkipNavigationId> {
        self.entity_type(id)?
            .skip_navigations
            .iter()
            .copied()
            .find(|n| self.skip_navigation(*n).is_some_and(|n| n.name == name))
    }

    pub fn find_skip_navigation(&self, id: EntityTypeId, name: &str) -> Option<SkipNavigationId> {
        self.hierarchy_up(id)
            .into_iter()
            .find_map(|e| self.declared_skip_navigation(e, name))
    }

    /// The source a member name was ignored at, on `id` or an ancestor.
    pub fn is_member_ignored(&self, id: TypeBaseId, name: &str) -> Option<ConfigurationSource> {
        self.declaring_scope(id)
            .into_iter()
            .filter_map(|scope| match scope {
                TypeBaseId::Entity(e) => self.entity_type(e)?.ignored_members.get(name).copied(),
                TypeBaseId::Complex(c) => {
                    self.complex_type(c)?.ignored_members.get(name).copied()
                }
            })
            .max()
    }

    // ------------------------------------------------------------------------
    // Keys and relationships
    // ------------------------------------------------------------------------

    /// The primary key of the hierarchy `id` belongs to.
    pub fn primary_key(&self, id: EntityTypeId) -> Option<KeyId> {
        let root = self.root_type(id);
        self.entity_type(root)?.primary_key.get()
    }

    pub fn primary_key_properties(&self, id: EntityTypeId) -> Vec<PropertyId> {
        self.primary_key(id)
            .and_then(|k| self.key(k))
            .map(|k| k.properties.clone())
            .unwrap_or_default()
    }

    pub fn find_key(&self, id: EntityTypeId, properties: &[PropertyId]) -> Option<KeyId> {
        self.entity_type(self.root_type(id))?
            .keys
            .iter()
            .copied()
            .find(|k| self.key(*k).is_some_and(|k| k.properties == properties))
    }

    pub fn find_index(&self, id: EntityTypeId, properties: &[PropertyId]) -> Option<IndexId> {
        self.entity_type(id)?
            .indexes
            .iter()
            .copied()
            .find(|i| self.index(*i).is_some_and(|i| i.properties == properties))
    }

    /// Foreign keys declared on `id` and its ancestors.
    pub fn foreign_keys_of(&self, id: EntityTypeId) -> Vec<ForeignKeyId> {
        self.hierarchy_up(id)
            .into_iter()
            .filter_map(|e| self.entity_type(e))
            .flat_map(|e| e.foreign_keys.iter().copied())
            .collect()
    }

    /// Foreign keys anywhere whose principal is `id`.
    pub fn referencing_foreign_keys(&self, id: EntityTypeId) -> Vec<ForeignKeyId> {
        self.foreign_keys
            .iter()
            .filter(|(_, fk)| fk.principal_type == id)
            .map(|(fk_id, _)| fk_id)
            .collect()
    }

    pub fn is_key_referenced(&self, key: KeyId) -> bool {
        self.foreign_keys.iter().any(|(_, fk)| fk.principal_key == key)
    }

    /// `true` when some key, index or foreign key uses `property`.
    pub fn is_property_in_use(&self, property: PropertyId) -> bool {
        self.keys.iter().any(|(_, k)| k.properties.contains(&property))
            || self.indexes.iter().any(|(_, i)| i.properties.contains(&property))
            || self
                .foreign_keys
                .iter()
                .any(|(_, fk)| fk.properties.contains(&property))
    }

    /// An explicitly configured requiredness wins; otherwise a foreign key is
    /// required when none of its properties is nullable.
    pub fn is_foreign_key_required(&self, id: ForeignKeyId) -> bool {
        let Some(fk) = self.foreign_key(id) else {
            return false;
        };
        if fk.required.source().is_some() {
            return fk.required.get();
        }
        !fk.properties.is_empty()
            && fk
                .properties
                .iter()
                .all(|p| self.property(*p).is_some_and(|p| !p.is_nullable()))
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Record a diagnostic. Repeats of the same code and message are dropped.
    pub fn report(&mut self, level: DiagnosticLevel, code: &'static str, message: String) {
        if self
            .diagnostics
            .iter()
            .any(|d| d.code == code && d.message == message)
        {
            return;
        }
        match level {
            DiagnosticLevel::Debug => debug!(code = code, "{message}"),
            DiagnosticLevel::Warning => warn!(code = code, "{message}"),
        }
        self.diagnostics.push(Diagnostic {
            level,
            code,
            message,
        });
    }

    /// Record a hard problem against `type_name`; surfaced by finalization.
    pub fn report_error(&mut self, type_name: &str, message: impl Into<String>) {
        let message = message.into();
        let problems = self.errors.entry(type_name.to_string()).or_default();
        if !problems.contains(&message) {
            problems.push(message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }
}
