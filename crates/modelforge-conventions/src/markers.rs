//! Conventions that apply the declarative markers of the host catalog.
//!
//! Every marker is applied at `DataAnnotation`, so it beats discovery but
//! loses to explicit configuration. Marker misuse is reported as a hard
//! error when the model is finalized.

use std::rc::Rc;

use modelforge_metadata::conventions::{
    ComplexPropertyAddedConvention, EntityTypeAddedConvention,
    EntityTypeBaseTypeChangedConvention, ForeignKeyPrincipalEndChangedConvention,
    ModelFinalizingConvention, NavigationAddedConvention, PropertyAddedConvention,
};
use modelforge_metadata::{
    codes, ComplexPropertyId, ConfigurationSource, Convention, ConventionContext, ConventionSet,
    DiagnosticLevel, EntityTypeId, ForeignKeyId, HostMember, MemberMarker, Model, ModelError,
    NavigationId, PropertyId, TypeBaseId, TypeMarker,
};
use tracing::debug;

use crate::host_scope::{fields_of, is_entity_candidate, member_named, members_of};

const ANNOTATION: ConfigurationSource = ConfigurationSource::DataAnnotation;

/// The declaring type of `property` and the host member behind it.
fn property_member(model: &Model, property: PropertyId) -> Option<(TypeBaseId, HostMember)> {
    let property = model.property(property)?;
    if property.shadow {
        return None;
    }
    let member = member_named(model, property.declaring_type, &property.name)?;
    Some((property.declaring_type, member))
}

fn navigation_member(model: &Model, navigation: NavigationId) -> Option<HostMember> {
    let navigation = model.navigation(navigation)?;
    member_named(model, navigation.declaring_type.into(), &navigation.name)
}

/// Root entity types that are backed by a host type.
fn mapped_roots(model: &Model) -> Vec<EntityTypeId> {
    model
        .entity_types()
        .filter(|(_, e)| e.base_type().is_none() && !e.is_shadow())
        .map(|(id, _)| id)
        .collect()
}

// ============================================================================
// NotMapped
// ============================================================================

pub struct NotMappedTypeConvention;

impl Convention for NotMappedTypeConvention {
    fn name(&self) -> &'static str {
        "not_mapped_type_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self);
    }
}

impl EntityTypeAddedConvention for NotMappedTypeConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        context: &mut ConventionContext<EntityTypeId>,
    ) {
        let marked = model
            .host_type_of(entity_type)
            .is_some_and(|t| t.has_marker(&TypeMarker::NotMapped));
        if !marked {
            return;
        }
        let Some(name) = model.entity_type(entity_type).map(|e| e.name.clone()) else {
            return;
        };
        if model.ignore_entity_type(&name, ANNOTATION) {
            context.stop_processing();
        }
    }
}

pub struct NotMappedMemberConvention;

impl NotMappedMemberConvention {
    fn apply(model: &mut Model, ty: TypeBaseId) {
        for member in members_of(model, ty) {
            if member.has_marker(&MemberMarker::NotMapped) {
                model.ignore_member(ty, &member.name, ANNOTATION);
            }
        }
    }
}

impl Convention for NotMappedMemberConvention {
    fn name(&self) -> &'static str {
        "not_mapped_member_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self.clone());
        set.entity_type_base_type_changed.push(self.clone());
        set.complex_property_added.push(self);
    }
}

impl EntityTypeAddedConvention for NotMappedMemberConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        Self::apply(model, entity_type.into());
    }
}

impl EntityTypeBaseTypeChangedConvention for NotMappedMemberConvention {
    fn process_entity_type_base_type_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<EntityTypeId>,
        _old: Option<EntityTypeId>,
        _context: &mut ConventionContext<Option<EntityTypeId>>,
    ) {
        Self::apply(model, entity_type.into());
    }
}

impl ComplexPropertyAddedConvention for NotMappedMemberConvention {
    fn process_complex_property_added(
        &self,
        model: &mut Model,
        property: ComplexPropertyId,
        _context: &mut ConventionContext<ComplexPropertyId>,
    ) {
        if let Some(complex_type) = model.complex_property(property).map(|p| p.complex_type) {
            Self::apply(model, complex_type.into());
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Single-property `Key` markers and the type-level `PrimaryKey` marker.
pub struct KeyMarkerConvention;

impl KeyMarkerConvention {
    fn key_marked(model: &Model, entity_type: EntityTypeId) -> Vec<String> {
        members_of(model, entity_type.into())
            .into_iter()
            .filter(|m| m.has_marker(&MemberMarker::Key))
            .map(|m| m.name)
            .collect()
    }

    fn primary_key_marker(model: &Model, entity_type: EntityTypeId) -> Option<Vec<String>> {
        model.host_type_of(entity_type)?.markers.iter().find_map(|m| match m {
            TypeMarker::PrimaryKey { properties } => Some(properties.clone()),
            _ => None,
        })
    }

    fn apply(model: &mut Model, entity_type: EntityTypeId) {
        let properties: Option<Vec<PropertyId>> =
            match Self::primary_key_marker(model, entity_type) {
                Some(names) => names
                    .iter()
                    .map(|n| model.find_property(entity_type.into(), n))
                    .collect(),
                None => match Self::key_marked(model, entity_type).as_slice() {
                    [single] => model
                        .find_property(entity_type.into(), single)
                        .map(|p| vec![p]),
                    _ => None,
                },
            };
        let Some(properties) = properties else {
            return;
        };
        let current = model.primary_key_properties(entity_type);
        if current == properties {
            return;
        }
        match model.set_primary_key(entity_type, &properties, ANNOTATION) {
            Ok(_) => {}
            Err(err @ ModelError::KeyOnDerivedType { .. }) => {
                model.report(DiagnosticLevel::Debug, codes::MEMBER_CONFLICT, err.to_string());
            }
            Err(err) => debug!(error = %err, "key marker not applied"),
        }
    }
}

impl Convention for KeyMarkerConvention {
    fn name(&self) -> &'static str {
        "key_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.property_added.push(self.clone());
        set.model_finalizing.push(self);
    }
}

impl PropertyAddedConvention for KeyMarkerConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        if let Some(TypeBaseId::Entity(entity_type)) =
            model.property(property).map(|p| p.declaring_type)
        {
            Self::apply(model, entity_type);
        }
    }
}

impl ModelFinalizingConvention for KeyMarkerConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        for entity_type in mapped_roots(model) {
            let name = model.type_name(entity_type.into());
            let marked = Self::key_marked(model, entity_type);
            if marked.len() > 1 {
                model.report_error(
                    &name,
                    format!(
                        "composite key via two single-property markers ({}); use a type-level primary key marker",
                        marked.join(", ")
                    ),
                );
            }
            let missing: Vec<String> = Self::primary_key_marker(model, entity_type)
                .unwrap_or_default()
                .into_iter()
                .filter(|n| model.find_property(entity_type.into(), n).is_none())
                .collect();
            for missing in missing {
                model.report_error(
                    &name,
                    format!("primary key marker names `{missing}`, which is not a mapped property"),
                );
            }
        }
    }
}

// ============================================================================
// Property facets
// ============================================================================

pub struct RequiredMarkerConvention;

impl Convention for RequiredMarkerConvention {
    fn name(&self) -> &'static str {
        "required_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.property_added.push(self.clone());
        set.navigation_added.push(self);
    }
}

impl PropertyAddedConvention for RequiredMarkerConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let required = property_member(model, property)
            .is_some_and(|(_, m)| m.has_marker(&MemberMarker::Required));
        if required {
            model.set_property_nullable(property, false, ANNOTATION);
        }
    }
}

impl NavigationAddedConvention for RequiredMarkerConvention {
    fn process_navigation_added(
        &self,
        model: &mut Model,
        navigation: NavigationId,
        _context: &mut ConventionContext<NavigationId>,
    ) {
        let required = navigation_member(model, navigation)
            .is_some_and(|m| m.has_marker(&MemberMarker::Required));
        let Some(nav) = model.navigation(navigation).filter(|_| required) else {
            return;
        };
        let fk = nav.foreign_key;
        if nav.on_dependent {
            model.set_foreign_key_required(fk, true, ANNOTATION);
        } else if !nav.collection {
            model.set_foreign_key_required_dependent(fk, true, ANNOTATION);
        }
    }
}

pub struct BackingFieldMarkerConvention;

impl BackingFieldMarkerConvention {
    fn marker(member: &HostMember) -> Option<&str> {
        member.markers.iter().find_map(|m| match m {
            MemberMarker::BackingField { name } => Some(name.as_str()),
            _ => None,
        })
    }
}

impl Convention for BackingFieldMarkerConvention {
    fn name(&self) -> &'static str {
        "backing_field_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.property_added.push(self.clone());
        set.model_finalizing.push(self);
    }
}

impl PropertyAddedConvention for BackingFieldMarkerConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let Some((ty, member)) = property_member(model, property) else {
            return;
        };
        let Some(field) = Self::marker(&member) else {
            return;
        };
        if fields_of(model, ty).iter().any(|f| f.name == field) {
            model.set_property_field(property, Some(field), ANNOTATION);
        }
    }
}

impl ModelFinalizingConvention for BackingFieldMarkerConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        let properties: Vec<PropertyId> = model
            .entity_types()
            .flat_map(|(_, e)| e.properties.clone())
            .collect();
        for property in properties {
            let Some((ty, member)) = property_member(model, property) else {
                continue;
            };
            let Some(field) = Self::marker(&member) else {
                continue;
            };
            if !fields_of(model, ty).iter().any(|f| f.name == field) {
                let type_name = model.type_name(ty);
                model.report_error(
                    &type_name,
                    format!("`{}` names backing field `{field}`, which does not exist", member.name),
                );
            }
        }
    }
}

pub struct DatabaseGeneratedMarkerConvention;

impl Convention for DatabaseGeneratedMarkerConvention {
    fn name(&self) -> &'static str {
        "database_generated_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.property_added.push(self);
    }
}

impl PropertyAddedConvention for DatabaseGeneratedMarkerConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let option = property_member(model, property).and_then(|(_, m)| {
            m.markers.iter().find_map(|marker| match marker {
                MemberMarker::DatabaseGenerated { option } => Some(*option),
                _ => None,
            })
        });
        if let Some(option) = option {
            model.set_property_value_generated(property, option, ANNOTATION);
        }
    }
}

// ============================================================================
// Indexes
// ============================================================================

pub struct IndexMarkerConvention;

impl IndexMarkerConvention {
    fn markers(model: &Model, entity_type: EntityTypeId) -> Vec<(Vec<String>, bool)> {
        model
            .host_type_of(entity_type)
            .map(|t| {
                t.markers
                    .iter()
                    .filter_map(|m| match m {
                        TypeMarker::Index { properties, unique } => {
                            Some((properties.clone(), *unique))
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Convention for IndexMarkerConvention {
    fn name(&self) -> &'static str {
        "index_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.property_added.push(self.clone());
        set.model_finalizing.push(self);
    }
}

impl PropertyAddedConvention for IndexMarkerConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let Some(TypeBaseId::Entity(entity_type)) =
            model.property(property).map(|p| p.declaring_type)
        else {
            return;
        };
        for (names, unique) in Self::markers(model, entity_type) {
            let resolved: Option<Vec<PropertyId>> = names
                .iter()
                .map(|n| model.find_property(entity_type.into(), n))
                .collect();
            let Some(resolved) = resolved.filter(|r| r.contains(&property)) else {
                continue;
            };
            if let Some(index) = model.add_index(entity_type, &resolved, None, ANNOTATION) {
                model.set_index_unique(index, unique, ANNOTATION);
            }
        }
    }
}

impl ModelFinalizingConvention for IndexMarkerConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        for entity_type in model.entity_type_ids() {
            let name = model.type_name(entity_type.into());
            for (names, _) in Self::markers(model, entity_type) {
                if let Some(missing) = names
                    .iter()
                    .find(|n| model.find_property(entity_type.into(), n).is_none())
                {
                    model.report_error(
                        &name,
                        format!("index marker names `{missing}`, which is not a mapped property"),
                    );
                }
            }
        }
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// `ForeignKey { name }` markers.
///
/// On a navigation the marker lists the dependent's foreign-key properties
/// (comma-separated); on a property it names the navigation the property
/// backs.
pub struct ForeignKeyMarkerConvention;

impl ForeignKeyMarkerConvention {
    fn split(names: &str) -> Vec<&str> {
        names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect()
    }

    fn apply(model: &mut Model, fk: ForeignKeyId) {
        let Some(foreign_key) = model.foreign_key(fk) else {
            return;
        };
        let dependent = foreign_key.declaring_type;
        let navigations: Vec<NavigationId> = foreign_key.navigations().collect();

        let mut named: Option<Vec<String>> = None;
        for navigation in &navigations {
            if let Some(marker) = navigation_member(model, *navigation)
                .as_ref()
                .and_then(|m| m.foreign_key_marker())
            {
                named = Some(Self::split(marker).into_iter().map(str::to_string).collect());
            }
        }
        if named.is_none() {
            let to_principal = foreign_key
                .dependent_to_principal
                .and_then(|n| model.navigation(n))
                .map(|n| n.name.clone());
            if let Some(to_principal) = to_principal {
                let backing: Vec<String> = members_of(model, dependent.into())
                    .into_iter()
                    .filter(|m| m.foreign_key_marker() == Some(to_principal.as_str()))
                    .map(|m| m.name)
                    .collect();
                if !backing.is_empty() {
                    named = Some(backing);
                }
            }
        }
        let Some(names) = named else {
            return;
        };
        let properties: Option<Vec<PropertyId>> = names
            .iter()
            .map(|n| model.find_property(dependent.into(), n))
            .collect();
        let Some(properties) = properties else {
            return;
        };
        let settled = model.foreign_key(fk).is_some_and(|f| {
            f.properties == properties && f.properties_source >= Some(ANNOTATION)
        });
        if settled {
            return;
        }
        if !model.set_foreign_key_properties(fk, &properties, ANNOTATION) {
            debug!(foreign_key = %fk, "foreign key marker not applied");
        }
    }
}

impl Convention for ForeignKeyMarkerConvention {
    fn name(&self) -> &'static str {
        "foreign_key_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.navigation_added.push(self.clone());
        set.property_added.push(self.clone());
        set.foreign_key_principal_end_changed.push(self.clone());
        set.model_finalizing.push(self);
    }
}

impl NavigationAddedConvention for ForeignKeyMarkerConvention {
    fn process_navigation_added(
        &self,
        model: &mut Model,
        navigation: NavigationId,
        _context: &mut ConventionContext<NavigationId>,
    ) {
        if let Some(fk) = model.navigation(navigation).map(|n| n.foreign_key) {
            Self::apply(model, fk);
        }
    }
}

impl PropertyAddedConvention for ForeignKeyMarkerConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let Some(TypeBaseId::Entity(entity_type)) =
            model.property(property).map(|p| p.declaring_type)
        else {
            return;
        };
        let mut affected = vec![entity_type];
        affected.extend(model.all_derived_types(entity_type));
        let foreign_keys: Vec<ForeignKeyId> = affected
            .into_iter()
            .filter_map(|e| model.entity_type(e))
            .flat_map(|e| e.foreign_keys.clone())
            .collect();
        for fk in foreign_keys {
            Self::apply(model, fk);
        }
    }
}

impl ForeignKeyPrincipalEndChangedConvention for ForeignKeyMarkerConvention {
    fn process_foreign_key_principal_end_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::apply(model, foreign_key);
    }
}

impl ModelFinalizingConvention for ForeignKeyMarkerConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        let navigations: Vec<NavigationId> = model
            .entity_types()
            .flat_map(|(_, e)| e.navigations.clone())
            .collect();
        for navigation in navigations {
            let Some(marker) = navigation_member(model, navigation)
                .and_then(|m| m.foreign_key_marker().map(str::to_string))
            else {
                continue;
            };
            let Some(nav) = model.navigation(navigation) else {
                continue;
            };
            let (declaring, nav_name) = (nav.declaring_type, nav.name.clone());
            let dependent = model
                .foreign_key(nav.foreign_key)
                .map(|f| f.declaring_type)
                .unwrap_or(declaring);
            for name in Self::split(&marker) {
                if model.find_property(dependent.into(), name).is_none() {
                    let type_name = model.type_name(declaring.into());
                    let dependent_name = model.type_name(dependent.into());
                    model.report_error(
                        &type_name,
                        format!(
                            "navigation `{nav_name}` names foreign key property `{name}`, which is not mapped on `{dependent_name}`"
                        ),
                    );
                }
            }
        }
    }
}

/// Validates `InverseProperty` markers. The pairing itself happens during
/// relationship discovery.
pub struct InversePropertyMarkerConvention;

impl Convention for InversePropertyMarkerConvention {
    fn name(&self) -> &'static str {
        "inverse_property_marker"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.model_finalizing.push(self);
    }
}

impl ModelFinalizingConvention for InversePropertyMarkerConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        for entity_type in model.entity_type_ids() {
            let type_name = model.type_name(entity_type.into());
            let own_host = model.entity_type(entity_type).and_then(|e| e.host_type.clone());
            for member in members_of(model, entity_type.into()) {
                let Some(inverse) = member.inverse_property_marker() else {
                    continue;
                };
                if model.is_member_ignored(entity_type.into(), &member.name).is_some() {
                    continue;
                }
                let Some(target) = member.ty.target().filter(|t| is_entity_candidate(model, t))
                else {
                    continue;
                };
                if own_host.as_deref() == Some(target) && inverse == member.name {
                    model.report_error(
                        &type_name,
                        format!("`{}` is marked as its own inverse", member.name),
                    );
                    continue;
                }
                let target_type = model.find_entity_type_by_host(target);
                let exists = model
                    .host()
                    .get(target)
                    .is_some_and(|t| {
                        std::iter::once(t.name.clone())
                            .chain(model.host().ancestors(&t.name))
                            .filter_map(|n| model.host().get(&n))
                            .any(|t| t.member(inverse).is_some_and(|m| m.ty.target().is_some()))
                    });
                let ignored = target_type
                    .is_some_and(|t| model.is_member_ignored(t.into(), inverse).is_some());
                if !exists || ignored {
                    model.report_error(
                        &type_name,
                        format!(
                            "`{}` names inverse `{target}.{inverse}`, which is not a mapped navigation",
                            member.name
                        ),
                    );
                }
            }
        }
    }
}
