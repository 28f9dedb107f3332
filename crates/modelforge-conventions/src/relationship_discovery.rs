//! Turns reference and collection members into relationships.
//!
//! Members of an entity type are grouped by the entity type they point at
//! and matched against the members pointing back:
//!
//! - `InverseProperty` markers pair two members outright.
//! - One member on each side pair up; reference/collection becomes a
//!   one-to-many, reference/reference a one-to-one and
//!   collection/collection a many-to-many through skip navigations.
//! - Members with nothing pointing back become unidirectional.
//! - Anything else is ambiguous: no relationship is created and the member
//!   names are recorded in an annotation that validation rejects.
//!
//! Re-running discovery over an unchanged neighbourhood changes nothing.

use std::rc::Rc;

use ahash::AHashMap;
use modelforge_metadata::conventions::{
    EntityTypeAddedConvention, EntityTypeBaseTypeChangedConvention,
    EntityTypeMemberIgnoredConvention, EntityTypePrimaryKeyChangedConvention,
    NavigationRemovedConvention, SkipNavigationRemovedConvention,
};
use modelforge_metadata::{
    codes, AnnotationTarget, ConfigurationSource, Convention, ConventionContext, ConventionSet,
    DiagnosticLevel, EntityTypeId, ForeignKeyId, KeyId, Member, Model, NavigationId,
    SkipNavigation, SkipNavigationId,
};
use serde_json::Value;
use tracing::{debug, trace};

use crate::host_scope::{is_entity_candidate, member_named, members_of, referencing_entity_types};
use crate::AMBIGUOUS_NAVIGATIONS;

const CONVENTION: ConfigurationSource = ConfigurationSource::Convention;

/// A host member that may become a navigation.
#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    target: EntityTypeId,
    collection: bool,
    inverse: Option<String>,
}

impl Candidate {
    fn names(&self, other: &Candidate) -> bool {
        self.inverse.as_deref() == Some(other.name.as_str())
            || other.inverse.as_deref() == Some(self.name.as_str())
    }
}

#[derive(Debug)]
enum Mapping {
    Pair {
        own: Candidate,
        other: Candidate,
        source: ConfigurationSource,
    },
    Unidirectional(Candidate),
}

pub struct RelationshipDiscoveryConvention;

impl RelationshipDiscoveryConvention {
    /// Members of `entity_type` that discovery is allowed to map.
    fn candidates(model: &Model, entity_type: EntityTypeId) -> Vec<Candidate> {
        members_of(model, entity_type.into())
            .into_iter()
            .filter_map(|member| {
                let target_host = member.ty.target()?;
                if !is_entity_candidate(model, target_host)
                    || model.is_member_ignored(entity_type.into(), &member.name).is_some()
                {
                    return None;
                }
                if let Some(existing) = model.find_member(entity_type.into(), &member.name) {
                    let scalar = matches!(existing, Member::Property(_) | Member::ComplexProperty(_));
                    if scalar || model.member_source(existing) > Some(CONVENTION) {
                        return None;
                    }
                }
                let target = model.find_entity_type_by_host(target_host)?;
                Some(Candidate {
                    inverse: member.inverse_property_marker().map(str::to_string),
                    collection: member.ty.is_collection(),
                    name: member.name,
                    target,
                })
            })
            .collect()
    }

    /// Map the targets of `entity_type`'s members as entity types.
    fn create_targets(model: &mut Model, entity_type: EntityTypeId) {
        let targets: Vec<String> = members_of(model, entity_type.into())
            .into_iter()
            .filter(|m| model.is_member_ignored(entity_type.into(), &m.name).is_none())
            .filter_map(|m| m.ty.target().map(str::to_string))
            .filter(|t| is_entity_candidate(model, t))
            .filter(|t| model.is_ignored(t).is_none() && model.find_entity_type_by_host(t).is_none())
            .collect();
        for target in targets {
            if model.find_entity_type_by_host(&target).is_none() {
                trace!(target = %target, "mapping navigation target");
                model.add_entity_type(&target, Some(&target), CONVENTION);
            }
        }
    }

    fn discover(model: &mut Model, entity_type: EntityTypeId, create_targets: bool) {
        let mapped = model
            .entity_type(entity_type)
            .is_some_and(|e| !e.is_shadow());
        if !mapped {
            return;
        }
        if create_targets {
            Self::create_targets(model, entity_type);
            if model.entity_type(entity_type).is_none() {
                return;
            }
        }
        model.batch(|m| Self::map_members(m, entity_type));
    }

    fn map_members(model: &mut Model, entity_type: EntityTypeId) {
        let mut groups: AHashMap<EntityTypeId, Vec<Candidate>> = AHashMap::new();
        for candidate in Self::candidates(model, entity_type) {
            groups.entry(candidate.target).or_default().push(candidate);
        }
        let mut targets: Vec<EntityTypeId> = groups.keys().copied().collect();
        targets.sort();

        let mut ambiguous = Vec::new();
        for target in targets {
            let own = groups.remove(&target).unwrap_or_default();
            let mappings = if target == entity_type {
                classify_self(own, &mut ambiguous)
            } else {
                let inverse: Vec<Candidate> = Self::candidates(model, target)
                    .into_iter()
                    .filter(|c| c.target == entity_type)
                    .collect();
                classify(own, inverse, &mut ambiguous)
            };
            for mapping in mappings {
                Self::apply(model, entity_type, target, mapping);
            }
        }
        Self::record_ambiguity(model, entity_type, ambiguous);
    }

    fn apply(model: &mut Model, entity_type: EntityTypeId, target: EntityTypeId, mapping: Mapping) {
        match mapping {
            Mapping::Pair { own, other, source } => match (own.collection, other.collection) {
                (false, true) => ensure_relationship(
                    model,
                    entity_type,
                    target,
                    Some(&own.name),
                    Some(&other.name),
                    source,
                ),
                (true, false) => ensure_relationship(
                    model,
                    target,
                    entity_type,
                    Some(&other.name),
                    Some(&own.name),
                    source,
                ),
                (false, false) => {
                    // One-to-one: the side that sorts last is the dependent
                    // until foreign-key discovery says otherwise.
                    let own_is_dependent = if entity_type == target {
                        own.name > other.name
                    } else {
                        model.type_name(entity_type.into()) > model.type_name(target.into())
                    };
                    if own_is_dependent {
                        ensure_relationship(
                            model,
                            entity_type,
                            target,
                            Some(&own.name),
                            Some(&other.name),
                            source,
                        );
                    } else {
                        ensure_relationship(
                            model,
                            target,
                            entity_type,
                            Some(&other.name),
                            Some(&own.name),
                            source,
                        );
                    }
                }
                (true, true) => {
                    ensure_skip_pair(model, entity_type, &own.name, target, &other.name, source)
                }
            },
            Mapping::Unidirectional(own) if own.collection => {
                ensure_relationship(model, target, entity_type, None, Some(&own.name), CONVENTION);
            }
            Mapping::Unidirectional(own) => {
                ensure_relationship(model, entity_type, target, Some(&own.name), None, CONVENTION);
            }
        }
    }

    fn record_ambiguity(model: &mut Model, entity_type: EntityTypeId, mut ambiguous: Vec<String>) {
        ambiguous.sort();
        ambiguous.dedup();
        let type_name = model.type_name(entity_type.into());
        for name in &ambiguous {
            if let Some(navigation) = model.declared_navigation(entity_type, name) {
                model.remove_navigation(navigation, CONVENTION);
            }
            if let Some(skip) = model.declared_skip_navigation(entity_type, name) {
                model.remove_skip_navigation(skip, CONVENTION);
            }
            let target = member_named(model, entity_type.into(), name)
                .and_then(|m| m.ty.target().map(str::to_string))
                .unwrap_or_default();
            model.report(
                DiagnosticLevel::Warning,
                codes::AMBIGUOUS_NAVIGATION,
                format!(
                    "`{type_name}.{name}` is ambiguous: several navigations between `{type_name}` and `{target}` could pair with it"
                ),
            );
        }
        let target = AnnotationTarget::EntityType(entity_type);
        let value = (!ambiguous.is_empty())
            .then(|| Value::Array(ambiguous.into_iter().map(Value::String).collect()));
        if model.annotation(target, AMBIGUOUS_NAVIGATIONS) != value.as_ref() {
            model.set_annotation(target, AMBIGUOUS_NAVIGATIONS, value, CONVENTION);
        }
    }

    fn rediscover_neighbourhood(model: &mut Model, entity_type: EntityTypeId) {
        let mut affected = vec![entity_type];
        affected.extend(referencing_entity_types(model, entity_type));
        for id in affected {
            Self::discover(model, id, false);
        }
    }
}

/// Split members pointing at another entity type into mappings.
fn classify(
    mut own: Vec<Candidate>,
    mut inverse: Vec<Candidate>,
    ambiguous: &mut Vec<String>,
) -> Vec<Mapping> {
    let mut mappings = Vec::new();
    let mut i = 0;
    while i < own.len() {
        match inverse.iter().position(|other| own[i].names(other)) {
            Some(p) => mappings.push(Mapping::Pair {
                own: own.remove(i),
                other: inverse.remove(p),
                source: ConfigurationSource::DataAnnotation,
            }),
            None => i += 1,
        }
    }
    match (own.len(), inverse.len()) {
        (0, _) => {}
        (1, 1) => mappings.push(Mapping::Pair {
            own: own.remove(0),
            other: inverse.remove(0),
            source: CONVENTION,
        }),
        (_, 0) => mappings.extend(own.into_iter().map(Mapping::Unidirectional)),
        _ => ambiguous.extend(own.into_iter().map(|c| c.name)),
    }
    mappings
}

/// Split self-referencing members into mappings.
fn classify_self(mut own: Vec<Candidate>, ambiguous: &mut Vec<String>) -> Vec<Mapping> {
    let mut mappings = Vec::new();
    let mut i = 0;
    while i < own.len() {
        let partner = own
            .iter()
            .enumerate()
            .position(|(j, other)| j != i && own[i].names(other));
        match partner {
            Some(p) => {
                let (first, second) = if i < p { (i, p) } else { (p, i) };
                let other = own.remove(second);
                let this = own.remove(first);
                mappings.push(Mapping::Pair {
                    own: this,
                    other,
                    source: ConfigurationSource::DataAnnotation,
                });
                i = 0;
            }
            None => i += 1,
        }
    }
    match own.len() {
        0 => {}
        1 => mappings.extend(own.into_iter().map(Mapping::Unidirectional)),
        2 => {
            let other = own.remove(1);
            let this = own.remove(0);
            mappings.push(Mapping::Pair {
                own: this,
                other,
                source: CONVENTION,
            });
        }
        _ => ambiguous.extend(own.into_iter().map(|c| c.name)),
    }
    mappings
}

/// Make sure a relationship `dependent -> principal` carries exactly the
/// named navigations, reusing what is already there.
fn ensure_relationship(
    model: &mut Model,
    dependent: EntityTypeId,
    principal: EntityTypeId,
    to_principal: Option<&str>,
    to_dependent: Option<&str>,
    source: ConfigurationSource,
) {
    let wanted: Vec<(EntityTypeId, &str, bool)> = to_principal
        .map(|n| (dependent, n, true))
        .into_iter()
        .chain(to_dependent.map(|n| (principal, n, false)))
        .collect();
    for (declaring, name, _) in &wanted {
        if let Some(skip) = model.declared_skip_navigation(*declaring, name) {
            model.remove_skip_navigation(skip, CONVENTION);
        }
    }
    let existing: Vec<Option<NavigationId>> = wanted
        .iter()
        .map(|(declaring, name, _)| model.declared_navigation(*declaring, name))
        .collect();
    let foreign_keys: Vec<_> = existing
        .iter()
        .flatten()
        .filter_map(|n| model.navigation(*n).map(|n| n.foreign_key))
        .collect();

    if let [fk, rest @ ..] = foreign_keys.as_slice() {
        let nav_count = model.foreign_key(*fk).map_or(0, |f| f.navigations().count());
        let shared = rest.iter().all(|other| other == fk) && nav_count == foreign_keys.len();
        if shared && foreign_keys.len() == wanted.len() {
            return;
        }
        if shared
            && foreign_keys.len() == 1
            && promote(model, *fk, dependent, principal, &wanted, &existing, source)
        {
            return;
        }
    }

    for navigation in existing.into_iter().flatten() {
        if !model.remove_navigation(navigation, CONVENTION) {
            debug!(navigation = %navigation, "navigation is configured above convention");
            return;
        }
    }
    model.add_relationship(dependent, principal, to_principal, to_dependent, source);
}

/// Add the missing navigation to a relationship that already carries the
/// other one on the expected side.
fn promote(
    model: &mut Model,
    fk: ForeignKeyId,
    dependent: EntityTypeId,
    principal: EntityTypeId,
    wanted: &[(EntityTypeId, &str, bool)],
    existing: &[Option<NavigationId>],
    source: ConfigurationSource,
) -> bool {
    let oriented = model
        .foreign_key(fk)
        .is_some_and(|f| f.declaring_type == dependent && f.principal_type == principal);
    if !oriented {
        return false;
    }
    let mut present = None;
    let mut missing = None;
    for (&(_, name, on_dependent), navigation) in wanted.iter().zip(existing) {
        match navigation {
            Some(navigation) => present = Some((*navigation, on_dependent)),
            None => missing = Some((name, on_dependent)),
        }
    }
    let (Some((navigation, present_on_dependent)), Some((name, on_dependent))) = (present, missing)
    else {
        return false;
    };
    let same_side = model
        .navigation(navigation)
        .is_some_and(|n| n.on_dependent == present_on_dependent);
    if !same_side {
        return false;
    }
    if !on_dependent {
        let reference = member_named(model, principal.into(), name)
            .is_some_and(|m| !m.ty.is_collection());
        model.set_foreign_key_unique(fk, reference, source);
    }
    model.add_navigation(fk, name, on_dependent, source).is_some()
}

fn ensure_skip_pair(
    model: &mut Model,
    left: EntityTypeId,
    left_name: &str,
    right: EntityTypeId,
    right_name: &str,
    source: ConfigurationSource,
) {
    for (declaring, name) in [(left, left_name), (right, right_name)] {
        if let Some(navigation) = model.declared_navigation(declaring, name) {
            if !model.remove_navigation(navigation, CONVENTION) {
                return;
            }
        }
    }
    let Some(left_skip) = model.add_skip_navigation(left, left_name, right, true, source) else {
        return;
    };
    let Some(right_skip) = model.add_skip_navigation(right, right_name, left, true, source) else {
        return;
    };
    let paired = |s: Option<&SkipNavigation>, other: SkipNavigationId| {
        s.is_some_and(|s| s.inverse() == Some(other))
    };
    if !paired(model.skip_navigation(left_skip), right_skip) {
        model.set_skip_navigation_inverse(left_skip, Some(right_skip), source);
    }
    if !paired(model.skip_navigation(right_skip), left_skip) {
        model.set_skip_navigation_inverse(right_skip, Some(left_skip), source);
    }
}

impl Convention for RelationshipDiscoveryConvention {
    fn name(&self) -> &'static str {
        "relationship_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self.clone());
        set.entity_type_base_type_changed.push(self.clone());
        set.entity_type_member_ignored.push(self.clone());
        set.entity_type_primary_key_changed.push(self.clone());
        set.navigation_removed.push(self.clone());
        set.skip_navigation_removed.push(self);
    }
}

impl EntityTypeAddedConvention for RelationshipDiscoveryConvention {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        Self::discover(model, entity_type, true);
    }
}

impl EntityTypeBaseTypeChangedConvention for RelationshipDiscoveryConvention {
    fn process_entity_type_base_type_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<EntityTypeId>,
        _old: Option<EntityTypeId>,
        _context: &mut ConventionContext<Option<EntityTypeId>>,
    ) {
        Self::discover(model, entity_type, true);
    }
}

impl EntityTypeMemberIgnoredConvention for RelationshipDiscoveryConvention {
    fn process_entity_type_member_ignored(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        name: &str,
        _context: &mut ConventionContext<String>,
    ) {
        let target = member_named(model, entity_type.into(), name)
            .and_then(|m| m.ty.target().map(str::to_string))
            .and_then(|t| model.find_entity_type_by_host(&t));
        Self::discover(model, entity_type, false);
        if let Some(target) = target.filter(|t| *t != entity_type) {
            Self::discover(model, target, false);
        }
    }
}

impl EntityTypePrimaryKeyChangedConvention for RelationshipDiscoveryConvention {
    fn process_entity_type_primary_key_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        new: Option<KeyId>,
        _old: Option<KeyId>,
        _context: &mut ConventionContext<Option<KeyId>>,
    ) {
        if new.is_some() {
            Self::rediscover_neighbourhood(model, entity_type);
        }
    }
}

impl NavigationRemovedConvention for RelationshipDiscoveryConvention {
    fn process_navigation_removed(
        &self,
        model: &mut Model,
        declaring_type: EntityTypeId,
        target_type: EntityTypeId,
        _name: &str,
        _context: &mut ConventionContext<String>,
    ) {
        Self::discover(model, declaring_type, false);
        if target_type != declaring_type {
            Self::discover(model, target_type, false);
        }
    }
}

impl SkipNavigationRemovedConvention for RelationshipDiscoveryConvention {
    fn process_skip_navigation_removed(
        &self,
        model: &mut Model,
        declaring_type: EntityTypeId,
        removed: &SkipNavigation,
        _context: &mut ConventionContext<()>,
    ) {
        Self::discover(model, declaring_type, false);
        if removed.target_type != declaring_type {
            Self::discover(model, removed.target_type, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use modelforge_metadata::arena::ArenaId;

    use super::*;

    fn candidate(name: &str, collection: bool) -> Candidate {
        Candidate {
            name: name.to_string(),
            target: EntityTypeId::from_index(0),
            collection,
            inverse: None,
        }
    }

    #[test]
    fn one_member_each_side_pairs() {
        let mut ambiguous = Vec::new();
        let mappings = classify(
            vec![candidate("Posts", true)],
            vec![candidate("Blog", false)],
            &mut ambiguous,
        );
        assert!(matches!(mappings.as_slice(), [Mapping::Pair { source: CONVENTION, .. }]));
        assert!(ambiguous.is_empty());
    }

    #[test]
    fn two_members_against_one_are_ambiguous_unless_marked() {
        let mut ambiguous = Vec::new();
        let own = vec![candidate("Author", false), candidate("Editor", false)];
        let inverse = vec![candidate("Posts", true)];
        assert!(classify(own.clone(), inverse.clone(), &mut ambiguous).is_empty());
        assert_eq!(ambiguous, vec!["Author", "Editor"]);

        let mut ambiguous = Vec::new();
        let mut marked = own;
        marked[0].inverse = Some("Posts".to_string());
        let mappings = classify(marked, inverse, &mut ambiguous);
        assert_eq!(mappings.len(), 2);
        assert!(matches!(
            &mappings[0],
            Mapping::Pair { own, source: ConfigurationSource::DataAnnotation, .. } if own.name == "Author"
        ));
        assert!(matches!(&mappings[1], Mapping::Unidirectional(c) if c.name == "Editor"));
    }

    #[test]
    fn self_references() {
        let mut ambiguous = Vec::new();
        let mappings = classify_self(
            vec![candidate("Manager", false), candidate("Reports", true)],
            &mut ambiguous,
        );
        assert!(matches!(mappings.as_slice(), [Mapping::Pair { .. }]));

        let mappings = classify_self(
            vec![
                candidate("Mentor", false),
                candidate("Manager", false),
                candidate("Reports", true),
            ],
            &mut ambiguous,
        );
        assert!(mappings.is_empty());
        assert_eq!(ambiguous.len(), 3);
    }
}
