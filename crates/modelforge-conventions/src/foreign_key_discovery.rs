//! Picks the dependent properties of relationships created without them.
//!
//! Candidate names are tried in rank order against the dependent's
//! properties (case-insensitive, placeholders excluded):
//!
//! 1. `<navigation><key property>`
//! 2. `<navigation>Id`, for a single key property named `Id` or `...Id`
//! 3. `<principal type><key property>`
//! 4. `<principal type>Id`, same condition as 2
//! 5. the dependent's own primary key, for one-to-one relationships whose
//!    principal end is known
//!
//! A rank matches only when every key property resolves to a distinct
//! property of a compatible type. Partial matches are reported and skipped.
//! Without a match the synthesized placeholders stay in place.

use std::collections::BTreeMap;
use std::rc::Rc;

use modelforge_metadata::conventions::{
    EntityTypePrimaryKeyChangedConvention, ForeignKeyAddedConvention,
    ForeignKeyPrincipalEndChangedConvention, ForeignKeyPropertiesChangedConvention,
    ForeignKeyUniquenessChangedConvention, ModelFinalizingConvention, NavigationAddedConvention,
    PropertyAddedConvention,
};
use modelforge_metadata::{
    codes, ConfigurationSource, Convention, ConventionContext, ConventionSet, DiagnosticLevel,
    EntityTypeId, ForeignKeyId, KeyId, Model, NavigationId, PropertyId, TypeBaseId,
};
use tracing::debug;

use crate::host_scope::same_name;

const CONVENTION: ConfigurationSource = ConfigurationSource::Convention;

/// Rank of a dependent-primary-key match.
const DEPENDENT_KEY_RANK: u8 = 5;

/// One way of looking at a relationship: which side holds the properties.
struct Orientation {
    dependent: EntityTypeId,
    principal: EntityTypeId,
    key_properties: Vec<PropertyId>,
    navigation: Option<String>,
}

enum Outcome {
    Match(Vec<PropertyId>),
    Rejected(String),
    Missing,
}

/// Best match for an orientation plus the reasons lower-ranked candidates
/// were turned down.
struct Search {
    found: Option<(u8, Vec<PropertyId>)>,
    rejected: Vec<String>,
}

pub struct ForeignKeyPropertyDiscoveryConvention;

impl ForeignKeyPropertyDiscoveryConvention {
    fn orientation(model: &Model, fk: ForeignKeyId) -> Option<Orientation> {
        let foreign_key = model.foreign_key(fk)?;
        Some(Orientation {
            dependent: foreign_key.declaring_type,
            principal: foreign_key.principal_type,
            key_properties: model.key(foreign_key.principal_key)?.properties.clone(),
            navigation: foreign_key
                .dependent_to_principal
                .and_then(|n| model.navigation(n))
                .map(|n| n.name.clone()),
        })
    }

    /// Name patterns by rank, one name per key property.
    fn patterns(model: &Model, orientation: &Orientation) -> Vec<(u8, Vec<String>)> {
        let key_names: Vec<&str> = orientation
            .key_properties
            .iter()
            .map(|p| model.property_name(*p))
            .collect();
        let single_id = match key_names.as_slice() {
            [single] => same_name(single, "Id") || single.ends_with("Id"),
            _ => false,
        };
        let principal_name = model.type_name(orientation.principal.into());
        let prefixes = [
            (1, orientation.navigation.clone()),
            (3, Some(principal_name)),
        ];
        let mut patterns = Vec::new();
        for (rank, prefix) in prefixes {
            let Some(prefix) = prefix else {
                continue;
            };
            let names: Vec<String> = key_names.iter().map(|k| format!("{prefix}{k}")).collect();
            let id_name = format!("{prefix}Id");
            let distinct_id = !same_name(&names[0], &id_name);
            patterns.push((rank, names));
            if single_id && distinct_id {
                patterns.push((rank + 1, vec![id_name]));
            }
        }
        patterns
    }

    fn resolve(
        model: &Model,
        pool: &[PropertyId],
        key_properties: &[PropertyId],
        names: &[String],
    ) -> Outcome {
        let found: Vec<Option<PropertyId>> = names
            .iter()
            .map(|name| {
                pool.iter()
                    .copied()
                    .find(|p| same_name(model.property_name(*p), name))
            })
            .collect();
        if found.iter().all(Option::is_none) {
            return Outcome::Missing;
        }
        let wanted = names.join(", ");
        if found.iter().any(Option::is_none) {
            let partial: Vec<&str> = found
                .iter()
                .flatten()
                .map(|p| model.property_name(*p))
                .collect();
            return Outcome::Rejected(format!(
                "partial match ({}) for ({wanted})",
                partial.join(", ")
            ));
        }
        let found: Vec<PropertyId> = found.into_iter().flatten().collect();
        let mut distinct = found.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() != found.len() {
            return Outcome::Rejected(format!("({wanted}) resolve to the same property twice"));
        }
        for (candidate, key) in found.iter().zip(key_properties) {
            let (Some(candidate), Some(key)) = (model.property(*candidate), model.property(*key))
            else {
                return Outcome::Missing;
            };
            if !candidate.value_type.is_compatible_with(&key.value_type) {
                return Outcome::Rejected(format!(
                    "`{}` is {} but key property `{}` is {}",
                    candidate.name, candidate.value_type, key.name, key.value_type
                ));
            }
        }
        Outcome::Match(found)
    }

    fn search(model: &Model, orientation: &Orientation) -> Search {
        let pool: Vec<PropertyId> = model
            .properties_of(orientation.dependent)
            .into_iter()
            .filter(|p| model.property(*p).is_some_and(|p| !p.is_implicit()))
            .collect();
        let mut rejected = Vec::new();
        for (rank, names) in Self::patterns(model, orientation) {
            match Self::resolve(model, &pool, &orientation.key_properties, &names) {
                Outcome::Match(found) => {
                    return Search {
                        found: Some((rank, found)),
                        rejected,
                    }
                }
                Outcome::Rejected(reason) => rejected.push(reason),
                Outcome::Missing => {}
            }
        }
        Search {
            found: None,
            rejected,
        }
    }

    /// The dependent's primary key, when a one-to-one may share it.
    fn dependent_key_match(model: &Model, fk: ForeignKeyId) -> Option<Vec<PropertyId>> {
        let foreign_key = model.foreign_key(fk)?;
        let end_known = foreign_key.unique.source() > Some(CONVENTION)
            || foreign_key.principal_end_source.is_some();
        let optional_by_choice =
            foreign_key.required.source() > Some(CONVENTION) && !foreign_key.required.get();
        if !foreign_key.is_unique()
            || !end_known
            || optional_by_choice
            || model.is_same_hierarchy(foreign_key.declaring_type, foreign_key.principal_type)
        {
            return None;
        }
        let dependent_key = model.primary_key_properties(foreign_key.declaring_type);
        let principal_key = &model.key(foreign_key.principal_key)?.properties;
        if dependent_key.is_empty() || dependent_key.len() != principal_key.len() {
            return None;
        }
        let compatible = dependent_key.iter().zip(principal_key).all(|(d, p)| {
            match (model.property(*d), model.property(*p)) {
                (Some(d), Some(p)) => d.value_type.is_compatible_with(&p.value_type),
                _ => false,
            }
        });
        if !compatible || Self::claimed_elsewhere(model, fk, &dependent_key) {
            return None;
        }
        Some(dependent_key)
    }

    /// Best properties for `fk` and their rank, reporting rejected
    /// candidates when asked to.
    fn best(model: &mut Model, fk: ForeignKeyId, report: bool) -> Option<(u8, Vec<PropertyId>)> {
        let orientation = Self::orientation(model, fk)?;
        let search = Self::search(model, &orientation);
        if report {
            let dependent = model.type_name(orientation.dependent.into());
            let principal = model.type_name(orientation.principal.into());
            for reason in search.rejected {
                model.report(
                    DiagnosticLevel::Debug,
                    codes::FOREIGN_KEY_CANDIDATE_REJECTED,
                    format!("foreign key `{dependent}` -> `{principal}`: {reason}"),
                );
            }
        }
        search.found.or_else(|| {
            Self::dependent_key_match(model, fk).map(|key| (DEPENDENT_KEY_RANK, key))
        })
    }

    fn claimed_elsewhere(model: &Model, fk: ForeignKeyId, properties: &[PropertyId]) -> bool {
        model
            .foreign_keys()
            .any(|(other, f)| other != fk && f.properties == properties)
    }

    /// A one-to-one whose principal end was guessed flips when only the
    /// other side carries matching properties.
    fn try_invert(model: &mut Model, fk: ForeignKeyId) -> bool {
        let Some(foreign_key) = model.foreign_key(fk) else {
            return false;
        };
        if !foreign_key.is_unique()
            || foreign_key.principal_end_source.is_some()
            || foreign_key.is_self_referencing()
        {
            return false;
        }
        let dependent = foreign_key.declaring_type;
        let inverted = Orientation {
            dependent: foreign_key.principal_type,
            principal: dependent,
            key_properties: model.primary_key_properties(dependent),
            navigation: foreign_key
                .principal_to_dependent
                .and_then(|n| model.navigation(n))
                .map(|n| n.name.clone()),
        };
        if inverted.key_properties.is_empty() || Self::search(model, &inverted).found.is_none() {
            return false;
        }
        debug!(foreign_key = %fk, "inverting one-to-one to follow its foreign key properties");
        model.set_principal_end(fk, dependent, CONVENTION)
    }

    fn discover(model: &mut Model, fk: ForeignKeyId) {
        let Some(foreign_key) = model.foreign_key(fk) else {
            return;
        };
        if !CONVENTION.overrides(foreign_key.properties_source) {
            return;
        }
        let (current, properties_source) =
            (foreign_key.properties.clone(), foreign_key.properties_source);
        match Self::best(model, fk, true) {
            Some((_, found)) if found == current => {
                if properties_source.is_none() {
                    model.set_foreign_key_properties(fk, &found, CONVENTION);
                }
            }
            Some((_, found)) => {
                if Self::claimed_elsewhere(model, fk, &found) {
                    debug!(foreign_key = %fk, "candidate properties are used by another foreign key");
                    return;
                }
                model.set_foreign_key_properties(fk, &found, CONVENTION);
            }
            None => {
                if Self::try_invert(model, fk) {
                    return;
                }
                if properties_source.is_some() {
                    model.release_foreign_key_properties(fk, CONVENTION);
                }
            }
        }
    }

    fn discover_for_type(model: &mut Model, entity_type: EntityTypeId) {
        let mut affected = vec![entity_type];
        affected.extend(model.all_derived_types(entity_type));
        let foreign_keys: Vec<ForeignKeyId> = affected
            .into_iter()
            .filter_map(|e| model.entity_type(e))
            .flat_map(|e| e.foreign_keys.clone())
            .collect();
        for fk in foreign_keys {
            Self::discover(model, fk);
        }
    }
}

impl Convention for ForeignKeyPropertyDiscoveryConvention {
    fn name(&self) -> &'static str {
        "foreign_key_property_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.foreign_key_added.push(self.clone());
        set.property_added.push(self.clone());
        set.foreign_key_properties_changed.push(self.clone());
        set.foreign_key_principal_end_changed.push(self.clone());
        set.foreign_key_uniqueness_changed.push(self.clone());
        set.entity_type_primary_key_changed.push(self.clone());
        set.navigation_added.push(self.clone());
        set.model_finalizing.push(self);
    }
}

impl ForeignKeyAddedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_foreign_key_added(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::discover(model, foreign_key);
    }
}

impl PropertyAddedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let declaring_type = match model.property(property) {
            Some(p) if !p.is_implicit() => p.declaring_type,
            _ => return,
        };
        if let TypeBaseId::Entity(entity_type) = declaring_type {
            Self::discover_for_type(model, entity_type);
        }
    }
}

impl ForeignKeyPropertiesChangedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_foreign_key_properties_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _old_properties: &[PropertyId],
        _old_principal_key: KeyId,
        context: &mut ConventionContext<Vec<PropertyId>>,
    ) {
        Self::discover(model, foreign_key);
        if let Some(current) = model.foreign_key(foreign_key).map(|f| f.properties.clone()) {
            context.stop_processing_if_changed(current);
        }
    }
}

impl ForeignKeyPrincipalEndChangedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_foreign_key_principal_end_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _context: &mut ConventionContext<ForeignKeyId>,
    ) {
        Self::discover(model, foreign_key);
    }
}

impl ForeignKeyUniquenessChangedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_foreign_key_uniqueness_changed(
        &self,
        model: &mut Model,
        foreign_key: ForeignKeyId,
        _unique: bool,
        _context: &mut ConventionContext<bool>,
    ) {
        Self::discover(model, foreign_key);
    }
}

impl EntityTypePrimaryKeyChangedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_entity_type_primary_key_changed(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _new: Option<KeyId>,
        _old: Option<KeyId>,
        _context: &mut ConventionContext<Option<KeyId>>,
    ) {
        Self::discover_for_type(model, entity_type);
    }
}

impl NavigationAddedConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_navigation_added(
        &self,
        model: &mut Model,
        navigation: NavigationId,
        _context: &mut ConventionContext<NavigationId>,
    ) {
        if let Some(fk) = model.navigation(navigation).map(|n| n.foreign_key) {
            Self::discover(model, fk);
        }
    }
}

impl ModelFinalizingConvention for ForeignKeyPropertyDiscoveryConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        let open = |model: &Model| -> Vec<ForeignKeyId> {
            model
                .foreign_keys()
                .filter(|(_, f)| CONVENTION.overrides(f.properties_source))
                .map(|(id, _)| id)
                .collect()
        };
        for fk in open(model) {
            Self::discover(model, fk);
        }

        let mut wanted: BTreeMap<Vec<PropertyId>, Vec<(u8, ForeignKeyId)>> = BTreeMap::new();
        for fk in open(model) {
            if let Some((rank, properties)) = Self::best(model, fk, false) {
                wanted.entry(properties).or_default().push((rank, fk));
            }
        }
        for (properties, mut claims) in wanted {
            claims.sort();
            let [(first_rank, first), (second_rank, second), ..] = claims.as_slice() else {
                continue;
            };
            if first_rank != second_rank {
                continue;
            }
            let describe = |model: &Model, fk: ForeignKeyId| {
                model
                    .foreign_key(fk)
                    .map(|f| {
                        let via = f
                            .dependent_to_principal
                            .and_then(|n| model.navigation(n))
                            .map(|n| format!(" via `{}`", n.name))
                            .unwrap_or_default();
                        format!("`{}`{via}", model.type_name(f.principal_type.into()))
                    })
                    .unwrap_or_default()
            };
            let Some(dependent) = model.foreign_key(*first).map(|f| f.declaring_type) else {
                continue;
            };
            let message = format!(
                "relationships to {} and {} both match foreign key properties ({}); configure them explicitly",
                describe(model, *first),
                describe(model, *second),
                model.property_names(&properties).join(", ")
            );
            let type_name = model.type_name(dependent.into());
            model.report(DiagnosticLevel::Warning, codes::AMBIGUOUS_FOREIGN_KEY, message.clone());
            model.report_error(&type_name, message);
        }
    }
}
