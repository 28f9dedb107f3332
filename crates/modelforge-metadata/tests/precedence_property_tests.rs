use std::cell::RefCell;
use std::rc::Rc;

use modelforge_metadata::conventions::EntityTypeAddedConvention;
use modelforge_metadata::{
    ConfigurationSource, Convention, ConventionContext, ConventionSet, EntityTypeId, Facet,
    HostCatalog, Model, ModelOptions, TypeBaseId, ValueType,
};
use proptest::prelude::*;

fn source() -> impl Strategy<Value = ConfigurationSource> {
    prop_oneof![
        Just(ConfigurationSource::Convention),
        Just(ConfigurationSource::DataAnnotation),
        Just(ConfigurationSource::Explicit),
    ]
}

/// The winner of a write sequence: the last write made at the highest source.
fn expected_winner<T: Clone>(writes: &[(T, ConfigurationSource)]) -> Option<(T, ConfigurationSource)> {
    let top = writes.iter().map(|(_, s)| *s).max()?;
    writes
        .iter()
        .rev()
        .find(|(_, s)| *s == top)
        .map(|(v, s)| (v.clone(), *s))
}

struct NameLog(Rc<RefCell<Vec<String>>>);

impl Convention for NameLog {
    fn name(&self) -> &'static str {
        "name_log"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self);
    }
}

impl EntityTypeAddedConvention for NameLog {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        if let Some(entity) = model.entity_type(entity_type) {
            self.0.borrow_mut().push(entity.name.clone());
        }
    }
}

proptest! {
    #[test]
    fn facet_keeps_last_write_at_highest_source(
        writes in prop::collection::vec((0u8..4, source()), 1..24)
    ) {
        let mut facet = Facet::unset(u8::MAX);
        for (value, source) in &writes {
            facet.try_set(*value, *source);
        }
        let (value, source) = expected_winner(&writes).unwrap();
        prop_assert_eq!(facet.get(), value);
        prop_assert_eq!(facet.source(), Some(source));
    }

    #[test]
    fn property_nullability_follows_precedence(
        writes in prop::collection::vec((any::<bool>(), source()), 1..16)
    ) {
        let mut model = Model::new(HostCatalog::default());
        let blog = model
            .add_entity_type("Blog", None, ConfigurationSource::Explicit)
            .unwrap();
        let rating = model
            .add_property(
                TypeBaseId::Entity(blog),
                "Rating",
                ValueType::new("int"),
                false,
                ConfigurationSource::Explicit,
            )
            .unwrap();
        for (nullable, source) in &writes {
            model.set_property_nullable(rating, *nullable, *source);
        }
        let (nullable, _) = expected_winner(&writes).unwrap();
        prop_assert_eq!(model.property(rating).unwrap().is_nullable(), nullable);
    }

    #[test]
    fn delayed_events_flush_in_raised_order(
        names in prop::collection::btree_set("[A-Z][a-z]{2,6}", 1..10),
        nested_at in 0usize..10,
    ) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut set = ConventionSet::new();
        set.add(NameLog(Rc::clone(&log)));
        let mut model =
            Model::with_conventions(HostCatalog::default(), set, ModelOptions::default());
        let names: Vec<String> = names.into_iter().collect();

        model.batch(|m| {
            for (i, name) in names.iter().enumerate() {
                if i == nested_at {
                    m.batch(|m| {
                        m.add_entity_type(name, None, ConfigurationSource::Convention);
                    });
                } else {
                    m.add_entity_type(name, None, ConfigurationSource::Convention);
                }
            }
        });

        prop_assert_eq!(log.borrow().clone(), names);
    }
}
