//! Dispatcher behaviour: ordering, stop semantics, delay scopes and the
//! recursion guard.

use std::cell::RefCell;
use std::rc::Rc;

use modelforge_metadata::conventions::{
    EntityTypeAddedConvention, EntityTypeRemovedConvention, PropertyAddedConvention,
};
use modelforge_metadata::{
    ConfigurationSource, Convention, ConventionContext, ConventionSet, EntityType, EntityTypeId,
    HostCatalog, Model, ModelOptions, PropertyId, TypeBaseId, ValueType,
};

type Log = Rc<RefCell<Vec<String>>>;

/// Records every event it sees and optionally stops the dispatch.
struct Recorder {
    name: &'static str,
    log: Log,
    stop: bool,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: Rc::clone(log),
            stop: false,
        }
    }

    fn stopping(name: &'static str, log: &Log) -> Self {
        Self {
            stop: true,
            ..Self::new(name, log)
        }
    }
}

impl Convention for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self.clone());
        set.entity_type_removed.push(self.clone());
        set.property_added.push(self);
    }
}

impl EntityTypeAddedConvention for Recorder {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        context: &mut ConventionContext<EntityTypeId>,
    ) {
        let name = model
            .entity_type(entity_type)
            .map(|e| e.name.clone())
            .unwrap_or_default();
        self.log.borrow_mut().push(format!("{}:added:{name}", self.name));
        if self.stop {
            context.stop_processing();
        }
    }
}

impl EntityTypeRemovedConvention for Recorder {
    fn process_entity_type_removed(
        &self,
        _model: &mut Model,
        _entity_type: EntityTypeId,
        removed: &EntityType,
        _context: &mut ConventionContext<()>,
    ) {
        self.log
            .borrow_mut()
            .push(format!("{}:removed:{}", self.name, removed.name));
    }
}

impl PropertyAddedConvention for Recorder {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let name = model.property_name(property).to_string();
        self.log.borrow_mut().push(format!("{}:property:{name}", self.name));
    }
}

/// Removes every entity type whose name starts with `Temp`.
struct RemoveTemporary;

impl Convention for RemoveTemporary {
    fn name(&self) -> &'static str {
        "remove_temporary"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self);
    }
}

impl EntityTypeAddedConvention for RemoveTemporary {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        let temporary = model
            .entity_type(entity_type)
            .is_some_and(|e| e.name.starts_with("Temp"));
        if temporary {
            model.remove_entity_type(entity_type, ConfigurationSource::Convention);
        }
    }
}

/// Adds a fresh entity type for every entity type added.
struct Runaway;

impl Convention for Runaway {
    fn name(&self) -> &'static str {
        "runaway"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.entity_type_added.push(self);
    }
}

impl EntityTypeAddedConvention for Runaway {
    fn process_entity_type_added(
        &self,
        model: &mut Model,
        entity_type: EntityTypeId,
        _context: &mut ConventionContext<EntityTypeId>,
    ) {
        let next = format!("T{entity_type}");
        model.add_entity_type(&next, None, ConfigurationSource::Convention);
    }
}

fn model_with(set: ConventionSet) -> Model {
    Model::with_conventions(HostCatalog::default(), set, ModelOptions::default())
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[test]
fn rules_run_in_registration_order() {
    let log = Log::default();
    let mut set = ConventionSet::new();
    set.add(Recorder::new("first", &log))
        .add(Recorder::new("second", &log));
    let mut model = model_with(set);

    model.add_entity_type("Blog", None, ConfigurationSource::Explicit);

    assert_eq!(entries(&log), vec!["first:added:Blog", "second:added:Blog"]);
}

#[test]
fn stop_processing_skips_later_rules() {
    let log = Log::default();
    let mut set = ConventionSet::new();
    set.add(Recorder::stopping("first", &log))
        .add(Recorder::new("second", &log));
    let mut model = model_with(set);

    let blog = model.add_entity_type("Blog", None, ConfigurationSource::Explicit);

    assert!(blog.is_some());
    assert_eq!(entries(&log), vec!["first:added:Blog"]);
}

#[test]
fn removing_the_subject_ends_dispatch() {
    let log = Log::default();
    let mut set = ConventionSet::new();
    set.add(RemoveTemporary).add(Recorder::new("after", &log));
    let mut model = model_with(set);

    let temp = model.add_entity_type("TempOrder", None, ConfigurationSource::Convention);

    assert_eq!(temp, None);
    assert_eq!(model.find_entity_type("TempOrder"), None);
    // The removal event still reaches the recorder; the added event does not.
    assert_eq!(entries(&log), vec!["after:removed:TempOrder"]);
}

#[test]
fn batch_defers_events_until_outermost_scope_closes() {
    let log = Log::default();
    let mut set = ConventionSet::new();
    set.add(Recorder::new("rec", &log));
    let mut model = model_with(set);

    model.batch(|m| {
        let blog = m
            .add_entity_type("Blog", None, ConfigurationSource::Explicit)
            .unwrap();
        m.batch(|m| {
            m.add_property(
                TypeBaseId::Entity(blog),
                "Title",
                ValueType::new("string"),
                false,
                ConfigurationSource::Explicit,
            );
        });
        assert_eq!(m.delay_depth(), 1);
        assert_eq!(m.pending_events(), 2);
        assert!(entries(&log).is_empty());
        m.add_entity_type("Post", None, ConfigurationSource::Explicit);
    });

    assert_eq!(model.delay_depth(), 0);
    assert_eq!(model.pending_events(), 0);
    assert_eq!(
        entries(&log),
        vec!["rec:added:Blog", "rec:property:Title", "rec:added:Post"]
    );
}

#[test]
fn replaced_rule_takes_effect_on_next_dispatch() {
    let log = Log::default();
    let mut set = ConventionSet::new();
    set.add(Recorder::new("a", &log))
        .add(Recorder::new("b", &log));
    let mut model = model_with(set);

    model.add_entity_type("Blog", None, ConfigurationSource::Explicit);
    assert!(model.conventions_mut().remove("a"));
    model.add_entity_type("Post", None, ConfigurationSource::Explicit);

    assert_eq!(
        entries(&log),
        vec!["a:added:Blog", "b:added:Blog", "b:added:Post"]
    );
}

#[test]
#[should_panic(expected = "infinite convention loop")]
fn unbounded_reentry_panics() {
    let mut set = ConventionSet::new();
    set.add(Runaway);
    let mut model = Model::with_conventions(
        HostCatalog::default(),
        set,
        ModelOptions::default().with_max_dispatch_depth(16),
    );

    model.add_entity_type("Seed", None, ConfigurationSource::Explicit);
}

#[test]
fn precedence_loss_is_silent() {
    let log = Log::default();
    let mut set = ConventionSet::new();
    set.add(Recorder::new("rec", &log));
    let mut model = model_with(set);

    assert!(model.ignore_entity_type("Audit", ConfigurationSource::Explicit));
    assert_eq!(
        model.add_entity_type("Audit", None, ConfigurationSource::DataAnnotation),
        None
    );
    assert!(entries(&log).is_empty());
    assert_eq!(model.is_ignored("Audit"), Some(ConfigurationSource::Explicit));
}
