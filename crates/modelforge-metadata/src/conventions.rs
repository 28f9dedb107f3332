//! Convention capability traits and the ordered registry.
//!
//! Every mutation event has its own trait with a single `process_*` method. A
//! rule implements only the traits for the events it cares about and lists
//! them in [`Convention::register`]. [`ConventionSet`] keeps one ordered list
//! per event; dispatch order is registration order.

use std::rc::Rc;

use serde_json::Value;

use crate::arena::{
    ComplexPropertyId, ComplexTypeId, EntityTypeId, ForeignKeyId, IndexId, KeyId, NavigationId,
    PropertyId, SkipNavigationId, TriggerId,
};
use crate::entity_type::{EntityType, Trigger, TypeBaseId};
use crate::foreign_key::{ForeignKey, SkipNavigation};
use crate::host::ValueType;
use crate::key::{Index, Key};
use crate::model::Model;
use crate::property::{ComplexProperty, Property};

// ============================================================================
// Control flow
// ============================================================================

/// What a rule asked the dispatcher to do after it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    Continue,
    /// Skip the remaining rules; the mutation keeps its own result.
    Stop,
    /// Skip the remaining rules and hand `T` back instead.
    StopWith(T),
}

/// Per-dispatch state shared by the rules of one event.
#[derive(Debug)]
pub struct ConventionContext<T> {
    initial: T,
    flow: Flow<T>,
}

impl<T> ConventionContext<T> {
    pub fn new(initial: T) -> Self {
        Self {
            initial,
            flow: Flow::Continue,
        }
    }

    /// The value this dispatch started with (the new subject or value).
    pub fn initial(&self) -> &T {
        &self.initial
    }

    pub fn flow(&self) -> &Flow<T> {
        &self.flow
    }

    pub fn stop_processing(&mut self) {
        self.flow = Flow::Stop;
    }

    pub fn stop_processing_with(&mut self, value: T) {
        self.flow = Flow::StopWith(value);
    }

    pub fn should_stop(&self) -> bool {
        !matches!(self.flow, Flow::Continue)
    }

    pub fn into_result(self) -> T {
        match self.flow {
            Flow::StopWith(value) => value,
            Flow::Continue | Flow::Stop => self.initial,
        }
    }
}

impl<T: PartialEq> ConventionContext<T> {
    /// Stop, substituting `current`, only when `current` no longer matches the
    /// value this dispatch was started with. A rule that re-reads the facet
    /// after reacting uses this to keep later rules from seeing a stale value.
    pub fn stop_processing_if_changed(&mut self, current: T) {
        if current != self.initial {
            self.flow = Flow::StopWith(current);
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Common supertrait of every convention.
pub trait Convention: 'static {
    /// Stable identifier of the rule kind, used by `replace` and `remove`.
    fn name(&self) -> &'static str;

    /// Push `self` onto every event list the rule reacts to.
    fn register(self: Rc<Self>, set: &mut ConventionSet)
    where
        Self: Sized;
}

macro_rules! convention_events {
    ($(
        $(#[$meta:meta])*
        $field:ident: $trait_name:ident :: $method:ident ( $($arg:ident : $ty:ty),* ) -> $ctx:ty;
    )*) => {
        $(
            $(#[$meta])*
            pub trait $trait_name: Convention {
                fn $method(
                    &self,
                    model: &mut Model,
                    $($arg: $ty,)*
                    context: &mut ConventionContext<$ctx>,
                );
            }
        )*

        /// Ordered rule lists, one per event kind.
        #[derive(Clone, Default)]
        pub struct ConventionSet {
            $(pub $field: Vec<Rc<dyn $trait_name>>,)*
        }

        impl ConventionSet {
            /// Drop every occurrence of the rule kind `name` from every list.
            pub fn remove(&mut self, name: &str) -> bool {
                let mut removed = false;
                $(
                    let before = self.$field.len();
                    self.$field.retain(|rule| rule.name() != name);
                    removed |= self.$field.len() != before;
                )*
                removed
            }

            fn splice(&mut self, name: &str, fresh: ConventionSet) -> bool {
                let mut found = false;
                $(
                    found |= splice_list(&mut self.$field, name, fresh.$field.into_iter().next());
                )*
                found
            }

            /// `(event, rule names in dispatch order)` for every event kind.
            pub fn registrations(&self) -> Vec<(&'static str, Vec<&'static str>)> {
                vec![$(
                    (
                        stringify!($field),
                        self.$field.iter().map(|rule| rule.name()).collect(),
                    ),
                )*]
            }
        }
    };
}

impl ConventionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` to the end of every list it registers for.
    pub fn add<C: Convention>(&mut self, rule: C) -> &mut Self {
        Rc::new(rule).register(self);
        self
    }

    /// Swap every occurrence of the rule kind of `rule` for the new instance,
    /// keeping each occurrence's position. Returns `false` when the kind was
    /// not registered (the rule is then appended).
    pub fn replace<C: Convention>(&mut self, rule: C) -> bool {
        let name = rule.name();
        let mut fresh = ConventionSet::default();
        Rc::new(rule).register(&mut fresh);
        self.splice(name, fresh)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registrations()
            .iter()
            .any(|(_, rules)| rules.contains(&name))
    }
}

fn splice_list<R: Convention + ?Sized>(
    list: &mut Vec<Rc<R>>,
    name: &str,
    fresh: Option<Rc<R>>,
) -> bool {
    let found = list.iter().any(|rule| rule.name() == name);
    match fresh {
        Some(fresh) if found => {
            for rule in list.iter_mut() {
                if rule.name() == name {
                    *rule = Rc::clone(&fresh);
                }
            }
        }
        Some(fresh) => list.push(fresh),
        None => list.retain(|rule| rule.name() != name),
    }
    found
}

convention_events! {
    // Model
    model_initialized: ModelInitializedConvention::process_model_initialized() -> ();
    model_finalizing: ModelFinalizingConvention::process_model_finalizing() -> ();
    model_annotation_changed: ModelAnnotationChangedConvention::process_model_annotation_changed(
        name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Entity types
    entity_type_added: EntityTypeAddedConvention::process_entity_type_added(
        entity_type: EntityTypeId
    ) -> EntityTypeId;
    entity_type_ignored: EntityTypeIgnoredConvention::process_entity_type_ignored(
        name: &str
    ) -> String;
    entity_type_removed: EntityTypeRemovedConvention::process_entity_type_removed(
        entity_type: EntityTypeId, removed: &EntityType
    ) -> ();
    entity_type_base_type_changed: EntityTypeBaseTypeChangedConvention::process_entity_type_base_type_changed(
        entity_type: EntityTypeId, new: Option<EntityTypeId>, old: Option<EntityTypeId>
    ) -> Option<EntityTypeId>;
    entity_type_member_ignored: EntityTypeMemberIgnoredConvention::process_entity_type_member_ignored(
        entity_type: EntityTypeId, name: &str
    ) -> String;
    entity_type_primary_key_changed: EntityTypePrimaryKeyChangedConvention::process_entity_type_primary_key_changed(
        entity_type: EntityTypeId, new: Option<KeyId>, old: Option<KeyId>
    ) -> Option<KeyId>;
    entity_type_annotation_changed: EntityTypeAnnotationChangedConvention::process_entity_type_annotation_changed(
        entity_type: EntityTypeId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Complex properties and complex types
    complex_property_added: ComplexPropertyAddedConvention::process_complex_property_added(
        property: ComplexPropertyId
    ) -> ComplexPropertyId;
    complex_property_removed: ComplexPropertyRemovedConvention::process_complex_property_removed(
        declaring_type: TypeBaseId, removed: &ComplexProperty
    ) -> ();
    complex_property_nullability_changed: ComplexPropertyNullabilityChangedConvention::process_complex_property_nullability_changed(
        property: ComplexPropertyId, nullable: bool
    ) -> bool;
    complex_type_member_ignored: ComplexTypeMemberIgnoredConvention::process_complex_type_member_ignored(
        complex_type: ComplexTypeId, name: &str
    ) -> String;
    complex_type_annotation_changed: ComplexTypeAnnotationChangedConvention::process_complex_type_annotation_changed(
        complex_type: ComplexTypeId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Properties
    property_added: PropertyAddedConvention::process_property_added(
        property: PropertyId
    ) -> PropertyId;
    property_removed: PropertyRemovedConvention::process_property_removed(
        declaring_type: TypeBaseId, removed: &Property
    ) -> ();
    property_nullability_changed: PropertyNullabilityChangedConvention::process_property_nullability_changed(
        property: PropertyId, nullable: bool
    ) -> bool;
    property_field_changed: PropertyFieldChangedConvention::process_property_field_changed(
        property: PropertyId, new: Option<&str>, old: Option<&str>
    ) -> Option<String>;
    property_element_type_changed: PropertyElementTypeChangedConvention::process_property_element_type_changed(
        property: PropertyId, new: Option<&ValueType>, old: Option<&ValueType>
    ) -> Option<ValueType>;
    property_annotation_changed: PropertyAnnotationChangedConvention::process_property_annotation_changed(
        property: PropertyId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Keys
    key_added: KeyAddedConvention::process_key_added(key: KeyId) -> KeyId;
    key_removed: KeyRemovedConvention::process_key_removed(
        entity_type: EntityTypeId, removed: &Key
    ) -> ();
    key_annotation_changed: KeyAnnotationChangedConvention::process_key_annotation_changed(
        key: KeyId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Indexes
    index_added: IndexAddedConvention::process_index_added(index: IndexId) -> IndexId;
    index_removed: IndexRemovedConvention::process_index_removed(
        entity_type: EntityTypeId, removed: &Index
    ) -> ();
    index_uniqueness_changed: IndexUniquenessChangedConvention::process_index_uniqueness_changed(
        index: IndexId, unique: bool
    ) -> bool;
    index_annotation_changed: IndexAnnotationChangedConvention::process_index_annotation_changed(
        index: IndexId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Foreign keys
    foreign_key_added: ForeignKeyAddedConvention::process_foreign_key_added(
        foreign_key: ForeignKeyId
    ) -> ForeignKeyId;
    foreign_key_removed: ForeignKeyRemovedConvention::process_foreign_key_removed(
        entity_type: EntityTypeId, removed: &ForeignKey
    ) -> ();
    foreign_key_properties_changed: ForeignKeyPropertiesChangedConvention::process_foreign_key_properties_changed(
        foreign_key: ForeignKeyId, old_properties: &[PropertyId], old_principal_key: KeyId
    ) -> Vec<PropertyId>;
    foreign_key_principal_end_changed: ForeignKeyPrincipalEndChangedConvention::process_foreign_key_principal_end_changed(
        foreign_key: ForeignKeyId
    ) -> ForeignKeyId;
    foreign_key_uniqueness_changed: ForeignKeyUniquenessChangedConvention::process_foreign_key_uniqueness_changed(
        foreign_key: ForeignKeyId, unique: bool
    ) -> bool;
    foreign_key_requiredness_changed: ForeignKeyRequirednessChangedConvention::process_foreign_key_requiredness_changed(
        foreign_key: ForeignKeyId, required: bool
    ) -> bool;
    foreign_key_dependent_requiredness_changed: ForeignKeyDependentRequirednessChangedConvention::process_foreign_key_dependent_requiredness_changed(
        foreign_key: ForeignKeyId, required: bool
    ) -> bool;
    foreign_key_ownership_changed: ForeignKeyOwnershipChangedConvention::process_foreign_key_ownership_changed(
        foreign_key: ForeignKeyId, ownership: bool
    ) -> bool;
    foreign_key_annotation_changed: ForeignKeyAnnotationChangedConvention::process_foreign_key_annotation_changed(
        foreign_key: ForeignKeyId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Navigations
    navigation_added: NavigationAddedConvention::process_navigation_added(
        navigation: NavigationId
    ) -> NavigationId;
    navigation_removed: NavigationRemovedConvention::process_navigation_removed(
        declaring_type: EntityTypeId, target_type: EntityTypeId, name: &str
    ) -> String;
    navigation_annotation_changed: NavigationAnnotationChangedConvention::process_navigation_annotation_changed(
        navigation: NavigationId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Skip navigations
    skip_navigation_added: SkipNavigationAddedConvention::process_skip_navigation_added(
        navigation: SkipNavigationId
    ) -> SkipNavigationId;
    skip_navigation_removed: SkipNavigationRemovedConvention::process_skip_navigation_removed(
        declaring_type: EntityTypeId, removed: &SkipNavigation
    ) -> ();
    skip_navigation_foreign_key_changed: SkipNavigationForeignKeyChangedConvention::process_skip_navigation_foreign_key_changed(
        navigation: SkipNavigationId, new: Option<ForeignKeyId>, old: Option<ForeignKeyId>
    ) -> Option<ForeignKeyId>;
    skip_navigation_inverse_changed: SkipNavigationInverseChangedConvention::process_skip_navigation_inverse_changed(
        navigation: SkipNavigationId, new: Option<SkipNavigationId>, old: Option<SkipNavigationId>
    ) -> Option<SkipNavigationId>;
    skip_navigation_annotation_changed: SkipNavigationAnnotationChangedConvention::process_skip_navigation_annotation_changed(
        navigation: SkipNavigationId, name: &str, new: Option<&Value>, old: Option<&Value>
    ) -> Option<Value>;

    // Triggers
    trigger_added: TriggerAddedConvention::process_trigger_added(trigger: TriggerId) -> TriggerId;
    trigger_removed: TriggerRemovedConvention::process_trigger_removed(
        entity_type: EntityTypeId, removed: &Trigger
    ) -> ();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(&'static str);

    impl Convention for Recorder {
        fn name(&self) -> &'static str {
            self.0
        }

        fn register(self: Rc<Self>, set: &mut ConventionSet) {
            set.entity_type_added.push(self.clone());
            set.key_added.push(self);
        }
    }

    impl EntityTypeAddedConvention for Recorder {
        fn process_entity_type_added(
            &self,
            _model: &mut Model,
            _entity_type: EntityTypeId,
            _context: &mut ConventionContext<EntityTypeId>,
        ) {
        }
    }

    impl KeyAddedConvention for Recorder {
        fn process_key_added(
            &self,
            _model: &mut Model,
            _key: KeyId,
            _context: &mut ConventionContext<KeyId>,
        ) {
        }
    }

    fn names(list: &[Rc<dyn EntityTypeAddedConvention>]) -> Vec<&'static str> {
        list.iter().map(|rule| rule.name()).collect()
    }

    #[test]
    fn replace_keeps_position_and_remove_drops_every_list() {
        let mut set = ConventionSet::new();
        set.add(Recorder("a")).add(Recorder("b")).add(Recorder("c"));
        assert!(set.replace(Recorder("b")));
        assert_eq!(names(&set.entity_type_added), vec!["a", "b", "c"]);

        assert!(set.remove("a"));
        assert_eq!(names(&set.entity_type_added), vec!["b", "c"]);
        assert_eq!(set.key_added.len(), 2);
        assert!(!set.contains("a"));
        assert!(!set.remove("a"));
    }

    #[test]
    fn stop_if_changed_only_fires_on_difference() {
        let mut context = ConventionContext::new(vec![1, 2]);
        context.stop_processing_if_changed(vec![1, 2]);
        assert!(!context.should_stop());
        context.stop_processing_if_changed(vec![3]);
        assert_eq!(context.into_result(), vec![3]);
    }
}
