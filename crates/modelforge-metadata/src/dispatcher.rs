//! Convention dispatch.
//!
//! Each `on_*` method runs the ordered rule list for one event. The list is
//! snapshotted before iterating, so rules may freely add or remove rules; the
//! subject is re-checked before every rule and dispatch gives up (`None`) once
//! a rule has removed it.
//!
//! Inside [`Model::batch`] events are queued instead and flushed, in raised
//! order, when the outermost scope closes. Nested dispatch depth is bounded by
//! [`ModelOptions::max_dispatch_depth`](crate::ModelOptions); exceeding it is a
//! bug in a rule and panics.

use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::arena::{
    ComplexPropertyId, ComplexTypeId, EntityTypeId, ForeignKeyId, IndexId, KeyId, NavigationId,
    PropertyId, SkipNavigationId, TriggerId,
};
use crate::conventions::{ConventionContext, Flow};
use crate::entity_type::{EntityType, Trigger, TypeBaseId};
use crate::foreign_key::{ForeignKey, SkipNavigation};
use crate::host::ValueType;
use crate::key::{Index, Key};
use crate::model::Model;
use crate::property::{ComplexProperty, Property};

type DelayedEvent = Box<dyn FnOnce(&mut Model)>;

#[derive(Default)]
pub(crate) struct DispatchState {
    delay_depth: usize,
    delayed: VecDeque<DelayedEvent>,
    depth: usize,
}

impl Model {
    // ------------------------------------------------------------------------
    // Delay scope
    // ------------------------------------------------------------------------

    /// Run `scope` with dispatch delayed. Events raised inside are delivered
    /// in order once the outermost scope returns.
    pub fn batch<R>(&mut self, scope: impl FnOnce(&mut Model) -> R) -> R {
        self.dispatch.delay_depth += 1;
        let result = scope(self);
        self.dispatch.delay_depth -= 1;
        if self.dispatch.delay_depth == 0 {
            self.flush_delayed();
        }
        result
    }

    pub fn delay_depth(&self) -> usize {
        self.dispatch.delay_depth
    }

    pub fn pending_events(&self) -> usize {
        self.dispatch.delayed.len()
    }

    /// Current nesting of dispatches in this call chain.
    pub fn dispatch_depth(&self) -> usize {
        self.dispatch.depth
    }

    fn is_delaying(&self) -> bool {
        self.dispatch.delay_depth > 0
    }

    fn defer(&mut self, event: impl FnOnce(&mut Model) + 'static) {
        self.dispatch.delayed.push_back(Box::new(event));
    }

    fn flush_delayed(&mut self) {
        if !self.dispatch.delayed.is_empty() {
            trace!(pending = self.dispatch.delayed.len(), "flushing delayed events");
        }
        while let Some(event) = self.dispatch.delayed.pop_front() {
            event(self);
        }
    }

    // ------------------------------------------------------------------------
    // Core loop
    // ------------------------------------------------------------------------

    fn enter_dispatch(&mut self, kind: &'static str) {
        let limit = self.options.max_dispatch_depth;
        if self.dispatch.depth >= limit {
            panic!("infinite convention loop: more than {limit} nested dispatches while processing {kind}");
        }
        self.dispatch.depth += 1;
        trace!(kind = kind, depth = self.dispatch.depth, "dispatch");
    }

    fn run<R: ?Sized, T>(
        &mut self,
        kind: &'static str,
        rules: Vec<Rc<R>>,
        initial: T,
        alive: impl Fn(&Model) -> bool,
        mut invoke: impl FnMut(&R, &mut Model, &mut ConventionContext<T>),
    ) -> Option<T> {
        self.enter_dispatch(kind);
        let mut context = ConventionContext::new(initial);
        for rule in &rules {
            if !alive(self) {
                break;
            }
            invoke(rule.as_ref(), self, &mut context);
            if context.should_stop() {
                break;
            }
        }
        self.dispatch.depth -= 1;
        let substituted = matches!(context.flow(), Flow::StopWith(_));
        if substituted || alive(self) {
            Some(context.into_result())
        } else {
            None
        }
    }

    // ------------------------------------------------------------------------
    // Model
    // ------------------------------------------------------------------------

    pub fn on_model_initialized(&mut self) {
        if self.is_delaying() {
            self.defer(|m| m.on_model_initialized());
            return;
        }
        let rules = self.conventions.model_initialized.clone();
        self.run("ModelInitialized", rules, (), |_| true, |rule, m, ctx| {
            rule.process_model_initialized(m, ctx)
        });
    }

    /// Every finalizing rule runs inside its own delay scope.
    pub fn on_model_finalizing(&mut self) {
        let rules = self.conventions.model_finalizing.clone();
        self.enter_dispatch("ModelFinalizing");
        let mut context = ConventionContext::new(());
        for rule in &rules {
            self.batch(|m| rule.process_model_finalizing(m, &mut context));
            if context.should_stop() {
                break;
            }
        }
        self.dispatch.depth -= 1;
    }

    pub fn on_model_annotation_changed(
        &mut self,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_model_annotation_changed(name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.model_annotation_changed.clone();
        self.run("ModelAnnotationChanged", rules, new.clone(), |_| true, |rule, m, ctx| {
            rule.process_model_annotation_changed(m, &name, new.as_ref(), old.as_ref(), ctx)
        })
    }

    // ------------------------------------------------------------------------
    // Entity types
    // ------------------------------------------------------------------------

    pub fn on_entity_type_added(&mut self, entity_type: EntityTypeId) -> Option<EntityTypeId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_entity_type_added(entity_type);
            });
            return Some(entity_type);
        }
        let rules = self.conventions.entity_type_added.clone();
        self.run(
            "EntityTypeAdded",
            rules,
            entity_type,
            move |m| m.entity_types.contains(entity_type),
            |rule, m, ctx| rule.process_entity_type_added(m, entity_type, ctx),
        )
    }

    pub fn on_entity_type_ignored(&mut self, name: String) -> Option<String> {
        if self.is_delaying() {
            let result = name.clone();
            self.defer(move |m| {
                m.on_entity_type_ignored(name);
            });
            return Some(result);
        }
        let rules = self.conventions.entity_type_ignored.clone();
        self.run("EntityTypeIgnored", rules, name.clone(), |_| true, |rule, m, ctx| {
            rule.process_entity_type_ignored(m, &name, ctx)
        })
    }

    pub fn on_entity_type_removed(&mut self, entity_type: EntityTypeId, removed: EntityType) {
        if self.is_delaying() {
            self.defer(move |m| m.on_entity_type_removed(entity_type, removed));
            return;
        }
        let rules = self.conventions.entity_type_removed.clone();
        self.run("EntityTypeRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_entity_type_removed(m, entity_type, &removed, ctx)
        });
    }

    pub fn on_entity_type_base_type_changed(
        &mut self,
        entity_type: EntityTypeId,
        new: Option<EntityTypeId>,
        old: Option<EntityTypeId>,
    ) -> Option<Option<EntityTypeId>> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_entity_type_base_type_changed(entity_type, new, old);
            });
            return Some(new);
        }
        let rules = self.conventions.entity_type_base_type_changed.clone();
        self.run(
            "EntityTypeBaseTypeChanged",
            rules,
            new,
            move |m| m.entity_types.contains(entity_type),
            |rule, m, ctx| rule.process_entity_type_base_type_changed(m, entity_type, new, old, ctx),
        )
    }

    pub fn on_entity_type_member_ignored(
        &mut self,
        entity_type: EntityTypeId,
        name: String,
    ) -> Option<String> {
        if self.is_delaying() {
            let result = name.clone();
            self.defer(move |m| {
                m.on_entity_type_member_ignored(entity_type, name);
            });
            return Some(result);
        }
        let rules = self.conventions.entity_type_member_ignored.clone();
        self.run(
            "EntityTypeMemberIgnored",
            rules,
            name.clone(),
            move |m| m.entity_types.contains(entity_type),
            |rule, m, ctx| rule.process_entity_type_member_ignored(m, entity_type, &name, ctx),
        )
    }

    pub fn on_entity_type_primary_key_changed(
        &mut self,
        entity_type: EntityTypeId,
        new: Option<KeyId>,
        old: Option<KeyId>,
    ) -> Option<Option<KeyId>> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_entity_type_primary_key_changed(entity_type, new, old);
            });
            return Some(new);
        }
        let rules = self.conventions.entity_type_primary_key_changed.clone();
        self.run(
            "EntityTypePrimaryKeyChanged",
            rules,
            new,
            move |m| m.entity_types.contains(entity_type),
            |rule, m, ctx| rule.process_entity_type_primary_key_changed(m, entity_type, new, old, ctx),
        )
    }

    pub fn on_entity_type_annotation_changed(
        &mut self,
        entity_type: EntityTypeId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_entity_type_annotation_changed(entity_type, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.entity_type_annotation_changed.clone();
        self.run(
            "EntityTypeAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.entity_types.contains(entity_type),
            |rule, m, ctx| {
                rule.process_entity_type_annotation_changed(
                    m,
                    entity_type,
                    &name,
                    new.as_ref(),
                    old.as_ref(),
                    ctx,
                )
            },
        )
    }

    // ------------------------------------------------------------------------
    // Complex properties and complex types
    // ------------------------------------------------------------------------

    pub fn on_complex_property_added(
        &mut self,
        property: ComplexPropertyId,
    ) -> Option<ComplexPropertyId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_complex_property_added(property);
            });
            return Some(property);
        }
        let rules = self.conventions.complex_property_added.clone();
        self.run(
            "ComplexPropertyAdded",
            rules,
            property,
            move |m| m.complex_properties.contains(property),
            |rule, m, ctx| rule.process_complex_property_added(m, property, ctx),
        )
    }

    pub fn on_complex_property_removed(
        &mut self,
        declaring_type: TypeBaseId,
        removed: ComplexProperty,
    ) {
        if self.is_delaying() {
            self.defer(move |m| m.on_complex_property_removed(declaring_type, removed));
            return;
        }
        let rules = self.conventions.complex_property_removed.clone();
        self.run("ComplexPropertyRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_complex_property_removed(m, declaring_type, &removed, ctx)
        });
    }

    pub fn on_complex_property_nullability_changed(
        &mut self,
        property: ComplexPropertyId,
        nullable: bool,
    ) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_complex_property_nullability_changed(property, nullable);
            });
            return Some(nullable);
        }
        let rules = self.conventions.complex_property_nullability_changed.clone();
        self.run(
            "ComplexPropertyNullabilityChanged",
            rules,
            nullable,
            move |m| m.complex_properties.contains(property),
            |rule, m, ctx| rule.process_complex_property_nullability_changed(m, property, nullable, ctx),
        )
    }

    pub fn on_complex_type_member_ignored(
        &mut self,
        complex_type: ComplexTypeId,
        name: String,
    ) -> Option<String> {
        if self.is_delaying() {
            let result = name.clone();
            self.defer(move |m| {
                m.on_complex_type_member_ignored(complex_type, name);
            });
            return Some(result);
        }
        let rules = self.conventions.complex_type_member_ignored.clone();
        self.run(
            "ComplexTypeMemberIgnored",
            rules,
            name.clone(),
            move |m| m.complex_types.contains(complex_type),
            |rule, m, ctx| rule.process_complex_type_member_ignored(m, complex_type, &name, ctx),
        )
    }

    pub fn on_complex_type_annotation_changed(
        &mut self,
        complex_type: ComplexTypeId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_complex_type_annotation_changed(complex_type, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.complex_type_annotation_changed.clone();
        self.run(
            "ComplexTypeAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.complex_types.contains(complex_type),
            |rule, m, ctx| {
                rule.process_complex_type_annotation_changed(
                    m,
                    complex_type,
                    &name,
                    new.as_ref(),
                    old.as_ref(),
                    ctx,
                )
            },
        )
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    pub fn on_property_added(&mut self, property: PropertyId) -> Option<PropertyId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_property_added(property);
            });
            return Some(property);
        }
        let rules = self.conventions.property_added.clone();
        self.run(
            "PropertyAdded",
            rules,
            property,
            move |m| m.properties.contains(property),
            |rule, m, ctx| rule.process_property_added(m, property, ctx),
        )
    }

    pub fn on_property_removed(&mut self, declaring_type: TypeBaseId, removed: Property) {
        if self.is_delaying() {
            self.defer(move |m| m.on_property_removed(declaring_type, removed));
            return;
        }
        let rules = self.conventions.property_removed.clone();
        self.run("PropertyRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_property_removed(m, declaring_type, &removed, ctx)
        });
    }

    pub fn on_property_nullability_changed(
        &mut self,
        property: PropertyId,
        nullable: bool,
    ) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_property_nullability_changed(property, nullable);
            });
            return Some(nullable);
        }
        let rules = self.conventions.property_nullability_changed.clone();
        self.run(
            "PropertyNullabilityChanged",
            rules,
            nullable,
            move |m| m.properties.contains(property),
            |rule, m, ctx| rule.process_property_nullability_changed(m, property, nullable, ctx),
        )
    }

    pub fn on_property_field_changed(
        &mut self,
        property: PropertyId,
        new: Option<String>,
        old: Option<String>,
    ) -> Option<Option<String>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_property_field_changed(property, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.property_field_changed.clone();
        self.run(
            "PropertyFieldChanged",
            rules,
            new.clone(),
            move |m| m.properties.contains(property),
            |rule, m, ctx| {
                rule.process_property_field_changed(m, property, new.as_deref(), old.as_deref(), ctx)
            },
        )
    }

    pub fn on_property_element_type_changed(
        &mut self,
        property: PropertyId,
        new: Option<ValueType>,
        old: Option<ValueType>,
    ) -> Option<Option<ValueType>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_property_element_type_changed(property, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.property_element_type_changed.clone();
        self.run(
            "PropertyElementTypeChanged",
            rules,
            new.clone(),
            move |m| m.properties.contains(property),
            |rule, m, ctx| {
                rule.process_property_element_type_changed(m, property, new.as_ref(), old.as_ref(), ctx)
            },
        )
    }

    pub fn on_property_annotation_changed(
        &mut self,
        property: PropertyId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_property_annotation_changed(property, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.property_annotation_changed.clone();
        self.run(
            "PropertyAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.properties.contains(property),
            |rule, m, ctx| {
                rule.process_property_annotation_changed(
                    m,
                    property,
                    &name,
                    new.as_ref(),
                    old.as_ref(),
                    ctx,
                )
            },
        )
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    pub fn on_key_added(&mut self, key: KeyId) -> Option<KeyId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_key_added(key);
            });
            return Some(key);
        }
        let rules = self.conventions.key_added.clone();
        self.run(
            "KeyAdded",
            rules,
            key,
            move |m| m.keys.contains(key),
            |rule, m, ctx| rule.process_key_added(m, key, ctx),
        )
    }

    pub fn on_key_removed(&mut self, entity_type: EntityTypeId, removed: Key) {
        if self.is_delaying() {
            self.defer(move |m| m.on_key_removed(entity_type, removed));
            return;
        }
        let rules = self.conventions.key_removed.clone();
        self.run("KeyRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_key_removed(m, entity_type, &removed, ctx)
        });
    }

    pub fn on_key_annotation_changed(
        &mut self,
        key: KeyId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_key_annotation_changed(key, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.key_annotation_changed.clone();
        self.run(
            "KeyAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.keys.contains(key),
            |rule, m, ctx| {
                rule.process_key_annotation_changed(m, key, &name, new.as_ref(), old.as_ref(), ctx)
            },
        )
    }

    // ------------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------------

    pub fn on_index_added(&mut self, index: IndexId) -> Option<IndexId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_index_added(index);
            });
            return Some(index);
        }
        let rules = self.conventions.index_added.clone();
        self.run(
            "IndexAdded",
            rules,
            index,
            move |m| m.indexes.contains(index),
            |rule, m, ctx| rule.process_index_added(m, index, ctx),
        )
    }

    pub fn on_index_removed(&mut self, entity_type: EntityTypeId, removed: Index) {
        if self.is_delaying() {
            self.defer(move |m| m.on_index_removed(entity_type, removed));
            return;
        }
        let rules = self.conventions.index_removed.clone();
        self.run("IndexRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_index_removed(m, entity_type, &removed, ctx)
        });
    }

    pub fn on_index_uniqueness_changed(&mut self, index: IndexId, unique: bool) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_index_uniqueness_changed(index, unique);
            });
            return Some(unique);
        }
        let rules = self.conventions.index_uniqueness_changed.clone();
        self.run(
            "IndexUniquenessChanged",
            rules,
            unique,
            move |m| m.indexes.contains(index),
            |rule, m, ctx| rule.process_index_uniqueness_changed(m, index, unique, ctx),
        )
    }

    pub fn on_index_annotation_changed(
        &mut self,
        index: IndexId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_index_annotation_changed(index, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.index_annotation_changed.clone();
        self.run(
            "IndexAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.indexes.contains(index),
            |rule, m, ctx| {
                rule.process_index_annotation_changed(m, index, &name, new.as_ref(), old.as_ref(), ctx)
            },
        )
    }

    // ------------------------------------------------------------------------
    // Foreign keys
    // ------------------------------------------------------------------------

    pub fn on_foreign_key_added(&mut self, foreign_key: ForeignKeyId) -> Option<ForeignKeyId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_foreign_key_added(foreign_key);
            });
            return Some(foreign_key);
        }
        let rules = self.conventions.foreign_key_added.clone();
        self.run(
            "ForeignKeyAdded",
            rules,
            foreign_key,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| rule.process_foreign_key_added(m, foreign_key, ctx),
        )
    }

    pub fn on_foreign_key_removed(&mut self, entity_type: EntityTypeId, removed: ForeignKey) {
        if self.is_delaying() {
            self.defer(move |m| m.on_foreign_key_removed(entity_type, removed));
            return;
        }
        let rules = self.conventions.foreign_key_removed.clone();
        self.run("ForeignKeyRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_foreign_key_removed(m, entity_type, &removed, ctx)
        });
    }

    /// The context starts from the properties the foreign key has when the
    /// event is delivered.
    pub fn on_foreign_key_properties_changed(
        &mut self,
        foreign_key: ForeignKeyId,
        old_properties: Vec<PropertyId>,
        old_principal_key: KeyId,
    ) -> Option<Vec<PropertyId>> {
        if self.is_delaying() {
            let result = self.current_foreign_key_properties(foreign_key);
            self.defer(move |m| {
                m.on_foreign_key_properties_changed(foreign_key, old_properties, old_principal_key);
            });
            return Some(result);
        }
        let rules = self.conventions.foreign_key_properties_changed.clone();
        let current = self.current_foreign_key_properties(foreign_key);
        self.run(
            "ForeignKeyPropertiesChanged",
            rules,
            current,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| {
                rule.process_foreign_key_properties_changed(
                    m,
                    foreign_key,
                    &old_properties,
                    old_principal_key,
                    ctx,
                )
            },
        )
    }

    fn current_foreign_key_properties(&self, foreign_key: ForeignKeyId) -> Vec<PropertyId> {
        self.foreign_key(foreign_key)
            .map(|fk| fk.properties.clone())
            .unwrap_or_default()
    }

    pub fn on_foreign_key_principal_end_changed(
        &mut self,
        foreign_key: ForeignKeyId,
    ) -> Option<ForeignKeyId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_foreign_key_principal_end_changed(foreign_key);
            });
            return Some(foreign_key);
        }
        let rules = self.conventions.foreign_key_principal_end_changed.clone();
        self.run(
            "ForeignKeyPrincipalEndChanged",
            rules,
            foreign_key,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| rule.process_foreign_key_principal_end_changed(m, foreign_key, ctx),
        )
    }

    pub fn on_foreign_key_uniqueness_changed(
        &mut self,
        foreign_key: ForeignKeyId,
        unique: bool,
    ) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_foreign_key_uniqueness_changed(foreign_key, unique);
            });
            return Some(unique);
        }
        let rules = self.conventions.foreign_key_uniqueness_changed.clone();
        self.run(
            "ForeignKeyUniquenessChanged",
            rules,
            unique,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| rule.process_foreign_key_uniqueness_changed(m, foreign_key, unique, ctx),
        )
    }

    pub fn on_foreign_key_requiredness_changed(
        &mut self,
        foreign_key: ForeignKeyId,
        required: bool,
    ) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_foreign_key_requiredness_changed(foreign_key, required);
            });
            return Some(required);
        }
        let rules = self.conventions.foreign_key_requiredness_changed.clone();
        self.run(
            "ForeignKeyRequirednessChanged",
            rules,
            required,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| {
                rule.process_foreign_key_requiredness_changed(m, foreign_key, required, ctx)
            },
        )
    }

    pub fn on_foreign_key_dependent_requiredness_changed(
        &mut self,
        foreign_key: ForeignKeyId,
        required: bool,
    ) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_foreign_key_dependent_requiredness_changed(foreign_key, required);
            });
            return Some(required);
        }
        let rules = self.conventions.foreign_key_dependent_requiredness_changed.clone();
        self.run(
            "ForeignKeyDependentRequirednessChanged",
            rules,
            required,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| {
                rule.process_foreign_key_dependent_requiredness_changed(m, foreign_key, required, ctx)
            },
        )
    }

    pub fn on_foreign_key_ownership_changed(
        &mut self,
        foreign_key: ForeignKeyId,
        ownership: bool,
    ) -> Option<bool> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_foreign_key_ownership_changed(foreign_key, ownership);
            });
            return Some(ownership);
        }
        let rules = self.conventions.foreign_key_ownership_changed.clone();
        self.run(
            "ForeignKeyOwnershipChanged",
            rules,
            ownership,
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| rule.process_foreign_key_ownership_changed(m, foreign_key, ownership, ctx),
        )
    }

    pub fn on_foreign_key_annotation_changed(
        &mut self,
        foreign_key: ForeignKeyId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_foreign_key_annotation_changed(foreign_key, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.foreign_key_annotation_changed.clone();
        self.run(
            "ForeignKeyAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.foreign_keys.contains(foreign_key),
            |rule, m, ctx| {
                rule.process_foreign_key_annotation_changed(
                    m,
                    foreign_key,
                    &name,
                    new.as_ref(),
                    old.as_ref(),
                    ctx,
                )
            },
        )
    }

    // ------------------------------------------------------------------------
    // Navigations
    // ------------------------------------------------------------------------

    pub fn on_navigation_added(&mut self, navigation: NavigationId) -> Option<NavigationId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_navigation_added(navigation);
            });
            return Some(navigation);
        }
        let rules = self.conventions.navigation_added.clone();
        self.run(
            "NavigationAdded",
            rules,
            navigation,
            move |m| m.navigations.contains(navigation),
            |rule, m, ctx| rule.process_navigation_added(m, navigation, ctx),
        )
    }

    pub fn on_navigation_removed(
        &mut self,
        declaring_type: EntityTypeId,
        target_type: EntityTypeId,
        name: String,
    ) -> Option<String> {
        if self.is_delaying() {
            let result = name.clone();
            self.defer(move |m| {
                m.on_navigation_removed(declaring_type, target_type, name);
            });
            return Some(result);
        }
        let rules = self.conventions.navigation_removed.clone();
        self.run("NavigationRemoved", rules, name.clone(), |_| true, |rule, m, ctx| {
            rule.process_navigation_removed(m, declaring_type, target_type, &name, ctx)
        })
    }

    pub fn on_navigation_annotation_changed(
        &mut self,
        navigation: NavigationId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_navigation_annotation_changed(navigation, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.navigation_annotation_changed.clone();
        self.run(
            "NavigationAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.navigations.contains(navigation),
            |rule, m, ctx| {
                rule.process_navigation_annotation_changed(
                    m,
                    navigation,
                    &name,
                    new.as_ref(),
                    old.as_ref(),
                    ctx,
                )
            },
        )
    }

    // ------------------------------------------------------------------------
    // Skip navigations
    // ------------------------------------------------------------------------

    pub fn on_skip_navigation_added(
        &mut self,
        navigation: SkipNavigationId,
    ) -> Option<SkipNavigationId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_skip_navigation_added(navigation);
            });
            return Some(navigation);
        }
        let rules = self.conventions.skip_navigation_added.clone();
        self.run(
            "SkipNavigationAdded",
            rules,
            navigation,
            move |m| m.skip_navigations.contains(navigation),
            |rule, m, ctx| rule.process_skip_navigation_added(m, navigation, ctx),
        )
    }

    pub fn on_skip_navigation_removed(
        &mut self,
        declaring_type: EntityTypeId,
        removed: SkipNavigation,
    ) {
        if self.is_delaying() {
            self.defer(move |m| m.on_skip_navigation_removed(declaring_type, removed));
            return;
        }
        let rules = self.conventions.skip_navigation_removed.clone();
        self.run("SkipNavigationRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_skip_navigation_removed(m, declaring_type, &removed, ctx)
        });
    }

    pub fn on_skip_navigation_foreign_key_changed(
        &mut self,
        navigation: SkipNavigationId,
        new: Option<ForeignKeyId>,
        old: Option<ForeignKeyId>,
    ) -> Option<Option<ForeignKeyId>> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_skip_navigation_foreign_key_changed(navigation, new, old);
            });
            return Some(new);
        }
        let rules = self.conventions.skip_navigation_foreign_key_changed.clone();
        self.run(
            "SkipNavigationForeignKeyChanged",
            rules,
            new,
            move |m| m.skip_navigations.contains(navigation),
            |rule, m, ctx| {
                rule.process_skip_navigation_foreign_key_changed(m, navigation, new, old, ctx)
            },
        )
    }

    pub fn on_skip_navigation_inverse_changed(
        &mut self,
        navigation: SkipNavigationId,
        new: Option<SkipNavigationId>,
        old: Option<SkipNavigationId>,
    ) -> Option<Option<SkipNavigationId>> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_skip_navigation_inverse_changed(navigation, new, old);
            });
            return Some(new);
        }
        let rules = self.conventions.skip_navigation_inverse_changed.clone();
        self.run(
            "SkipNavigationInverseChanged",
            rules,
            new,
            move |m| m.skip_navigations.contains(navigation),
            |rule, m, ctx| rule.process_skip_navigation_inverse_changed(m, navigation, new, old, ctx),
        )
    }

    pub fn on_skip_navigation_annotation_changed(
        &mut self,
        navigation: SkipNavigationId,
        name: String,
        new: Option<Value>,
        old: Option<Value>,
    ) -> Option<Option<Value>> {
        if self.is_delaying() {
            let result = new.clone();
            self.defer(move |m| {
                m.on_skip_navigation_annotation_changed(navigation, name, new, old);
            });
            return Some(result);
        }
        let rules = self.conventions.skip_navigation_annotation_changed.clone();
        self.run(
            "SkipNavigationAnnotationChanged",
            rules,
            new.clone(),
            move |m| m.skip_navigations.contains(navigation),
            |rule, m, ctx| {
                rule.process_skip_navigation_annotation_changed(
                    m,
                    navigation,
                    &name,
                    new.as_ref(),
                    old.as_ref(),
                    ctx,
                )
            },
        )
    }

    // ------------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------------

    pub fn on_trigger_added(&mut self, trigger: TriggerId) -> Option<TriggerId> {
        if self.is_delaying() {
            self.defer(move |m| {
                m.on_trigger_added(trigger);
            });
            return Some(trigger);
        }
        let rules = self.conventions.trigger_added.clone();
        self.run(
            "TriggerAdded",
            rules,
            trigger,
            move |m| m.triggers.contains(trigger),
            |rule, m, ctx| rule.process_trigger_added(m, trigger, ctx),
        )
    }

    pub fn on_trigger_removed(&mut self, entity_type: EntityTypeId, removed: Trigger) {
        if self.is_delaying() {
            self.defer(move |m| m.on_trigger_removed(entity_type, removed));
            return;
        }
        let rules = self.conventions.trigger_removed.clone();
        self.run("TriggerRemoved", rules, (), |_| true, |rule, m, ctx| {
            rule.process_trigger_removed(m, entity_type, &removed, ctx)
        });
    }
}
