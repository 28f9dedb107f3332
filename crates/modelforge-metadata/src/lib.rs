//! Modelforge metadata: the mutable schema graph and its convention machinery.
//!
//! A [`Model`] is an arena-backed graph of entity types, properties, keys,
//! foreign keys and navigations built from a [`HostCatalog`] of host type
//! descriptions. Every mutation is stamped with a [`ConfigurationSource`]
//! and rejected softly when it would override a more authoritative one.
//! Successful mutations are announced to the rules of a [`ConventionSet`],
//! which may react by mutating the model further.
//!
//! ## Module Organization
//!
//! - `config_source`: the precedence lattice and stamped facets
//! - `arena`: typed ids and slot storage
//! - `host`: host type descriptions (the input catalog)
//! - `conventions`: per-event rule traits and the ordered registry
//! - `dispatcher`: event delivery, delay scopes and the recursion guard
//! - `model_*`: the mutation API, grouped by element kind
//! - `finalize`: the finalization pass and the frozen view

mod annotations;
pub mod arena;
pub mod config_source;
pub mod conventions;
pub mod diagnostics;
mod dispatcher;
mod entity_type;
mod error;
mod finalize;
mod foreign_key;
pub mod host;
mod key;
mod model;
mod model_annotation;
mod model_entity;
mod model_key;
mod model_property;
mod model_relationship;
mod options;
mod property;

pub use annotations::{Annotation, AnnotationWrite, Annotations};
pub use arena::{
    ComplexPropertyId, ComplexTypeId, EntityTypeId, ForeignKeyId, IndexId, KeyId, NavigationId,
    PropertyId, SkipNavigationId, TriggerId,
};
pub use config_source::{can_set, ConfigurationSource, Facet, FacetWrite};
pub use conventions::{Convention, ConventionContext, ConventionSet, Flow};
pub use diagnostics::{codes, Diagnostic, DiagnosticLevel};
pub use entity_type::{
    ComplexType, ConstructorBinding, EntityType, ParameterBinding, Trigger, TypeBaseId,
};
pub use error::{FinalizeError, ModelError};
pub use finalize::{
    FinalizedComplexProperty, FinalizedEntityType, FinalizedForeignKey, FinalizedIndex,
    FinalizedModel, FinalizedNavigation, FinalizedProperty, FinalizedSkipNavigation,
};
pub use foreign_key::{DeleteBehavior, ForeignKey, Navigation, SkipNavigation};
pub use host::{
    HostCatalog, HostConstructor, HostField, HostMember, HostParameter, HostType, MemberMarker,
    MemberType, TypeMarker, ValueType,
};
pub use key::{Index, Key};
pub use model::{Member, Model};
pub use model_annotation::AnnotationTarget;
pub use options::ModelOptions;
pub use property::{ComplexProperty, Property, ValueGenerated};
