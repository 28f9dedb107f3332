//! Entity types, complex types and triggers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::arena::{
    ComplexPropertyId, ComplexTypeId, EntityTypeId, ForeignKeyId, IndexId, KeyId, NavigationId,
    PropertyId, SkipNavigationId, TriggerId,
};
use crate::config_source::{ConfigurationSource, Facet};

/// Either kind of structural type that can declare properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TypeBaseId {
    Entity(EntityTypeId),
    Complex(ComplexTypeId),
}

impl From<EntityTypeId> for TypeBaseId {
    fn from(id: EntityTypeId) -> Self {
        Self::Entity(id)
    }
}

impl From<ComplexTypeId> for TypeBaseId {
    fn from(id: ComplexTypeId) -> Self {
        Self::Complex(id)
    }
}

impl TypeBaseId {
    pub fn as_entity(self) -> Option<EntityTypeId> {
        match self {
            Self::Entity(id) => Some(id),
            Self::Complex(_) => None,
        }
    }
}

/// How an instance of an entity type is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorBinding {
    /// `Blog(string, int)`.
    pub signature: String,
    pub parameters: Vec<ParameterBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterBinding {
    Property { property: String },
    EntityType,
    LazyLoader,
    Context,
    Service { service: String },
}

impl ParameterBinding {
    pub fn is_service(&self) -> bool {
        !matches!(self, Self::Property { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    /// `None` for shadow (schema-only) entity types such as join types.
    pub host_type: Option<String>,
    pub source: ConfigurationSource,
    pub base_type: Facet<Option<EntityTypeId>>,
    pub properties: Vec<PropertyId>,
    pub complex_properties: Vec<ComplexPropertyId>,
    pub keys: Vec<KeyId>,
    pub primary_key: Facet<Option<KeyId>>,
    pub indexes: Vec<IndexId>,
    pub foreign_keys: Vec<ForeignKeyId>,
    pub navigations: Vec<NavigationId>,
    pub skip_navigations: Vec<SkipNavigationId>,
    pub triggers: Vec<TriggerId>,
    pub ignored_members: BTreeMap<String, ConfigurationSource>,
    pub constructor_binding: Facet<Option<ConstructorBinding>>,
    pub annotations: Annotations,
}

impl EntityType {
    pub(crate) fn new(name: &str, host_type: Option<&str>, source: ConfigurationSource) -> Self {
        Self {
            name: name.to_string(),
            host_type: host_type.map(str::to_string),
            source,
            base_type: Facet::default(),
            properties: Vec::new(),
            complex_properties: Vec::new(),
            keys: Vec::new(),
            primary_key: Facet::default(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            navigations: Vec::new(),
            skip_navigations: Vec::new(),
            triggers: Vec::new(),
            ignored_members: BTreeMap::new(),
            constructor_binding: Facet::default(),
            annotations: Annotations::default(),
        }
    }

    pub fn base_type(&self) -> Option<EntityTypeId> {
        *self.base_type.value()
    }

    pub fn is_shadow(&self) -> bool {
        self.host_type.is_none()
    }
}

/// A value object owned by exactly one [`crate::ComplexProperty`].
#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: String,
    pub host_type: String,
    pub owner: ComplexPropertyId,
    pub properties: Vec<PropertyId>,
    pub complex_properties: Vec<ComplexPropertyId>,
    pub ignored_members: BTreeMap<String, ConfigurationSource>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub entity_type: EntityTypeId,
    pub source: ConfigurationSource,
}
