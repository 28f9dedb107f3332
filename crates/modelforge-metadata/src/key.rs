use crate::annotations::Annotations;
use crate::arena::{EntityTypeId, PropertyId};
use crate::config_source::{ConfigurationSource, Facet};

/// An ordered, non-empty set of properties that identifies an instance.
#[derive(Debug, Clone)]
pub struct Key {
    pub entity_type: EntityTypeId,
    pub properties: Vec<PropertyId>,
    pub source: ConfigurationSource,
    pub annotations: Annotations,
}

#[derive(Debug, Clone)]
pub struct Index {
    pub entity_type: EntityTypeId,
    pub properties: Vec<PropertyId>,
    pub name: Option<String>,
    pub unique: Facet<bool>,
    pub source: ConfigurationSource,
    pub annotations: Annotations,
}

impl Index {
    pub fn is_unique(&self) -> bool {
        self.unique.get()
    }
}
