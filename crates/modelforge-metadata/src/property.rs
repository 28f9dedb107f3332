//! Scalar and complex properties.

use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::arena::ComplexTypeId;
use crate::config_source::{ConfigurationSource, Facet};
use crate::entity_type::TypeBaseId;
use crate::host::ValueType;

/// When the store generates a value for a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueGenerated {
    #[default]
    Never,
    OnAdd,
    OnAddOrUpdate,
    OnUpdate,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub declaring_type: TypeBaseId,
    pub value_type: ValueType,
    pub source: ConfigurationSource,
    pub nullable: Facet<bool>,
    pub field: Facet<Option<String>>,
    pub value_generated: Facet<ValueGenerated>,
    pub element_type: Facet<Option<ValueType>>,
    /// No host member backs this property.
    pub shadow: bool,
    pub annotations: Annotations,
}

impl Property {
    pub(crate) fn new(
        name: &str,
        declaring_type: TypeBaseId,
        value_type: ValueType,
        shadow: bool,
        source: ConfigurationSource,
    ) -> Self {
        Self {
            name: name.to_string(),
            declaring_type,
            nullable: Facet::unset(value_type.nullable),
            value_type,
            source,
            field: Facet::default(),
            value_generated: Facet::default(),
            element_type: Facet::default(),
            shadow,
            annotations: Annotations::default(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable.get()
    }

    pub fn field(&self) -> Option<&str> {
        self.field.value().as_deref()
    }

    /// Shadow properties synthesized by a convention, e.g. foreign-key
    /// placeholders.
    pub fn is_implicit(&self) -> bool {
        self.shadow && self.source == ConfigurationSource::Convention
    }
}

#[derive(Debug, Clone)]
pub struct ComplexProperty {
    pub name: String,
    pub declaring_type: TypeBaseId,
    pub complex_type: ComplexTypeId,
    pub collection: bool,
    pub source: ConfigurationSource,
    pub nullable: Facet<bool>,
}
