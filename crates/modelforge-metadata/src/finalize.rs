//! The finalization pass and the read-only model it produces.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info_span};

use crate::annotations::Annotations;
use crate::arena::{ComplexPropertyId, EntityTypeId, ForeignKeyId, NavigationId, PropertyId};
use crate::config_source::ConfigurationSource;
use crate::diagnostics::Diagnostic;
use crate::entity_type::{ConstructorBinding, TypeBaseId};
use crate::error::FinalizeError;
use crate::foreign_key::DeleteBehavior;
use crate::model::Model;
use crate::property::ValueGenerated;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedModel {
    pub entity_types: Vec<FinalizedEntityType>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedEntityType {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    pub source: ConfigurationSource,
    pub properties: Vec<FinalizedProperty>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub complex_properties: Vec<FinalizedComplexProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternate_keys: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<FinalizedIndex>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<FinalizedForeignKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub navigations: Vec<FinalizedNavigation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_navigations: Vec<FinalizedSkipNavigation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructor: Option<ConstructorBinding>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shadow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    pub value_generated: ValueGenerated,
    pub source: ConfigurationSource,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedComplexProperty {
    pub name: String,
    pub host_type: String,
    pub collection: bool,
    pub nullable: bool,
    pub properties: Vec<FinalizedProperty>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub complex_properties: Vec<FinalizedComplexProperty>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedIndex {
    pub properties: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedForeignKey {
    pub properties: Vec<String>,
    pub principal: String,
    pub principal_key: Vec<String>,
    pub unique: bool,
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ownership: bool,
    pub delete_behavior: DeleteBehavior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_to_principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_to_dependent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedNavigation {
    pub name: String,
    pub target: String,
    pub collection: bool,
    pub on_dependent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedSkipNavigation {
    pub name: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl FinalizedModel {
    pub fn entity_type(&self, name: &str) -> Option<&FinalizedEntityType> {
        self.entity_types.iter().find(|e| e.name == name)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl FinalizedEntityType {
    pub fn property(&self, name: &str) -> Option<&FinalizedProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&FinalizedNavigation> {
        self.navigations.iter().find(|n| n.name == name)
    }

    pub fn skip_navigation(&self, name: &str) -> Option<&FinalizedSkipNavigation> {
        self.skip_navigations.iter().find(|n| n.name == name)
    }

    /// The foreign key whose dependent properties are exactly `properties`.
    pub fn foreign_key(&self, properties: &[&str]) -> Option<&FinalizedForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.properties.iter().map(String::as_str).eq(properties.iter().copied()))
    }

    pub fn foreign_key_to(&self, principal: &str) -> Option<&FinalizedForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.principal == principal)
    }
}

impl Model {
    /// Run the finalizing rules and, when none of them reported a problem,
    /// freeze the model into a serializable view.
    pub fn finalize_model(mut self) -> Result<FinalizedModel, FinalizeError> {
        let span = info_span!("finalize_model", entity_types = self.entity_types.len());
        let _guard = span.enter();

        self.on_model_finalizing();
        if !self.errors.is_empty() {
            return Err(FinalizeError::Validation(self.errors));
        }
        let finalized = self.snapshot();
        debug!(entity_types = finalized.entity_types.len(), "model finalized");
        Ok(finalized)
    }

    /// A read-only view of the current state, without running finalization.
    pub fn snapshot(&self) -> FinalizedModel {
        let mut entity_types: Vec<_> = self
            .entity_types()
            .map(|(id, _)| self.snapshot_entity_type(id))
            .collect();
        entity_types.sort_by(|a, b| a.name.cmp(&b.name));
        FinalizedModel {
            entity_types,
            annotations: annotation_values(&self.annotations),
            diagnostics: self.diagnostics.clone(),
        }
    }

    fn snapshot_entity_type(&self, id: EntityTypeId) -> FinalizedEntityType {
        let Some(entity) = self.entity_type(id) else {
            return FinalizedEntityType {
                name: id.to_string(),
                host_type: None,
                base_type: None,
                source: ConfigurationSource::Convention,
                properties: Vec::new(),
                complex_properties: Vec::new(),
                primary_key: None,
                alternate_keys: Vec::new(),
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
                navigations: Vec::new(),
                skip_navigations: Vec::new(),
                triggers: Vec::new(),
                constructor: None,
                annotations: BTreeMap::new(),
            };
        };
        let primary_key = entity.primary_key.get();
        FinalizedEntityType {
            name: entity.name.clone(),
            host_type: entity.host_type.clone(),
            base_type: entity.base_type().map(|b| self.type_name(b.into())),
            source: entity.source,
            properties: self.snapshot_properties(TypeBaseId::Entity(id)),
            complex_properties: entity
                .complex_properties
                .iter()
                .filter_map(|c| self.snapshot_complex_property(*c))
                .collect(),
            primary_key: primary_key
                .and_then(|k| self.key(k))
                .map(|k| self.property_names(&k.properties)),
            alternate_keys: entity
                .keys
                .iter()
                .filter(|k| Some(**k) != primary_key)
                .filter_map(|k| self.key(*k))
                .map(|k| self.property_names(&k.properties))
                .collect(),
            indexes: entity
                .indexes
                .iter()
                .filter_map(|i| self.index(*i))
                .map(|i| FinalizedIndex {
                    properties: self.property_names(&i.properties),
                    name: i.name.clone(),
                    unique: i.is_unique(),
                })
                .collect(),
            foreign_keys: entity
                .foreign_keys
                .iter()
                .filter_map(|fk| self.snapshot_foreign_key(*fk))
                .collect(),
            navigations: entity
                .navigations
                .iter()
                .filter_map(|n| self.navigation(*n))
                .map(|n| FinalizedNavigation {
                    name: n.name.clone(),
                    target: self.type_name(n.target_type.into()),
                    collection: n.collection,
                    on_dependent: n.on_dependent,
                })
                .collect(),
            skip_navigations: entity
                .skip_navigations
                .iter()
                .filter_map(|s| self.skip_navigation(*s))
                .map(|s| FinalizedSkipNavigation {
                    name: s.name.clone(),
                    target: self.type_name(s.target_type.into()),
                    join_type: s
                        .foreign_key()
                        .and_then(|fk| self.foreign_key(fk))
                        .map(|fk| self.type_name(fk.declaring_type.into())),
                    inverse: s
                        .inverse()
                        .and_then(|i| self.skip_navigation(i))
                        .map(|i| i.name.clone()),
                })
                .collect(),
            triggers: entity
                .triggers
                .iter()
                .filter_map(|t| self.trigger(*t))
                .map(|t| t.name.clone())
                .collect(),
            constructor: entity.constructor_binding.value().clone(),
            annotations: annotation_values(&entity.annotations),
        }
    }

    fn snapshot_properties(&self, declaring_type: TypeBaseId) -> Vec<FinalizedProperty> {
        self.declared_properties(declaring_type)
            .iter()
            .filter_map(|p| self.snapshot_property(*p))
            .collect()
    }

    fn snapshot_property(&self, id: PropertyId) -> Option<FinalizedProperty> {
        let property = self.property(id)?;
        Some(FinalizedProperty {
            name: property.name.clone(),
            value_type: property.value_type.name.clone(),
            nullable: property.is_nullable(),
            shadow: property.shadow,
            field: property.field().map(str::to_string),
            element_type: property
                .element_type
                .value()
                .as_ref()
                .map(ToString::to_string),
            value_generated: property.value_generated.get(),
            source: property.source,
            annotations: annotation_values(&property.annotations),
        })
    }

    fn snapshot_complex_property(&self, id: ComplexPropertyId) -> Option<FinalizedComplexProperty> {
        let property = self.complex_property(id)?;
        let complex_type = self.complex_type(property.complex_type)?;
        Some(FinalizedComplexProperty {
            name: property.name.clone(),
            host_type: complex_type.host_type.clone(),
            collection: property.collection,
            nullable: property.nullable.get(),
            properties: self.snapshot_properties(TypeBaseId::Complex(property.complex_type)),
            complex_properties: complex_type
                .complex_properties
                .iter()
                .filter_map(|c| self.snapshot_complex_property(*c))
                .collect(),
        })
    }

    fn snapshot_foreign_key(&self, id: ForeignKeyId) -> Option<FinalizedForeignKey> {
        let fk = self.foreign_key(id)?;
        let navigation_name =
            |nav: Option<NavigationId>| nav.and_then(|n| self.navigation(n)).map(|n| n.name.clone());
        Some(FinalizedForeignKey {
            properties: self.property_names(&fk.properties),
            principal: self.type_name(fk.principal_type.into()),
            principal_key: self
                .key(fk.principal_key)
                .map(|k| self.property_names(&k.properties))
                .unwrap_or_default(),
            unique: fk.is_unique(),
            required: self.is_foreign_key_required(id),
            ownership: fk.is_ownership(),
            delete_behavior: fk.delete_behavior(),
            dependent_to_principal: navigation_name(fk.dependent_to_principal),
            principal_to_dependent: navigation_name(fk.principal_to_dependent),
        })
    }
}

fn annotation_values(annotations: &Annotations) -> BTreeMap<String, Value> {
    annotations
        .iter()
        .map(|(name, a)| (name.to_string(), a.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCatalog, ValueType};

    #[test]
    fn reported_errors_fail_finalization() {
        let mut model = Model::new(HostCatalog::default());
        model.add_entity_type("Blog", None, ConfigurationSource::Explicit);
        model.report_error("Blog", "no usable constructor");

        let err = model.finalize_model().unwrap_err();
        assert_eq!(err.problems_for("Blog"), ["no usable constructor".to_string()]);
        assert!(err.to_string().contains("Blog: no usable constructor"));
    }

    #[test]
    fn snapshot_lists_keys_and_properties() {
        let mut model = Model::new(HostCatalog::default());
        let blog = model
            .add_entity_type("Blog", None, ConfigurationSource::Explicit)
            .unwrap();
        let id = model
            .add_property(
                blog.into(),
                "Id",
                ValueType::new("int"),
                true,
                ConfigurationSource::Explicit,
            )
            .unwrap();
        model
            .set_primary_key(blog, &[id], ConfigurationSource::Explicit)
            .unwrap();

        let finalized = model.finalize_model().unwrap();
        let blog = finalized.entity_type("Blog").unwrap();
        assert_eq!(blog.primary_key, Some(vec!["Id".to_string()]));
        assert!(!blog.property("Id").unwrap().nullable);
        assert!(blog.alternate_keys.is_empty());
    }
}
