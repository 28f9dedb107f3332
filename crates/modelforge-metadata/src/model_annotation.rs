//! Annotations on every annotatable element.

use serde_json::Value;

use crate::annotations::{AnnotationWrite, Annotations};
use crate::arena::{
    ComplexTypeId, EntityTypeId, ForeignKeyId, IndexId, KeyId, NavigationId, PropertyId,
    SkipNavigationId,
};
use crate::config_source::ConfigurationSource;
use crate::model::Model;

/// The element an annotation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationTarget {
    Model,
    EntityType(EntityTypeId),
    ComplexType(ComplexTypeId),
    Property(PropertyId),
    Key(KeyId),
    Index(IndexId),
    ForeignKey(ForeignKeyId),
    Navigation(NavigationId),
    SkipNavigation(SkipNavigationId),
}

impl Model {
    fn annotations_of(&self, target: AnnotationTarget) -> Option<&Annotations> {
        match target {
            AnnotationTarget::Model => Some(&self.annotations),
            AnnotationTarget::EntityType(id) => self.entity_type(id).map(|e| &e.annotations),
            AnnotationTarget::ComplexType(id) => self.complex_type(id).map(|c| &c.annotations),
            AnnotationTarget::Property(id) => self.property(id).map(|p| &p.annotations),
            AnnotationTarget::Key(id) => self.key(id).map(|k| &k.annotations),
            AnnotationTarget::Index(id) => self.index(id).map(|i| &i.annotations),
            AnnotationTarget::ForeignKey(id) => self.foreign_key(id).map(|f| &f.annotations),
            AnnotationTarget::Navigation(id) => self.navigation(id).map(|n| &n.annotations),
            AnnotationTarget::SkipNavigation(id) => {
                self.skip_navigation(id).map(|s| &s.annotations)
            }
        }
    }

    fn annotations_of_mut(&mut self, target: AnnotationTarget) -> Option<&mut Annotations> {
        match target {
            AnnotationTarget::Model => Some(&mut self.annotations),
            AnnotationTarget::EntityType(id) => {
                self.entity_types.get_mut(id).map(|e| &mut e.annotations)
            }
            AnnotationTarget::ComplexType(id) => {
                self.complex_types.get_mut(id).map(|c| &mut c.annotations)
            }
            AnnotationTarget::Property(id) => self.properties.get_mut(id).map(|p| &mut p.annotations),
            AnnotationTarget::Key(id) => self.keys.get_mut(id).map(|k| &mut k.annotations),
            AnnotationTarget::Index(id) => self.indexes.get_mut(id).map(|i| &mut i.annotations),
            AnnotationTarget::ForeignKey(id) => {
                self.foreign_keys.get_mut(id).map(|f| &mut f.annotations)
            }
            AnnotationTarget::Navigation(id) => {
                self.navigations.get_mut(id).map(|n| &mut n.annotations)
            }
            AnnotationTarget::SkipNavigation(id) => {
                self.skip_navigations.get_mut(id).map(|s| &mut s.annotations)
            }
        }
    }

    pub fn annotation(&self, target: AnnotationTarget, name: &str) -> Option<&Value> {
        self.annotations_of(target)?.get(name)
    }

    /// Set (`Some`) or remove (`None`) an annotation. Rules see the change
    /// only when the stored value actually differs.
    pub fn set_annotation(
        &mut self,
        target: AnnotationTarget,
        name: &str,
        value: Option<Value>,
        source: ConfigurationSource,
    ) -> bool {
        let Some(annotations) = self.annotations_of_mut(target) else {
            return false;
        };
        let old = match annotations.try_set(name, value.clone(), source) {
            AnnotationWrite::Rejected => return false,
            AnnotationWrite::Unchanged => return true,
            AnnotationWrite::Changed { old } => old,
        };
        let name = name.to_string();
        match target {
            AnnotationTarget::Model => {
                self.on_model_annotation_changed(name, value, old);
            }
            AnnotationTarget::EntityType(id) => {
                self.on_entity_type_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::ComplexType(id) => {
                self.on_complex_type_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::Property(id) => {
                self.on_property_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::Key(id) => {
                self.on_key_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::Index(id) => {
                self.on_index_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::ForeignKey(id) => {
                self.on_foreign_key_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::Navigation(id) => {
                self.on_navigation_annotation_changed(id, name, value, old);
            }
            AnnotationTarget::SkipNavigation(id) => {
                self.on_skip_navigation_annotation_changed(id, name, value, old);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::host::HostCatalog;

    #[test]
    fn annotation_respects_precedence() {
        let mut model = Model::new(HostCatalog::default());
        let blog = model
            .add_entity_type("Blog", None, ConfigurationSource::Explicit)
            .unwrap();
        let target = AnnotationTarget::EntityType(blog);

        assert!(model.set_annotation(target, "table", Some(json!("Blogs")), ConfigurationSource::Explicit));
        assert!(!model.set_annotation(target, "table", Some(json!("Posts")), ConfigurationSource::Convention));
        assert_eq!(model.annotation(target, "table"), Some(&json!("Blogs")));

        assert!(model.set_annotation(target, "table", None, ConfigurationSource::Explicit));
        assert_eq!(model.annotation(target, "table"), None);
    }
}
