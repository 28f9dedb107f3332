//! Named annotation maps attached to every schema element.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::config_source::{can_set, ConfigurationSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub value: Value,
    pub source: ConfigurationSource,
}

/// Result of [`Annotations::try_set`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationWrite {
    Rejected,
    Unchanged,
    Changed { old: Option<Value> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Annotations(BTreeMap<String, Annotation>);

impl Annotations {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(|a| &a.value)
    }

    pub fn source(&self, name: &str) -> Option<ConfigurationSource> {
        self.0.get(name).map(|a| a.source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Annotation)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set (`Some`) or remove (`None`) an annotation at `source`.
    pub fn try_set(
        &mut self,
        name: &str,
        value: Option<Value>,
        source: ConfigurationSource,
    ) -> AnnotationWrite {
        let existing = self.0.get(name);
        if !can_set(existing.map(|a| a.source), source) {
            return AnnotationWrite::Rejected;
        }
        match (existing, value) {
            (None, None) => AnnotationWrite::Unchanged,
            (Some(_), None) => {
                let old = self.0.remove(name).map(|a| a.value);
                AnnotationWrite::Changed { old }
            }
            (Some(current), Some(value)) if current.value == value => {
                if let Some(a) = self.0.get_mut(name) {
                    a.source = source.max(Some(a.source));
                }
                AnnotationWrite::Unchanged
            }
            (_, Some(value)) => {
                let old = self
                    .0
                    .insert(name.to_string(), Annotation { value, source })
                    .map(|a| a.value);
                AnnotationWrite::Changed { old }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ConfigurationSource::*;

    #[test]
    fn annotations_follow_precedence() {
        let mut map = Annotations::default();
        assert_eq!(
            map.try_set("comment", Some(json!("a")), DataAnnotation),
            AnnotationWrite::Changed { old: None }
        );
        assert_eq!(
            map.try_set("comment", Some(json!("b")), Convention),
            AnnotationWrite::Rejected
        );
        assert_eq!(
            map.try_set("comment", Some(json!("a")), Explicit),
            AnnotationWrite::Unchanged
        );
        assert_eq!(map.source("comment"), Some(Explicit));
        assert_eq!(
            map.try_set("comment", None, Explicit),
            AnnotationWrite::Changed {
                old: Some(json!("a"))
            }
        );
        assert!(map.is_empty());
    }
}
