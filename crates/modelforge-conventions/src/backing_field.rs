//! Binds properties to host fields that follow the usual naming patterns.

use std::rc::Rc;

use modelforge_metadata::conventions::PropertyAddedConvention;
use modelforge_metadata::{
    ConfigurationSource, Convention, ConventionContext, ConventionSet, Model, PropertyId,
};

use crate::host_scope::fields_of;

pub struct BackingFieldConvention;

impl BackingFieldConvention {
    /// Field names tried for a property, in order.
    pub fn candidates(name: &str) -> Vec<String> {
        let camel = camel_case(name);
        vec![
            name.to_string(),
            format!("_{camel}"),
            format!("_{name}"),
            format!("m_{camel}"),
            format!("m_{name}"),
        ]
    }
}

fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Convention for BackingFieldConvention {
    fn name(&self) -> &'static str {
        "backing_field_discovery"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.property_added.push(self);
    }
}

impl PropertyAddedConvention for BackingFieldConvention {
    fn process_property_added(
        &self,
        model: &mut Model,
        property: PropertyId,
        _context: &mut ConventionContext<PropertyId>,
    ) {
        let Some(existing) = model.property(property) else {
            return;
        };
        if existing.shadow || existing.field.source().is_some() {
            return;
        }
        let fields = fields_of(model, existing.declaring_type);
        let found = Self::candidates(&existing.name)
            .into_iter()
            .find(|candidate| fields.iter().any(|f| &f.name == candidate));
        if let Some(field) = found {
            model.set_property_field(property, Some(&field), ConfigurationSource::Convention);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order() {
        assert_eq!(
            BackingFieldConvention::candidates("Title"),
            vec!["Title", "_title", "_Title", "m_title", "m_Title"]
        );
    }
}
