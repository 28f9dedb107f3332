//! Last finalizing rule: turns what discovery could not settle into errors.

use std::rc::Rc;

use modelforge_metadata::conventions::ModelFinalizingConvention;
use modelforge_metadata::{
    AnnotationTarget, Convention, ConventionContext, ConventionSet, EntityTypeId, Model,
};
use serde_json::Value;

use crate::AMBIGUOUS_NAVIGATIONS;

pub struct ValidationConvention;

impl ValidationConvention {
    fn problems(model: &Model, entity_type: EntityTypeId) -> Vec<String> {
        let Some(entity) = model.entity_type(entity_type) else {
            return Vec::new();
        };
        let mut problems = Vec::new();
        if model.primary_key(entity_type).is_none() {
            problems.push("no primary key: add an `Id` property or configure a key".to_string());
        }
        if let Some(Value::Array(names)) =
            model.annotation(AnnotationTarget::EntityType(entity_type), AMBIGUOUS_NAVIGATIONS)
        {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            if !names.is_empty() {
                problems.push(format!(
                    "navigations {} could not be paired; mark the inverses or ignore members",
                    names
                        .iter()
                        .map(|n| format!("`{n}`"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        for skip in entity
            .skip_navigations
            .iter()
            .filter_map(|s| model.skip_navigation(*s))
        {
            if skip.foreign_key().is_none() {
                problems.push(format!(
                    "skip navigation `{}` to `{}` has no join foreign key",
                    skip.name,
                    model.type_name(skip.target_type.into())
                ));
            }
        }
        problems
    }
}

impl Convention for ValidationConvention {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.model_finalizing.push(self);
    }
}

impl ModelFinalizingConvention for ValidationConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        for entity_type in model.entity_type_ids() {
            let problems = Self::problems(model, entity_type);
            if problems.is_empty() {
                continue;
            }
            let type_name = model.type_name(entity_type.into());
            for problem in problems {
                model.report_error(&type_name, problem);
            }
        }
    }
}
