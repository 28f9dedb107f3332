//! Chooses how each entity type is instantiated.
//!
//! Every construction path of the host type is tried, longest first. A
//! parameter binds to a mapped property of a compatible type (exact name,
//! then any case, then a field-style spelling such as `_name`, `name_` or
//! `m_name`) or, failing that, to an injectable service. Among the paths that
//! bind completely the one with the fewest services wins, then the one with
//! the fewest parameters. A tie or a complete failure is a finalization error.

use std::rc::Rc;

use modelforge_metadata::conventions::ModelFinalizingConvention;
use modelforge_metadata::{
    ConfigurationSource, ConstructorBinding, Convention, ConventionContext, ConventionSet,
    EntityTypeId, HostConstructor, HostParameter, Model, ModelOptions, ParameterBinding,
    Property, ValueType,
};
use tracing::debug;

use crate::host_scope::same_name;

pub struct ConstructorBindingConvention;

/// A path that bound every parameter.
struct Candidate {
    services: usize,
    parameters: usize,
    binding: ConstructorBinding,
}

/// How closely a parameter name must follow a property name, strictest first.
#[derive(Clone, Copy)]
enum NameMatch {
    Exact,
    AnyCase,
    FieldStyle,
}

impl NameMatch {
    fn matches(self, property: &str, parameter: &str) -> bool {
        match self {
            Self::Exact => property == parameter,
            Self::AnyCase => same_name(property, parameter),
            Self::FieldStyle => field_style_matches(property, parameter),
        }
    }
}

fn field_style_matches(property: &str, parameter: &str) -> bool {
    [
        format!("_{property}"),
        format!("{property}_"),
        format!("m_{property}"),
    ]
    .iter()
    .any(|variant| same_name(variant, parameter))
}

fn bind_property(properties: &[&Property], parameter: &HostParameter) -> Option<ParameterBinding> {
    let wanted = ValueType::parse(&parameter.ty);
    let typed: Vec<&Property> = properties
        .iter()
        .copied()
        .filter(|p| p.value_type.is_compatible_with(&wanted))
        .collect();
    [NameMatch::Exact, NameMatch::AnyCase, NameMatch::FieldStyle]
        .into_iter()
        .find_map(|level| {
            typed
                .iter()
                .find(|p| level.matches(&p.name, &parameter.name))
                .map(|p| ParameterBinding::Property {
                    property: p.name.clone(),
                })
        })
}

fn bind_service(options: &ModelOptions, parameter: &HostParameter) -> Option<ParameterBinding> {
    let ty = parameter.ty.as_str();
    if ty == options.entity_type_service {
        Some(ParameterBinding::EntityType)
    } else if ty == options.lazy_loader_service {
        Some(ParameterBinding::LazyLoader)
    } else if ty == options.context_service {
        Some(ParameterBinding::Context)
    } else if options.is_registered_service(ty) {
        Some(ParameterBinding::Service {
            service: ty.to_string(),
        })
    } else {
        None
    }
}

impl ConstructorBindingConvention {
    /// Bind `path`, or name the first parameter that cannot be bound.
    fn bind_path(
        model: &Model,
        entity_type: EntityTypeId,
        type_name: &str,
        path: &HostConstructor,
    ) -> Result<Candidate, String> {
        let properties: Vec<&Property> = model
            .properties_of(entity_type)
            .into_iter()
            .filter_map(|p| model.property(p))
            .filter(|p| !p.shadow)
            .collect();
        let mut parameters = Vec::with_capacity(path.parameters.len());
        for parameter in &path.parameters {
            let bound = bind_property(&properties, parameter)
                .or_else(|| bind_service(model.options(), parameter))
                .ok_or_else(|| {
                    format!(
                        "`{}`: parameter `{}` ({}) matches no property or service",
                        path.signature(type_name),
                        parameter.name,
                        parameter.ty
                    )
                })?;
            parameters.push(bound);
        }
        Ok(Candidate {
            services: parameters.iter().filter(|p| p.is_service()).count(),
            parameters: parameters.len(),
            binding: ConstructorBinding {
                signature: path.signature(type_name),
                parameters,
            },
        })
    }

    fn bind(model: &mut Model, entity_type: EntityTypeId) {
        let Some(entity) = model.entity_type(entity_type) else {
            return;
        };
        if !entity.constructor_binding.can_set(ConfigurationSource::Convention) {
            return;
        }
        let Some(host) = model.host_type_of(entity_type) else {
            return;
        };
        let type_name = entity.name.clone();
        let mut paths = host.construction_paths();
        paths.sort_by(|a, b| b.parameters.len().cmp(&a.parameters.len()));

        let mut bound = Vec::new();
        let mut failures = Vec::new();
        for path in &paths {
            match Self::bind_path(model, entity_type, &type_name, path) {
                Ok(candidate) => bound.push(candidate),
                Err(failure) => failures.push(failure),
            }
        }
        bound.sort_by_key(|c| (c.services, c.parameters));

        match bound.as_slice() {
            [] => {
                model.report_error(
                    &type_name,
                    format!("no usable constructor: {}", failures.join("; ")),
                );
            }
            [best, runner_up, ..]
                if (best.services, best.parameters)
                    == (runner_up.services, runner_up.parameters) =>
            {
                let message = format!(
                    "constructors `{}` and `{}` both bind equally well; configure a binding explicitly",
                    best.binding.signature, runner_up.binding.signature
                );
                model.report_error(&type_name, message);
            }
            [best, ..] => {
                debug!(entity_type = %type_name, constructor = %best.binding.signature, "constructor bound");
                let binding = best.binding.clone();
                model.set_constructor_binding(
                    entity_type,
                    Some(binding),
                    ConfigurationSource::Convention,
                );
            }
        }
    }
}

impl Convention for ConstructorBindingConvention {
    fn name(&self) -> &'static str {
        "constructor_binding"
    }

    fn register(self: Rc<Self>, set: &mut ConventionSet) {
        set.model_finalizing.push(self);
    }
}

impl ModelFinalizingConvention for ConstructorBindingConvention {
    fn process_model_finalizing(&self, model: &mut Model, _context: &mut ConventionContext<()>) {
        for entity_type in model.entity_type_ids() {
            Self::bind(model, entity_type);
        }
    }
}
