use std::collections::BTreeMap;

use thiserror::Error;

/// Invariant violations detected by the mutation API.
///
/// Precedence losses are never errors; they come back as `None`/`false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("setting the base type of `{entity}` to `{base}` would create a cycle")]
    CyclicBaseType { entity: String, base: String },

    #[error("a key on `{entity}` needs at least one property")]
    EmptyKey { entity: String },

    #[error("property `{property}` is not declared on `{entity}` or its base types")]
    ForeignProperty { entity: String, property: String },

    #[error("`{entity}` derives from `{base}` and cannot declare keys")]
    KeyOnDerivedType { entity: String, base: String },

    #[error("{kind} {id} is not in the model")]
    Missing { kind: &'static str, id: String },
}

/// Problems collected by the finalization pass, grouped per type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeError {
    #[error("model validation failed:\n{}", render_problems(.0))]
    Validation(BTreeMap<String, Vec<String>>),
}

impl FinalizeError {
    pub fn problems(&self) -> &BTreeMap<String, Vec<String>> {
        match self {
            Self::Validation(problems) => problems,
        }
    }

    /// Problems reported against one type.
    pub fn problems_for(&self, type_name: &str) -> &[String] {
        self.problems()
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn render_problems(problems: &BTreeMap<String, Vec<String>>) -> String {
    problems
        .iter()
        .map(|(type_name, messages)| format!("  {type_name}: {}", messages.join("; ")))
        .collect::<Vec<_>>()
        .join("\n")
}
