use serde::{Deserialize, Serialize};

/// Tunables for one model-building session.
///
/// Loadable from JSON; every field is optional:
///
/// ```json
/// { "max_dispatch_depth": 64, "registered_services": ["IClock"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Nested dispatches allowed per root mutation before the loop guard trips.
    pub max_dispatch_depth: usize,
    /// Service types a constructor parameter may be injected with.
    pub registered_services: Vec<String>,
    /// Parameter type that receives the entity type handle.
    pub entity_type_service: String,
    /// Parameter type that receives the lazy-loading callback.
    pub lazy_loader_service: String,
    /// Parameter type that receives the owning context.
    pub context_service: String,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            max_dispatch_depth: 128,
            registered_services: Vec::new(),
            entity_type_service: "IEntityType".to_string(),
            lazy_loader_service: "ILazyLoader".to_string(),
            context_service: "DbContext".to_string(),
        }
    }
}

impl ModelOptions {
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.registered_services.push(service.into());
        self
    }

    pub fn is_registered_service(&self, type_name: &str) -> bool {
        self.registered_services.iter().any(|s| s == type_name)
    }
}
