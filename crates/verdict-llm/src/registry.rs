use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use verdict_core::config::AppConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::TextGenerator;

use crate::create_generator;
use crate::retry::RetryingGenerator;

/// Generation backends keyed by model identity.
///
/// Built once at startup and shared read-only; nodes that need a backend
/// look it up here instead of opening their own connection.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn TextGenerator>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the debater and explainer backends from configuration. A model
    /// used for both roles gets a single backend.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut registry = Self::new();
        for model in [&config.model, config.explainer()] {
            if registry.contains(&model.model_id) {
                continue;
            }
            let client = create_generator(model)?;
            let generator = RetryingGenerator::new(client, config.retry.clone());
            info!(model = %model.model_id, provider = %model.provider, "Registered generation backend");
            registry.register(Arc::new(generator));
        }
        Ok(registry)
    }

    /// Register a backend under its own model identity. A later
    /// registration for the same identity replaces the earlier one.
    pub fn register(&mut self, generator: Arc<dyn TextGenerator>) {
        self.backends
            .insert(generator.model().to_string(), generator);
    }

    pub fn contains(&self, model: &str) -> bool {
        self.backends.contains_key(model)
    }

    pub fn get(&self, model: &str) -> Result<Arc<dyn TextGenerator>> {
        self.backends
            .get(model)
            .cloned()
            .ok_or_else(|| VerdictError::UnknownModel(model.to_string()))
    }

    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.backends.keys().map(|k| k.as_str()).collect();
        models.sort_unstable();
        models
    }
}
