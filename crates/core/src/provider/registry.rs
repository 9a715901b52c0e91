//! Lookup table from task type to provider.

use std::collections::HashMap;
use std::sync::Arc;

use super::config::ProviderConfig;
use super::http::HttpProvider;
use super::traits::GenerationProvider;
use super::types::ProviderError;

/// Registered providers, keyed by task type.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an [`HttpProvider`] for every configured entry.
    pub fn from_configs(configs: &[ProviderConfig]) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        for config in configs {
            let provider = HttpProvider::new(config.clone())?;
            if registry.register(Arc::new(provider)).is_some() {
                return Err(ProviderError::NotConfigured(format!(
                    "task type {} registered twice",
                    config.task_type
                )));
            }
        }
        Ok(registry)
    }

    /// Register a provider under its task type, returning any provider it replaced.
    pub fn register(
        &mut self,
        provider: Arc<dyn GenerationProvider>,
    ) -> Option<Arc<dyn GenerationProvider>> {
        self.providers
            .insert(provider.task_type().to_string(), provider)
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.providers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.providers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
