use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{ProviderFunction, ProviderResource};

/// Registered resource kinds and functions of one provider.
#[derive(Clone, Default)]
pub struct Provider {
    resources: HashMap<String, Arc<dyn ProviderResource>>,
    functions: HashMap<String, Arc<dyn ProviderFunction>>,
}

impl Provider {
    /// Create a provider with no resources or functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a resource kind, replacing any previous one.
    pub fn with_resource(mut self, kind: impl Into<String>, resource: impl ProviderResource + 'static) -> Self {
        self.resources.insert(kind.into(), Arc::new(resource));
        self
    }

    /// Register a function under `name`, replacing any previous one.
    pub fn with_function(mut self, name: impl Into<String>, function: impl ProviderFunction + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn resource(&self, kind: &str) -> Option<Arc<dyn ProviderResource>> {
        self.resources.get(kind).cloned()
    }

    pub fn function(&self, name: &str) -> Option<Arc<dyn ProviderFunction>> {
        self.functions.get(name).cloned()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut resources: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        let mut functions: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        resources.sort_unstable();
        functions.sort_unstable();
        f.debug_struct("Provider").field("resources", &resources).field("functions", &functions).finish()
    }
}
