//! Provider capability consumed by the engine.
//!
//! A provider performs create, update, delete and read operations for the
//! resource types it owns and may supply pure functions. The engine treats it
//! as an opaque capability: one instance is created per provider
//! configuration from a registered [`ProviderFactory`].

mod echo;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::addrs::ResourceInstanceAddr;
use crate::error::ProviderError;

pub use echo::EchoProvider;

/// Mutating operation requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    /// Create a new object.
    Create,
    /// Update an existing object in place.
    Update,
    /// Destroy an existing object.
    Delete,
}

/// A request to apply one change to one resource instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    /// Instance being changed.
    pub addr: ResourceInstanceAddr,
    /// Requested operation.
    pub action: ApplyAction,
    /// Current object, if any.
    pub prior: Option<Value>,
    /// Planned object, `None` for deletes.
    pub planned: Option<Value>,
}

/// Resource lifecycle and function capability of a provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configures the provider instance.
    async fn configure(&self, config: Value) -> Result<(), ProviderError>;

    /// Applies a change and returns the new object, or `None` once deleted.
    async fn apply(&self, request: ApplyRequest) -> Result<Option<Value>, ProviderError>;

    /// Reads a data source.
    async fn read_data_source(&self, type_name: String, config: Value) -> Result<Value, ProviderError>;

    /// Calls a provider function.
    async fn call_function(&self, name: String, args: Vec<Value>) -> Result<Value, ProviderError>;
}

/// Creates fresh provider instances.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

/// Registered provider factories by provider name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for a provider name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Creates a new instance of the named provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotAvailable`] if no factory is registered.
    pub fn instantiate(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ProviderError::NotAvailable {
                name: name.to_string(),
            })
    }

    /// Returns true if a factory is registered for the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns the registered provider names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl std::fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_instantiates_registered() {
        let mut registry = ProviderRegistry::new();
        registry.register("echo", Arc::new(|| Arc::new(EchoProvider::new()) as Arc<dyn Provider>));

        assert!(registry.contains("echo"));
        assert!(registry.instantiate("echo").is_ok());
        assert!(matches!(
            registry.instantiate("aws"),
            Err(ProviderError::NotAvailable { .. })
        ));
    }
}
