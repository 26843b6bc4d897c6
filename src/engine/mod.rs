//! The apply engine.
//!
//! An [`Engine`] owns the provider factories, the lifecycle hooks and the run
//! lock. Each call to [`Engine::apply`] resolves the plan's variables, builds
//! the apply graph, walks it and finalizes the resulting state.

mod apply;
mod cancel;
mod finalize;
mod options;
mod variables;

use std::sync::Arc;

use crate::hooks::Hook;
use crate::providers::{ProviderFactory, ProviderRegistry};
use crate::state::RunLock;

pub use cancel::CancelToken;
pub use finalize::finalize;
pub use options::{EngineOptions, DEFAULT_PARALLELISM, PARALLELISM_ENV};
pub use variables::{resolve_variables, InputValue, InputValues, ValueSource, VariableValue};

/// Applies plans against registered providers.
pub struct Engine {
    options: EngineOptions,
    providers: ProviderRegistry,
    hooks: Vec<Arc<dyn Hook>>,
    run_lock: RunLock,
}

impl Engine {
    /// Creates an engine without providers or hooks.
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            providers: ProviderRegistry::new(),
            hooks: Vec::new(),
            run_lock: RunLock::new(),
        }
    }

    /// Registers a provider factory under a provider name.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, factory: ProviderFactory) -> Self {
        self.providers.register(name, factory);
        self
    }

    /// Adds a lifecycle hook. Hooks are notified in the order they are added.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Returns the engine options.
    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Returns the registered providers.
    #[must_use]
    pub const fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Returns the lock serializing operations on this engine.
    #[must_use]
    pub const fn run_lock(&self) -> &RunLock {
        &self.run_lock
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("providers", &self.providers)
            .field("hooks", &self.hooks.len())
            .field("run_lock", &self.run_lock)
            .finish()
    }
}
