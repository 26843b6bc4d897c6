//! Evaluated variable and module output values.

use dashmap::DashMap;
use serde_json::Value;

use crate::addrs::ModulePath;

/// Values produced by variable and output nodes during a walk.
#[derive(Debug, Default)]
pub struct EvalScope {
    variables: DashMap<(ModulePath, String), Value>,
    outputs: DashMap<(ModulePath, String), Value>,
}

impl EvalScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the final value of a variable.
    pub fn set_variable(&self, module: &ModulePath, name: &str, value: Value) {
        self.variables.insert((module.clone(), name.to_string()), value);
    }

    /// Returns the value of a variable.
    #[must_use]
    pub fn variable(&self, module: &ModulePath, name: &str) -> Option<Value> {
        self.variables
            .get(&(module.clone(), name.to_string()))
            .map(|v| v.clone())
    }

    /// Records the value of an output of any module.
    pub fn set_output(&self, module: &ModulePath, name: &str, value: Value) {
        self.outputs.insert((module.clone(), name.to_string()), value);
    }

    /// Returns the value of an output.
    #[must_use]
    pub fn output(&self, module: &ModulePath, name: &str) -> Option<Value> {
        self.outputs
            .get(&(module.clone(), name.to_string()))
            .map(|v| v.clone())
    }
}
