//! Error types for the Terrace apply engine.
//!
//! This module provides the error hierarchy for every stage of an apply run:
//! configuration loading, plan inspection, state handling, provider calls,
//! graph construction, expression evaluation and lifecycle hooks.
//!
//! Apply itself never returns these errors directly. They are converted into
//! [`crate::diagnostics::Diagnostic`] entries so that the caller receives one
//! ordered diagnostics stream.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Terrace apply engine.
#[derive(Debug, Error)]
pub enum TerraceError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plan-related errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Expression evaluation errors.
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Lifecycle hook errors.
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// An engine option has an invalid value.
    #[error("Invalid value for {name}: {message}")]
    InvalidOption {
        /// Name of the option.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// Plan-related errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan file could not be read or decoded.
    #[error("Failed to read plan: {message}")]
    Unreadable {
        /// Description of the failure.
        message: String,
    },

    /// A recorded variable value could not be decoded.
    #[error("Invalid value for variable {name}: {message}")]
    InvalidVariableValue {
        /// Variable name.
        name: String,
        /// Decoder message.
        message: String,
    },

    /// An address in the plan could not be parsed.
    #[error("Invalid address {address:?}: {message}")]
    InvalidAddress {
        /// The address text.
        address: String,
        /// Description of the problem.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Another operation holds the engine's run lock.
    #[error("Engine is busy with another operation (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// The run lock could not be acquired.
    #[error("Failed to acquire run lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Errors reported by providers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// No provider is registered under the requested name.
    #[error("Provider {name:?} is not available")]
    NotAvailable {
        /// Provider name.
        name: String,
    },

    /// The provider rejected its configuration.
    #[error("Invalid provider configuration: {message}")]
    InvalidConfiguration {
        /// Provider message.
        message: String,
    },

    /// A resource operation failed.
    #[error("{operation} failed for {address}: {message}")]
    OperationFailed {
        /// Operation name (create, update, delete, read).
        operation: String,
        /// Resource instance address.
        address: String,
        /// Provider message.
        message: String,
    },

    /// A provider function failed.
    #[error("Function {function:?} failed: {message}")]
    FunctionFailed {
        /// Function name.
        function: String,
        /// Provider message.
        message: String,
    },

    /// The provider does not implement the requested function.
    #[error("Function {function:?} is not provided")]
    UnknownFunction {
        /// Function name.
        function: String,
    },
}

/// Errors raised while compiling the apply graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A reference could not be resolved against the configuration.
    #[error("Reference to undeclared {kind} {reference:?} in {module}")]
    UnresolvedReference {
        /// Kind of referenced object.
        kind: &'static str,
        /// The reference text.
        reference: String,
        /// Module where the reference appears.
        module: String,
    },

    /// A reference could not be parsed.
    #[error("Invalid reference {reference:?}: {message}")]
    InvalidReference {
        /// The reference text.
        reference: String,
        /// Description of the problem.
        message: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Cycle detected involving {node}")]
    Cycle {
        /// A node participating in the cycle.
        node: String,
    },

    /// A change refers to a provider that cannot be used.
    #[error("Invalid provider configuration for {address}: {message}")]
    InvalidProvider {
        /// Address of the provider or resource.
        address: String,
        /// Description of the problem.
        message: String,
    },

    /// A planned change cannot be applied as recorded.
    #[error("Invalid planned change for {address}: {message}")]
    InvalidChange {
        /// Resource instance address.
        address: String,
        /// Description of the problem.
        message: String,
    },
}

/// Errors raised while evaluating expressions during the walk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// A variable had no value when it was read.
    #[error("No value for variable {name:?}")]
    MissingVariable {
        /// Variable name.
        name: String,
    },

    /// A module output had no value when it was read.
    #[error("No value for output {name:?} of module {module}")]
    MissingOutput {
        /// Child module path.
        module: String,
        /// Output name.
        name: String,
    },

    /// A traversal step does not exist on the value.
    #[error("Unsupported attribute {step:?} in {reference}")]
    UnsupportedAttribute {
        /// The failing step.
        step: String,
        /// The full reference.
        reference: String,
    },

    /// A reference could not be parsed.
    #[error("Invalid reference {reference:?}: {message}")]
    InvalidReference {
        /// The reference text.
        reference: String,
        /// Description of the problem.
        message: String,
    },

    /// A function call failed.
    #[error("Call to {function} failed: {message}")]
    FunctionCall {
        /// Function name.
        function: String,
        /// Description of the problem.
        message: String,
    },

    /// A condition did not evaluate to a boolean.
    #[error("Condition must be a boolean, got {found}")]
    NotABoolean {
        /// Description of the value found.
        found: String,
    },
}

/// Errors returned by lifecycle hooks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    /// The observer failed to handle a notification.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for Terrace operations.
pub type Result<T> = std::result::Result<T, TerraceError>;

impl TerraceError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ProviderError {
    /// Creates an operation failure.
    #[must_use]
    pub fn operation(
        operation: impl Into<String>,
        address: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            address: address.into(),
            message: message.into(),
        }
    }
}

impl HookError {
    /// Creates a hook failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl GraphError {
    /// Creates an invalid change error.
    #[must_use]
    pub fn invalid_change(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidChange {
            address: address.into(),
            message: message.into(),
        }
    }
}
