//! Graph node kinds.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::addrs::{ConfigResource, ModulePath, ProviderAddr};
use crate::config::{CheckRule, Expression};
use crate::engine::VariableValue;
use crate::plans::ResourceChange;

/// Which half of a resource instance change a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePhase {
    /// Create, update, read, import, forget or no-op.
    Apply,
    /// Destroy the current object.
    Destroy,
    /// Destroy the object replaced by a create-before-destroy.
    DestroyReplaced,
}

/// A unit of work in the apply graph.
#[derive(Debug, Clone)]
pub enum GraphNode {
    /// A root module input variable.
    RootVariable {
        /// Variable name.
        name: String,
        /// Value recorded in the plan.
        value: VariableValue,
        /// Default from configuration.
        default: Option<Value>,
    },
    /// An input variable of a child module.
    ModuleVariable {
        /// Child module path.
        module: ModulePath,
        /// Variable name.
        name: String,
        /// Expression passed by the parent module, if any.
        expr: Option<Expression>,
        /// Default from configuration.
        default: Option<Value>,
    },
    /// A provider configuration.
    Provider {
        /// Provider configuration address.
        addr: ProviderAddr,
        /// Configuration arguments.
        config: BTreeMap<String, Expression>,
    },
    /// One phase of a planned resource instance change.
    ResourceInstance {
        /// The change, after force-replace escalation.
        change: ResourceChange,
        /// Phase performed by this node.
        phase: ResourcePhase,
        /// Postconditions evaluated after the apply phase.
        checks: Vec<CheckRule>,
        /// Resources the new object depends on.
        dependencies: Vec<ConfigResource>,
    },
    /// An output value.
    Output {
        /// Module declaring the output.
        module: ModulePath,
        /// Output name.
        name: String,
        /// Value expression.
        expr: Expression,
        /// Whether the value is sensitive.
        sensitive: bool,
    },
}

impl GraphNode {
    /// Short kind name, used in graph exports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RootVariable { .. } | Self::ModuleVariable { .. } => "variable",
            Self::Provider { .. } => "provider",
            Self::ResourceInstance { .. } => "resource_instance",
            Self::Output { .. } => "output",
        }
    }

    /// Returns true for nodes whose skip must be reported to the user.
    #[must_use]
    pub const fn reports_skip(&self) -> bool {
        matches!(self, Self::ResourceInstance { .. } | Self::Output { .. })
    }
}

impl std::fmt::Display for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootVariable { name, .. } => write!(f, "var.{name}"),
            Self::ModuleVariable { module, name, .. } => write!(f, "{module}.var.{name}"),
            Self::Provider { addr, .. } => write!(f, "provider[{addr}]"),
            Self::ResourceInstance { change, phase, .. } => match phase {
                ResourcePhase::Apply => write!(f, "{}", change.addr),
                ResourcePhase::Destroy => write!(f, "{} (destroy)", change.addr),
                ResourcePhase::DestroyReplaced => write!(f, "{} (destroy replaced)", change.addr),
            },
            Self::Output { module, name, .. } if module.is_root() => write!(f, "output.{name}"),
            Self::Output { module, name, .. } => write!(f, "{module}.output.{name}"),
        }
    }
}
