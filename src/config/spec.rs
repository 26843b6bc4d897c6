//! Configuration specification types.
//!
//! These types map to the YAML module tree handed to the engine. They are
//! read-only during an apply: the engine uses them to learn which variables
//! exist, how providers are configured, how resources reference each other,
//! and which outputs and postconditions to evaluate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::addrs::{ConfigResource, ModulePath, ProviderAddr, ResourceMode};

/// The root of a configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// The root module.
    #[serde(flatten)]
    pub root: ModuleConfig,
}

/// One module in the configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleConfig {
    /// Declared input variables.
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    /// Provider configurations (root module only).
    #[serde(default)]
    pub providers: Vec<ProviderBlock>,
    /// Resource blocks.
    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
    /// Output values.
    #[serde(default)]
    pub outputs: Vec<OutputDecl>,
    /// Child module calls.
    #[serde(default)]
    pub modules: Vec<ModuleCall>,
}

/// A declared input variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableDecl {
    /// Variable name.
    pub name: String,
    /// Default used when no value was supplied.
    #[serde(default)]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the value is sensitive.
    #[serde(default)]
    pub sensitive: bool,
}

/// A provider configuration block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderBlock {
    /// Provider local name, e.g. `aws`.
    pub name: String,
    /// Optional alias for additional configurations.
    #[serde(default)]
    pub alias: Option<String>,
    /// Configuration arguments.
    #[serde(default)]
    pub config: BTreeMap<String, Expression>,
}

/// A resource block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceBlock {
    /// Managed resource or data source.
    #[serde(default)]
    pub mode: ResourceMode,
    /// Resource type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource name.
    pub name: String,
    /// Explicit provider configuration (`aws.west`); inferred from the type otherwise.
    #[serde(default)]
    pub provider: Option<String>,
    /// Explicit dependencies, as resource references.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Resource arguments. Only their references matter at apply time.
    #[serde(default)]
    pub config: BTreeMap<String, Expression>,
    /// Postconditions checked after the resource is applied.
    #[serde(default)]
    pub checks: Vec<CheckRule>,
}

/// An output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputDecl {
    /// Output name.
    pub name: String,
    /// Expression producing the value.
    pub value: Expression,
    /// Whether the value is sensitive.
    #[serde(default)]
    pub sensitive: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A call to a child module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleCall {
    /// Call name, used in `module.<name>` addresses.
    pub name: String,
    /// Values for the child module's variables.
    #[serde(default)]
    pub inputs: BTreeMap<String, Expression>,
    /// The child module body.
    pub module: ModuleConfig,
}

/// A postcondition on a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckRule {
    /// Condition that must evaluate to `true`.
    pub condition: Expression,
    /// Message reported when the condition is false.
    pub error_message: String,
}

/// An expression in configuration.
///
/// Variants are tried in order, so `{ref: ...}` and `{call: ...}` maps are
/// recognized before falling back to a literal JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Expression {
    /// A reference such as `var.region` or `aws_vpc.main.id`.
    Reference {
        /// The reference text.
        #[serde(rename = "ref")]
        reference: String,
    },
    /// A function call such as `provider::aws::arn_parse` or `plantimestamp`.
    Call {
        /// Function name.
        call: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<Expression>,
    },
    /// A literal value.
    Literal(Value),
}

impl Config {
    /// Returns the module at the given path.
    #[must_use]
    pub fn module(&self, path: &ModulePath) -> Option<&ModuleConfig> {
        let mut module = &self.root;
        for name in path.segments() {
            module = module.module_call(name).map(|call| &call.module)?;
        }
        Some(module)
    }

    /// Returns the block declaring the given resource.
    #[must_use]
    pub fn resource(&self, addr: &ConfigResource) -> Option<&ResourceBlock> {
        self.module(&addr.module)?.resources.iter().find(|r| {
            r.mode == addr.mode && r.type_name == addr.type_name && r.name == addr.name
        })
    }

    /// Visits every module with its path, parents before children.
    #[must_use]
    pub fn modules(&self) -> Vec<(ModulePath, &ModuleConfig)> {
        let mut out = Vec::new();
        let mut stack = vec![(ModulePath::root(), &self.root)];
        while let Some((path, module)) = stack.pop() {
            for call in module.modules.iter().rev() {
                stack.push((path.child(&call.name), &call.module));
            }
            out.push((path, module));
        }
        out
    }
}

impl ModuleConfig {
    /// Returns a declared variable by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Returns a declared output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&OutputDecl> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Returns a child module call by name.
    #[must_use]
    pub fn module_call(&self, name: &str) -> Option<&ModuleCall> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Returns a provider block by address.
    #[must_use]
    pub fn provider(&self, addr: &ProviderAddr) -> Option<&ProviderBlock> {
        self.providers
            .iter()
            .find(|p| p.name == addr.name && p.alias == addr.alias)
    }
}

impl ResourceBlock {
    /// Returns the address of this block inside the given module.
    #[must_use]
    pub fn addr(&self, module: &ModulePath) -> ConfigResource {
        ConfigResource {
            module: module.clone(),
            mode: self.mode,
            type_name: self.type_name.clone(),
            name: self.name.clone(),
        }
    }

    /// Returns every expression attached to the block.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.config
            .values()
            .chain(self.checks.iter().map(|c| &c.condition))
    }
}

impl Expression {
    /// Creates a reference expression.
    #[must_use]
    pub fn reference(reference: &str) -> Self {
        Self::Reference {
            reference: reference.to_string(),
        }
    }

    /// Returns every reference string inside the expression.
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Reference { reference } => out.push(reference),
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
            Self::Literal(_) => {}
        }
    }

    /// Returns every function name called inside the expression.
    #[must_use]
    pub fn calls(&self) -> Vec<&str> {
        match self {
            Self::Call { call, args } => {
                let mut out = vec![call.as_str()];
                for arg in args {
                    out.extend(arg.calls());
                }
                out
            }
            Self::Reference { .. } | Self::Literal(_) => Vec::new(),
        }
    }
}
