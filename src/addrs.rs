//! Addresses of modules, resources, resource instances and providers.
//!
//! Addresses render and parse in the usual dotted form:
//!
//! - `aws_instance.web` (a resource in the root module)
//! - `module.net.aws_subnet.private["a"]` (one instance in a child module)
//! - `data.aws_ami.ubuntu` (a data resource)
//! - `aws.west` (a provider configuration with an alias)
//!
//! All address types serialize as their string form so they can be used as
//! JSON map keys in plans and state.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PlanError;

/// Path of a module instance, from the root down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModulePath(Vec<String>);

/// Whether a resource is managed or only read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// A resource whose lifecycle the engine manages.
    #[default]
    Managed,
    /// A data source, read but never mutated.
    Data,
}

/// A resource as declared in configuration, without an instance key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigResource {
    /// Module containing the resource.
    pub module: ModulePath,
    /// Managed or data.
    pub mode: ResourceMode,
    /// Resource type, e.g. `aws_instance`.
    pub type_name: String,
    /// Resource name within the module.
    pub name: String,
}

/// The key selecting one instance of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InstanceKey {
    /// The resource has a single instance.
    #[default]
    NoKey,
    /// Instance created by `count`.
    Int(i64),
    /// Instance created by `for_each`.
    Str(String),
}

/// A single resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceInstanceAddr {
    /// The resource this instance belongs to.
    pub resource: ConfigResource,
    /// The instance key.
    pub key: InstanceKey,
}

/// A user-supplied address filter (`-target` / `-exclude`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    /// Every resource in a module and its descendants.
    Module(ModulePath),
    /// Every instance of a resource.
    Resource(ConfigResource),
    /// One resource instance.
    Instance(ResourceInstanceAddr),
}

/// Address of a provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderAddr {
    /// Provider local name, e.g. `aws`.
    pub name: String,
    /// Optional configuration alias.
    pub alias: Option<String>,
}

impl ModulePath {
    /// Returns the root module path.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns true for the root module.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the path of a child module call.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Splits the path into its parent and the last call name.
    #[must_use]
    pub fn split_last(&self) -> Option<(Self, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((Self(parent.to_vec()), last.as_str()))
    }

    /// Returns true if this path is `prefix` or one of its descendants.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the call names from the root down.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl ConfigResource {
    /// Creates a managed resource address in the given module.
    #[must_use]
    pub fn managed(module: ModulePath, type_name: &str, name: &str) -> Self {
        Self {
            module,
            mode: ResourceMode::Managed,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    /// Returns the address of one instance of this resource.
    #[must_use]
    pub fn instance(&self, key: InstanceKey) -> ResourceInstanceAddr {
        ResourceInstanceAddr {
            resource: self.clone(),
            key,
        }
    }

    /// Returns the address relative to its module (`type.name` or `data.type.name`).
    #[must_use]
    pub fn local_name(&self) -> String {
        match self.mode {
            ResourceMode::Managed => format!("{}.{}", self.type_name, self.name),
            ResourceMode::Data => format!("data.{}.{}", self.type_name, self.name),
        }
    }
}

impl ResourceInstanceAddr {
    /// Returns the module containing this instance.
    #[must_use]
    pub const fn module(&self) -> &ModulePath {
        &self.resource.module
    }
}

impl Target {
    /// Returns true if the instance is selected by this target.
    #[must_use]
    pub fn matches(&self, addr: &ResourceInstanceAddr) -> bool {
        match self {
            Self::Module(path) => addr.resource.module.starts_with(path),
            Self::Resource(resource) => &addr.resource == resource,
            Self::Instance(instance) => addr == instance,
        }
    }
}

impl ProviderAddr {
    /// Creates an unaliased provider address.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Resource part of a parsed address.
type ResourcePart = (ResourceMode, String, String, InstanceKey);

fn invalid(address: &str, message: &str) -> PlanError {
    PlanError::InvalidAddress {
        address: address.to_string(),
        message: message.to_string(),
    }
}

/// Splits a leading identifier off `input`.
pub(crate) fn split_ident(input: &str) -> Option<(&str, &str)> {
    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    Some(input.split_at(end))
}

/// Parses a leading `[0]` or `["key"]` off `input`.
pub(crate) fn split_key(input: &str) -> Option<(InstanceKey, &str)> {
    let inner = input.strip_prefix('[')?;
    if let Some(quoted) = inner.strip_prefix('"') {
        let close = quoted.find('"')?;
        let rest = quoted[close + 1..].strip_prefix(']')?;
        return Some((InstanceKey::Str(quoted[..close].to_string()), rest));
    }
    let close = inner.find(']')?;
    let index = inner[..close].trim().parse::<i64>().ok()?;
    Some((InstanceKey::Int(index), &inner[close + 1..]))
}

/// Parses `module.a.module.b.<resource>` where the resource part is optional.
fn parse_address(address: &str) -> Result<(ModulePath, Option<ResourcePart>), PlanError> {
    let mut rest = address.trim();
    if rest.is_empty() {
        return Err(invalid(address, "address is empty"));
    }

    let mut modules = Vec::new();
    while let Some(after) = rest.strip_prefix("module.") {
        let (name, tail) =
            split_ident(after).ok_or_else(|| invalid(address, "expected a module name"))?;
        modules.push(name.to_string());
        if tail.is_empty() {
            return Ok((ModulePath(modules), None));
        }
        rest = tail
            .strip_prefix('.')
            .ok_or_else(|| invalid(address, "expected '.' after module name"))?;
    }

    let mode = if let Some(after) = rest.strip_prefix("data.") {
        rest = after;
        ResourceMode::Data
    } else {
        ResourceMode::Managed
    };

    let (type_name, tail) =
        split_ident(rest).ok_or_else(|| invalid(address, "expected a resource type"))?;
    let tail = tail
        .strip_prefix('.')
        .ok_or_else(|| invalid(address, "expected a resource name"))?;
    let (name, tail) =
        split_ident(tail).ok_or_else(|| invalid(address, "expected a resource name"))?;

    let key = if tail.is_empty() {
        InstanceKey::NoKey
    } else {
        match split_key(tail) {
            Some((key, "")) => key,
            _ => return Err(invalid(address, "invalid instance key")),
        }
    };

    Ok((
        ModulePath(modules),
        Some((mode, type_name.to_string(), name.to_string(), key)),
    ))
}

impl FromStr for ResourceInstanceAddr {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_address(s)? {
            (module, Some((mode, type_name, name, key))) => Ok(Self {
                resource: ConfigResource {
                    module,
                    mode,
                    type_name,
                    name,
                },
                key,
            }),
            (_, None) => Err(invalid(s, "expected a resource instance address")),
        }
    }
}

impl FromStr for ConfigResource {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: ResourceInstanceAddr = s.parse()?;
        if addr.key != InstanceKey::NoKey {
            return Err(invalid(s, "resource address must not have an instance key"));
        }
        Ok(addr.resource)
    }
}

impl FromStr for InstanceKey {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::NoKey);
        }
        match split_key(s) {
            Some((key, "")) => Ok(key),
            _ => Err(invalid(s, "invalid instance key")),
        }
    }
}

impl FromStr for Target {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_address(s)? {
            (module, None) => Ok(Self::Module(module)),
            (module, Some((mode, type_name, name, key))) => {
                let resource = ConfigResource {
                    module,
                    mode,
                    type_name,
                    name,
                };
                if key == InstanceKey::NoKey {
                    Ok(Self::Resource(resource))
                } else {
                    Ok(Self::Instance(ResourceInstanceAddr { resource, key }))
                }
            }
        }
    }
}

impl FromStr for ProviderAddr {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) =
            split_ident(s.trim()).ok_or_else(|| invalid(s, "expected a provider name"))?;
        if rest.is_empty() {
            return Ok(Self::new(name));
        }
        let alias = rest
            .strip_prefix('.')
            .and_then(split_ident)
            .filter(|(_, tail)| tail.is_empty())
            .map(|(alias, _)| alias.to_string())
            .ok_or_else(|| invalid(s, "invalid provider alias"))?;
        Ok(Self {
            name: name.to_string(),
            alias: Some(alias),
        })
    }
}

macro_rules! string_serde {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = PlanError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    value.parse()
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.to_string()
                }
            }
        )*
    };
}

string_serde!(ConfigResource, InstanceKey, ResourceInstanceAddr, Target, ProviderAddr);

// ============================================================================
// Display
// ============================================================================

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "root");
        }
        let rendered: Vec<String> = self.0.iter().map(|m| format!("module.{m}")).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl std::fmt::Display for ConfigResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "{}", self.local_name())
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoKey => Ok(()),
            Self::Int(i) => write!(f, "[{i}]"),
            Self::Str(s) => write!(f, "[\"{s}\"]"),
        }
    }
}

impl std::fmt::Display for ResourceInstanceAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module(path) => write!(f, "{path}"),
            Self::Resource(resource) => write!(f, "{resource}"),
            Self::Instance(instance) => write!(f, "{instance}"),
        }
    }
}

impl std::fmt::Display for ProviderAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}.{alias}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
