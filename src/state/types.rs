//! State types for tracking managed infrastructure.
//!
//! A [`State`] records every resource instance the engine manages, the root
//! module's output values and the most recent check results. The state handed
//! to the caller after an apply is always a fresh value; the plan's prior state
//! is never mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::addrs::{ConfigResource, InstanceKey, ProviderAddr, ResourceInstanceAddr};
use crate::checks::CheckResults;

/// The complete recorded state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// Resources by address.
    #[serde(default)]
    pub resources: BTreeMap<ConfigResource, ResourceState>,
    /// Root module outputs by name.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputValue>,
    /// Check results from the most recent operation.
    #[serde(default, skip_serializing_if = "CheckResults::is_empty")]
    pub check_results: CheckResults,
}

/// State of one resource and its instances.
///
/// A resource with no instances is a husk. Husks are kept while a destroy walk
/// is running and pruned once it completes without errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    /// Provider configuration that manages the resource.
    pub provider: ProviderAddr,
    /// Instances by key.
    #[serde(default)]
    pub instances: BTreeMap<InstanceKey, InstanceObject>,
}

/// The recorded object of one resource instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceObject {
    /// Attribute values as returned by the provider.
    pub value: Value,
    /// Object status.
    #[serde(default)]
    pub status: ObjectStatus,
    /// Resources this object depended on when it was last applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ConfigResource>,
}

/// Status of a recorded object.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    /// The object is fully applied.
    #[default]
    Ready,
    /// The object was partially created and must be replaced.
    Tainted,
}

/// A root module output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputValue {
    /// The value.
    pub value: Value,
    /// Whether the value is sensitive.
    #[serde(default)]
    pub sensitive: bool,
}

impl State {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a resource by address.
    #[must_use]
    pub fn resource(&self, addr: &ConfigResource) -> Option<&ResourceState> {
        self.resources.get(addr)
    }

    /// Gets a resource instance object by address.
    #[must_use]
    pub fn resource_instance(&self, addr: &ResourceInstanceAddr) -> Option<&InstanceObject> {
        self.resources.get(&addr.resource)?.instances.get(&addr.key)
    }

    /// Adds or replaces a resource instance object.
    pub fn set_resource_instance(
        &mut self,
        addr: &ResourceInstanceAddr,
        object: InstanceObject,
        provider: &ProviderAddr,
    ) {
        let resource = self
            .resources
            .entry(addr.resource.clone())
            .or_insert_with(|| ResourceState::new(provider.clone()));
        resource.provider = provider.clone();
        resource.instances.insert(addr.key.clone(), object);
    }

    /// Removes a resource instance object, leaving the resource entry in place.
    pub fn remove_resource_instance(&mut self, addr: &ResourceInstanceAddr) -> Option<InstanceObject> {
        self.resources
            .get_mut(&addr.resource)?
            .instances
            .remove(&addr.key)
    }

    /// Removes every resource entry that has no instances left.
    pub fn prune_resource_husks(&mut self) {
        self.resources.retain(|_, resource| !resource.is_husk());
    }

    /// Returns the addresses of all husks.
    #[must_use]
    pub fn husks(&self) -> Vec<&ConfigResource> {
        self.resources
            .iter()
            .filter(|(_, resource)| resource.is_husk())
            .map(|(addr, _)| addr)
            .collect()
    }

    /// Replaces the recorded check results.
    pub fn record_check_results(&mut self, results: CheckResults) {
        self.check_results = results;
    }

    /// Returns the number of recorded instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.resources.values().map(|r| r.instances.len()).sum()
    }
}

impl ResourceState {
    /// Creates an empty resource entry.
    #[must_use]
    pub const fn new(provider: ProviderAddr) -> Self {
        Self {
            provider,
            instances: BTreeMap::new(),
        }
    }

    /// Returns true if the resource has no instances.
    #[must_use]
    pub fn is_husk(&self) -> bool {
        self.instances.is_empty()
    }
}

impl InstanceObject {
    /// Creates a ready object with no recorded dependencies.
    #[must_use]
    pub const fn ready(value: Value) -> Self {
        Self {
            value,
            status: ObjectStatus::Ready,
            dependencies: Vec::new(),
        }
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Ready => "ready",
            Self::Tainted => "tainted",
        };
        write!(f, "{status}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(s: &str) -> ResourceInstanceAddr {
        s.parse().expect("valid address")
    }

    #[test]
    fn test_remove_leaves_husk() {
        let mut state = State::new();
        let web = addr("aws_instance.web[0]");
        state.set_resource_instance(&web, InstanceObject::ready(json!({"id": "i-1"})), &ProviderAddr::new("aws"));
        assert_eq!(state.instance_count(), 1);

        let removed = state.remove_resource_instance(&web);
        assert!(removed.is_some());
        assert_eq!(state.husks().len(), 1);

        state.prune_resource_husks();
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_state_roundtrip_keys() {
        let mut state = State::new();
        state.set_resource_instance(
            &addr("module.net.aws_subnet.private[\"a\"]"),
            InstanceObject::ready(json!({"cidr": "10.0.1.0/24"})),
            &ProviderAddr::new("aws"),
        );

        let json = serde_json::to_value(&state).expect("serialize");
        assert!(json["resources"]["module.net.aws_subnet.private"]["instances"]["[\"a\"]"].is_object());

        let back: State = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, state);
    }
}
