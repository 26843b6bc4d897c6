//! Working state shared by concurrently running graph nodes.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

use crate::addrs::{ConfigResource, InstanceKey, ProviderAddr, ResourceInstanceAddr};
use crate::checks::CheckResults;

use super::types::{InstanceObject, OutputValue, ResourceState, State};

/// Mutable working copy of the state during a walk.
///
/// Writes to one resource address are serialized by the map's shard lock, so
/// writers to different addresses do not block each other. Every write also
/// holds the structural lock in shared mode; [`SyncState::close`] takes it
/// exclusively to read back a consistent snapshot.
#[derive(Debug)]
pub struct SyncState {
    resources: DashMap<ConfigResource, ResourceState>,
    outputs: DashMap<String, OutputValue>,
    check_results: Mutex<CheckResults>,
    structure: RwLock<()>,
}

impl SyncState {
    /// Takes ownership of a state as the working copy.
    #[must_use]
    pub fn new(state: State) -> Self {
        Self {
            resources: state.resources.into_iter().collect(),
            outputs: state.outputs.into_iter().collect(),
            check_results: Mutex::new(state.check_results),
            structure: RwLock::new(()),
        }
    }

    /// Returns a copy of a resource instance object.
    #[must_use]
    pub fn resource_instance(&self, addr: &ResourceInstanceAddr) -> Option<InstanceObject> {
        let resource = self.resources.get(&addr.resource)?;
        resource.instances.get(&addr.key).cloned()
    }

    /// Returns the values of every instance of a resource.
    #[must_use]
    pub fn resource_values(&self, addr: &ConfigResource) -> Option<BTreeMap<InstanceKey, Value>> {
        let resource = self.resources.get(addr)?;
        Some(
            resource
                .instances
                .iter()
                .map(|(key, object)| (key.clone(), object.value.clone()))
                .collect(),
        )
    }

    /// Adds or replaces a resource instance object.
    pub fn set_resource_instance(
        &self,
        addr: &ResourceInstanceAddr,
        object: InstanceObject,
        provider: &ProviderAddr,
    ) {
        let _structure = self.structure.read().unwrap_or_else(PoisonError::into_inner);
        let mut resource = self
            .resources
            .entry(addr.resource.clone())
            .or_insert_with(|| ResourceState::new(provider.clone()));
        resource.provider = provider.clone();
        resource.instances.insert(addr.key.clone(), object);
    }

    /// Removes a resource instance object, leaving the resource entry in place.
    pub fn remove_resource_instance(&self, addr: &ResourceInstanceAddr) -> Option<InstanceObject> {
        let _structure = self.structure.read().unwrap_or_else(PoisonError::into_inner);
        let mut resource = self.resources.get_mut(&addr.resource)?;
        resource.instances.remove(&addr.key)
    }

    /// Sets a root output value.
    pub fn set_output_value(&self, name: &str, value: OutputValue) {
        let _structure = self.structure.read().unwrap_or_else(PoisonError::into_inner);
        self.outputs.insert(name.to_string(), value);
    }

    /// Removes a root output value.
    pub fn remove_output_value(&self, name: &str) {
        let _structure = self.structure.read().unwrap_or_else(PoisonError::into_inner);
        self.outputs.remove(name);
    }

    /// Replaces the recorded check results.
    pub fn record_check_results(&self, results: CheckResults) {
        let mut checks = self
            .check_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *checks = results;
    }

    /// Produces the immutable state from the working copy.
    #[must_use]
    pub fn close(&self) -> State {
        let _structure = self.structure.write().unwrap_or_else(PoisonError::into_inner);
        let check_results = self
            .check_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        State {
            resources: self
                .resources
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            check_results,
        }
    }
}
