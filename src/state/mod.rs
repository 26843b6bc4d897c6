//! State management module for the Terrace apply engine.
//!
//! This module provides the recorded state model, the concurrent working copy
//! used while a graph is walked, and the run lock that keeps operations on one
//! engine exclusive.

mod lock;
mod sync;
mod types;

pub use lock::{LockInfo, RunGuard, RunLock, generate_holder_id};
pub use sync::SyncState;
pub use types::{InstanceObject, ObjectStatus, OutputValue, ResourceState, State};
