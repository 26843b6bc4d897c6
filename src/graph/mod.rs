//! The apply graph.
//!
//! The graph builder compiles a plan and configuration into a directed
//! acyclic graph of operations. The walker executes it with a
//! topological-readiness scheduler: a node starts once every predecessor has
//! finished, independent nodes run concurrently, and a failed node only
//! prevents its own descendants from running.

mod apply_graph;
mod builder;
mod execute;
mod node;
mod walker;

pub use apply_graph::{ApplyGraph, Operation, UiEdge, UiGraph, UiNode};
pub use builder::GraphBuilder;
pub use execute::WalkContext;
pub use node::{GraphNode, ResourcePhase};
pub use walker::{NodeOutcome, SkipReason, WalkResult, Walker};
