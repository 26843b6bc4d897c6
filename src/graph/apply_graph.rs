//! The compiled apply graph and its read-only export.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::eval::FunctionResults;

use super::node::GraphNode;

/// The kind of walk a graph is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Apply planned changes.
    Apply,
    /// Destroy managed objects.
    Destroy,
}

/// An acyclic graph of apply operations.
///
/// Edges point from a node to the nodes that must wait for it.
#[derive(Debug)]
pub struct ApplyGraph {
    graph: DiGraph<GraphNode, ()>,
    order: Vec<NodeIndex>,
    operation: Operation,
    functions: Arc<FunctionResults>,
}

/// Serializable export of an apply graph, for rendering only.
///
/// The shape is not stable and may change to improve rendering.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UiGraph {
    /// Walk kind.
    pub operation: Operation,
    /// Nodes in topological order.
    pub nodes: Vec<UiNode>,
    /// Dependency edges.
    pub edges: Vec<UiEdge>,
}

/// A node of a [`UiGraph`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UiNode {
    /// Position of the node in `nodes`.
    pub id: usize,
    /// Human-readable label.
    pub label: String,
    /// Node kind.
    pub kind: &'static str,
}

/// An edge of a [`UiGraph`]: `from` completes before `to` starts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UiEdge {
    /// Predecessor id.
    pub from: usize,
    /// Successor id.
    pub to: usize,
}

impl ApplyGraph {
    /// Wraps a graph already checked to be acyclic, with its topological order.
    pub(crate) const fn new(
        graph: DiGraph<GraphNode, ()>,
        order: Vec<NodeIndex>,
        operation: Operation,
        functions: Arc<FunctionResults>,
    ) -> Self {
        Self {
            graph,
            order,
            operation,
            functions,
        }
    }

    /// Returns the walk kind.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns the provider function cache shared with the walk.
    #[must_use]
    pub fn functions(&self) -> Arc<FunctionResults> {
        Arc::clone(&self.functions)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns node indices in topological order.
    #[must_use]
    pub fn topological_order(&self) -> &[NodeIndex] {
        &self.order
    }

    /// Returns a node.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    /// Returns the nodes that must finish before `index` starts.
    pub fn predecessors(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// Returns the nodes waiting for `index`.
    pub fn successors(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Outgoing)
    }

    /// Returns node labels in topological order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.order.iter().map(|&i| self.graph[i].to_string()).collect()
    }

    /// Returns true if an edge orders `from` before `to`.
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.graph.edge_indices().any(|e| {
            self.graph.edge_endpoints(e).is_some_and(|(a, b)| {
                self.graph[a].to_string() == from && self.graph[b].to_string() == to
            })
        })
    }

    /// Returns the configuration objects with postconditions in this graph.
    #[must_use]
    pub fn check_objects(&self) -> Vec<String> {
        let mut objects: Vec<String> = self
            .graph
            .node_weights()
            .filter_map(|node| match node {
                GraphNode::ResourceInstance { change, checks, .. } if !checks.is_empty() => {
                    Some(change.addr.resource.to_string())
                }
                _ => None,
            })
            .collect();
        objects.sort();
        objects.dedup();
        objects
    }

    /// Exports the graph for rendering.
    #[must_use]
    pub fn for_ui(&self) -> UiGraph {
        let mut ids = vec![0; self.graph.node_count()];
        let nodes: Vec<UiNode> = self
            .order
            .iter()
            .enumerate()
            .map(|(id, &index)| {
                ids[index.index()] = id;
                UiNode {
                    id,
                    label: self.graph[index].to_string(),
                    kind: self.graph[index].kind(),
                }
            })
            .collect();

        let mut edges: Vec<UiEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| UiEdge {
                from: ids[a.index()],
                to: ids[b.index()],
            })
            .collect();
        edges.sort_by_key(|e| (e.from, e.to));

        UiGraph {
            operation: self.operation,
            nodes,
            edges,
        }
    }
}

impl UiGraph {
    /// Renders the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph apply {\n  rankdir = \"BT\";\n");
        for node in &self.nodes {
            let shape = match node.kind {
                "provider" => "diamond",
                "variable" | "output" => "note",
                _ => "box",
            };
            let _ = writeln!(
                out,
                "  n{} [label = {:?}, shape = \"{shape}\"];",
                node.id, node.label
            );
        }
        for edge in &self.edges {
            let _ = writeln!(out, "  n{} -> n{};", edge.to, edge.from);
        }
        out.push_str("}\n");
        out
    }
}
