//! Graph definitions and per-session execution state.
//!
//! Node payloads are kept as opaque JSON (`{"type": "...", ...}`); the node
//! crate decides how to interpret them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub invocation: serde_json::Value,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, invocation: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            invocation,
        }
    }

    /// The invocation type tag, if present.
    pub fn invocation_type(&self) -> Option<&str> {
        self.invocation.get("type").and_then(|t| t.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Graph {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: GraphNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// A saved, reusable graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryGraph {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub graph: Graph,
}

impl LibraryGraph {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            graph,
        }
    }
}

/// Progress of one graph run (a "session").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExecutionState {
    pub id: String,
    pub graph: Graph,
    #[serde(default)]
    pub executed: Vec<String>,
    #[serde(default)]
    pub results: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub errors: HashMap<String, String>,
}

impl GraphExecutionState {
    pub fn new(graph: Graph) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            graph,
            executed: Vec::new(),
            results: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    /// Next node that has not run yet, in declaration order.
    pub fn next(&self) -> Option<&GraphNode> {
        if self.has_error() {
            return None;
        }
        self.graph
            .nodes
            .iter()
            .find(|n| !self.executed.iter().any(|e| e == &n.id))
    }

    pub fn complete(&mut self, node_id: &str, output: serde_json::Value) {
        self.mark_executed(node_id);
        self.results.insert(node_id.to_string(), output);
    }

    pub fn set_error(&mut self, node_id: &str, error: impl Into<String>) {
        self.mark_executed(node_id);
        self.errors.insert(node_id.to_string(), error.into());
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Finished once every node ran or any node failed.
    pub fn is_complete(&self) -> bool {
        self.has_error() || self.next().is_none()
    }

    fn mark_executed(&mut self, node_id: &str) {
        if !self.executed.iter().any(|e| e == node_id) {
            self.executed.push(node_id.to_string());
        }
    }
}
