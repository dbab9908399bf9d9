//! Editable graph model.
//!
//! [`GraphModel`] is the live set of node instances and edges one editing
//! session owns. It enforces identifier and referential invariants at
//! mutation time: node ids are monotonic and never reused, every edge
//! endpoint names a handle that exists on its node's type, and connection
//! types must satisfy the casting matrix. Node types are immutable after
//! creation, so edges never need migration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::casting::can_cast;
use crate::registry::NodeTypeRegistry;
use crate::types::NodeId;

/// Canvas coordinate of a node. Opaque to the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One node placed on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Unique within the model; assigned by [`GraphModel::create_node`].
    pub id: NodeId,

    /// Name of the [`crate::registry::NodeTypeDefinition`] this node
    /// instantiates. Immutable after creation.
    #[serde(rename = "type")]
    pub node_type: String,

    /// Literal input values keyed by input-handle id. Handles fed by a
    /// connection may hold a stale literal here; the compiler replaces
    /// them with reference tokens.
    pub inputs: BTreeMap<String, Value>,

    /// Canvas position.
    #[serde(default)]
    pub position: Position,
}

/// A directed connection from an output handle to an input handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub source_handle: String,
    pub target: NodeId,
    pub target_handle: String,
}

/// Errors from node-level mutations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The requested node type is not in the registry.
    #[error("unknown node type '{0}'")]
    UnknownType(String),

    /// A node with this id already exists in the model.
    #[error("node id {0} already exists")]
    DuplicateId(NodeId),

    /// No node with this id exists in the model.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
}

/// Reasons a connection attempt is rejected.
///
/// An invalid connection is an expected outcome, not a reported error;
/// editors that only need a yes/no use
/// [`GraphModel::is_valid_connection`] and ignore the reason.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("source node {0} not found")]
    SourceNodeNotFound(NodeId),

    #[error("target node {0} not found")]
    TargetNodeNotFound(NodeId),

    /// A node may not feed itself.
    #[error("node {0} cannot connect to itself")]
    SelfLoop(NodeId),

    /// The node references a type that is no longer registered.
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    /// The named handle is not an output of the source node's type.
    #[error("'{handle}' is not an output handle of {node_type}")]
    UnknownSourceHandle { node_type: String, handle: String },

    /// The named handle is not an input of the target node's type.
    #[error("'{handle}' is not an input handle of {node_type}")]
    UnknownTargetHandle { node_type: String, handle: String },

    /// The handle types fail the casting matrix.
    #[error("cannot cast {source_type} to {target_type}")]
    IncompatibleTypes {
        source_type: String,
        target_type: String,
    },
}

/// The mutable node/edge set one editing session owns.
///
/// Insertion order of nodes is preserved and carried through to the
/// compiled output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphModel {
    nodes: Vec<NodeInstance>,
    edges: Vec<Edge>,
    /// High-water mark for id assignment. Ids are never reused, even
    /// after the node that held one is removed.
    last_id: NodeId,
}

impl GraphModel {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[NodeInstance] {
        &self.nodes
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Create a node of `node_type` at `position`.
    ///
    /// The new id is `max(existing ids, high-water mark, 0) + 1`.
    /// Inputs start from the registry's defaults for the type, overlaid
    /// with `initial`.
    pub fn create_node(
        &mut self,
        registry: &NodeTypeRegistry,
        node_type: &str,
        initial: BTreeMap<String, Value>,
        position: Position,
    ) -> Result<NodeId, GraphError> {
        let mut inputs = registry
            .default_inputs(node_type)
            .ok_or_else(|| GraphError::UnknownType(node_type.to_string()))?;
        inputs.extend(initial);

        let max_existing = self.nodes.iter().map(|n| n.id).max().unwrap_or(0);
        let id = self.last_id.max(max_existing) + 1;
        self.last_id = id;

        self.nodes.push(NodeInstance {
            id,
            node_type: node_type.to_string(),
            inputs,
            position,
        });

        tracing::debug!(node_id = id, node_type, "Node created");
        Ok(id)
    }

    /// Insert an existing node, e.g. when loading a saved graph.
    ///
    /// Rejects duplicate ids and unregistered types; bumps the id
    /// high-water mark so later [`create_node`](Self::create_node) calls
    /// never collide.
    pub fn insert_node(
        &mut self,
        registry: &NodeTypeRegistry,
        node: NodeInstance,
    ) -> Result<(), GraphError> {
        if !registry.contains(&node.node_type) {
            return Err(GraphError::UnknownType(node.node_type));
        }
        if self.node(node.id).is_some() {
            return Err(GraphError::DuplicateId(node.id));
        }
        self.last_id = self.last_id.max(node.id);
        self.nodes.push(node);
        Ok(())
    }

    /// Set a literal input value on a node.
    ///
    /// The value is kept even for handles currently fed by a connection;
    /// the compiler decides which wins.
    pub fn set_input(
        &mut self,
        id: NodeId,
        handle: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(GraphError::NodeNotFound(id))?;
        node.inputs.insert(handle.to_string(), value);
        Ok(())
    }

    /// Remove a node and every edge attached to it. No-op when the id is
    /// unknown. The id is never handed out again.
    pub fn remove_node(&mut self, id: NodeId) {
        self.nodes.retain(|n| n.id != id);
        self.edges.retain(|e| e.source != id && e.target != id);
    }

    /// Validate and add an edge.
    ///
    /// Rejected when either endpoint is missing, the handles do not
    /// exist in the right direction on the node types, the handle types
    /// fail the casting matrix, or source and target are the same node.
    /// Re-connecting an identical edge is a no-op. Multiple edges onto
    /// the same target handle from *different* sources are accepted here
    /// and rejected at compile time.
    pub fn connect(
        &mut self,
        registry: &NodeTypeRegistry,
        edge: Edge,
    ) -> Result<(), ConnectionError> {
        self.validate_connection(registry, &edge)?;
        if !self.edges.contains(&edge) {
            tracing::debug!(
                source = edge.source,
                source_handle = %edge.source_handle,
                target = edge.target,
                target_handle = %edge.target_handle,
                "Edge connected",
            );
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Remove a specific edge. No-op if absent.
    pub fn disconnect(&mut self, edge: &Edge) {
        self.edges.retain(|e| e != edge);
    }

    /// Silent pre-check used by editors while the user drags a
    /// connection.
    pub fn is_valid_connection(&self, registry: &NodeTypeRegistry, edge: &Edge) -> bool {
        self.validate_connection(registry, edge).is_ok()
    }

    fn validate_connection(
        &self,
        registry: &NodeTypeRegistry,
        edge: &Edge,
    ) -> Result<(), ConnectionError> {
        if edge.source == edge.target {
            return Err(ConnectionError::SelfLoop(edge.source));
        }

        let source = self
            .node(edge.source)
            .ok_or(ConnectionError::SourceNodeNotFound(edge.source))?;
        let target = self
            .node(edge.target)
            .ok_or(ConnectionError::TargetNodeNotFound(edge.target))?;

        let source_def = registry
            .get(&source.node_type)
            .ok_or_else(|| ConnectionError::UnknownNodeType(source.node_type.clone()))?;
        let target_def = registry
            .get(&target.node_type)
            .ok_or_else(|| ConnectionError::UnknownNodeType(target.node_type.clone()))?;

        let source_handle = source_def.outputs.get(&edge.source_handle).ok_or_else(|| {
            ConnectionError::UnknownSourceHandle {
                node_type: source.node_type.clone(),
                handle: edge.source_handle.clone(),
            }
        })?;
        let target_handle = target_def.inputs.get(&edge.target_handle).ok_or_else(|| {
            ConnectionError::UnknownTargetHandle {
                node_type: target.node_type.clone(),
                handle: edge.target_handle.clone(),
            }
        })?;

        if !can_cast(&source_handle.data_type, &target_handle.data_type) {
            return Err(ConnectionError::IncompatibleTypes {
                source_type: source_handle.data_type.clone(),
                target_type: target_handle.data_type.clone(),
            });
        }

        Ok(())
    }
}
