//! Graph compiler.
//!
//! Turns an editable [`GraphModel`] into the execution-ready node list
//! the engine accepts. Connected inputs are replaced with symbolic
//! reference tokens of the exact grammar `@node:<id>:<handle>`; a token
//! always wins over any literal the user typed before connecting. The
//! compiler is a pure function and keeps no state between calls; it does
//! not check acyclicity or resolvability, which belong to the engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::GraphModel;
use crate::registry::NodeTypeRegistry;
use crate::types::NodeId;

/// Execution-ready form of a node instance. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Literal values and reference tokens keyed by input-handle id.
    pub inputs: std::collections::BTreeMap<String, Value>,
}

/// The submission body: `{ "nodes": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledGraph {
    pub nodes: Vec<CompiledNode>,
}

/// Errors raised during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Two edges feed the same input handle; the graph is ambiguous and
    /// must be fixed in the editor.
    #[error("input '{handle}' of node {node} is fed by more than one edge")]
    AmbiguousInput { node: NodeId, handle: String },

    /// A node references a type that is no longer in the registry.
    #[error("node {node} has unknown type '{node_type}'")]
    UnknownType { node: NodeId, node_type: String },
}

/// Build the reference token for an upstream output handle.
///
/// The grammar `@node:<decimal id>:<handle>` is a wire contract; every
/// consumer round-trips this exact format.
pub fn reference_token(source: NodeId, source_handle: &str) -> String {
    format!("@node:{source}:{source_handle}")
}

/// Compile a graph model against the registry it was edited with.
///
/// Emits one [`CompiledNode`] per node instance, preserving the model's
/// insertion order.
pub fn compile(
    model: &GraphModel,
    registry: &NodeTypeRegistry,
) -> Result<CompiledGraph, CompileError> {
    // Index (target node, target handle) -> feeding edge. A second edge
    // for the same pair is a hard error rather than a silent pick.
    let mut feeding: HashMap<(NodeId, &str), (NodeId, &str)> = HashMap::new();
    for edge in model.edges() {
        let key = (edge.target, edge.target_handle.as_str());
        if feeding
            .insert(key, (edge.source, edge.source_handle.as_str()))
            .is_some()
        {
            return Err(CompileError::AmbiguousInput {
                node: edge.target,
                handle: edge.target_handle.clone(),
            });
        }
    }

    let mut nodes = Vec::with_capacity(model.nodes().len());
    for instance in model.nodes() {
        if !registry.contains(&instance.node_type) {
            return Err(CompileError::UnknownType {
                node: instance.id,
                node_type: instance.node_type.clone(),
            });
        }

        // Start from the current literals (registry defaults included),
        // then overwrite every fed handle with its reference token.
        let mut inputs = instance.inputs.clone();
        for ((target, handle), (source, source_handle)) in &feeding {
            if *target == instance.id {
                inputs.insert(
                    (*handle).to_string(),
                    Value::String(reference_token(*source, source_handle)),
                );
            }
        }

        nodes.push(CompiledNode {
            id: instance.id,
            node_type: instance.node_type.clone(),
            inputs,
        });
    }

    Ok(CompiledGraph { nodes })
}
