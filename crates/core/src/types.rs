//! Shared identifier aliases.

/// Node identifiers are positive integers assigned by the graph model.
pub type NodeId = i64;

/// Task identifiers are assigned by the execution engine on submission.
pub type TaskId = i64;

/// Scene identifiers key a per-session workspace on the execution engine.
pub type SceneId = i64;
