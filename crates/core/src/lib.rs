//! Pure graph logic for the pixelgraph editor.
//!
//! Models the node graph a user assembles, validates connections against
//! the node-type registry and the casting matrix, and compiles the graph
//! into the wire format the remote execution engine accepts. Nothing in
//! this crate performs I/O; fetching the node-type configuration and
//! submitting compiled graphs live in `pixelgraph-engine`.

pub mod casting;
pub mod compiler;
pub mod model;
pub mod registry;
pub mod types;
