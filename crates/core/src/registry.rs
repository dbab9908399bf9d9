//! Node type registry.
//!
//! The node service describes every available node type as a JSON
//! document (input/output handles, defaults, display metadata). This
//! module validates that dynamically-shaped configuration into typed
//! structs at the load boundary; nothing downstream ever touches the raw
//! wire shape. A malformed type is dropped with a warning rather than
//! half-loaded, and never fails the whole load.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

/// One input or output slot on a node type.
#[derive(Debug, Clone, Deserialize)]
pub struct HandleDef {
    /// Parameter type flowing through this handle (see [`crate::casting`]).
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether the engine requires a value for this handle.
    #[serde(default)]
    pub required: bool,

    /// How a human would edit this handle. Opaque to the compiler.
    #[serde(default)]
    pub widget: Option<String>,

    /// Default literal value, when the type declares one.
    #[serde(default)]
    pub default: Option<Value>,
}

/// Display metadata for a node type. Opaque to the compiler; consumed by
/// discovery and palette UIs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisplayInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Schema for one kind of processing step.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeTypeDefinition {
    /// Input handles keyed by handle id.
    #[serde(default)]
    pub inputs: BTreeMap<String, HandleDef>,

    /// Output handles keyed by handle id.
    #[serde(default)]
    pub outputs: BTreeMap<String, HandleDef>,

    /// Palette/display metadata.
    #[serde(default)]
    pub display: DisplayInfo,
}

/// Errors raised when loading the node-type configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// The configuration document was not a JSON object keyed by type name.
    #[error("node configuration root must be a JSON object")]
    InvalidRoot,
}

/// Immutable-for-session lookup table of node type definitions.
///
/// Built once via [`NodeTypeRegistry::from_config`] from the node
/// service's `/info` response and treated as read-only afterward.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: HashMap<String, NodeTypeDefinition>,
    /// Type names that failed validation and were dropped during load.
    skipped: Vec<String>,
}

impl NodeTypeRegistry {
    /// Validate a configuration document into a registry.
    ///
    /// The root must be a JSON object mapping type name to schema. Each
    /// entry is deserialized and validated independently; entries that
    /// fail are logged, recorded in [`skipped`](Self::skipped), and
    /// dropped without affecting the rest of the load.
    pub fn from_config(config: &Value) -> Result<Self, ConfigLoadError> {
        let root = config.as_object().ok_or(ConfigLoadError::InvalidRoot)?;

        let mut types = HashMap::with_capacity(root.len());
        let mut skipped = Vec::new();

        for (type_name, schema) in root {
            match parse_definition(type_name, schema) {
                Ok(def) => {
                    types.insert(type_name.clone(), def);
                }
                Err(reason) => {
                    tracing::warn!(
                        node_type = %type_name,
                        %reason,
                        "Dropping malformed node type definition",
                    );
                    skipped.push(type_name.clone());
                }
            }
        }

        tracing::info!(
            loaded = types.len(),
            skipped = skipped.len(),
            "Node type registry loaded",
        );

        Ok(Self { types, skipped })
    }

    /// Look up a node type definition by name.
    pub fn get(&self, type_name: &str) -> Option<&NodeTypeDefinition> {
        self.types.get(type_name)
    }

    /// Whether a type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// All registered type names, sorted for stable iteration.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry holds no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Type names dropped during load for failing validation.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Default literal values for the input handles of a type.
    ///
    /// Only handles that declare a default appear in the result; the
    /// rest are left for user entry or a connection. `None` when the
    /// type is unknown.
    pub fn default_inputs(&self, type_name: &str) -> Option<BTreeMap<String, Value>> {
        let def = self.get(type_name)?;
        Some(
            def.inputs
                .iter()
                .filter_map(|(id, handle)| {
                    handle.default.clone().map(|value| (id.clone(), value))
                })
                .collect(),
        )
    }

    /// Group registered type names by their declared display category.
    ///
    /// Types without a category group under `"Other"`. Names within a
    /// category are sorted.
    pub fn by_category(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, def) in &self.types {
            let category = def
                .display
                .category
                .clone()
                .unwrap_or_else(|| "Other".to_string());
            grouped.entry(category).or_default().push(name.clone());
        }
        for names in grouped.values_mut() {
            names.sort_unstable();
        }
        grouped
    }
}

/// Deserialize and validate a single type schema.
///
/// Returns a human-readable reason on failure; the caller decides what
/// to do with the dropped type.
fn parse_definition(type_name: &str, schema: &Value) -> Result<NodeTypeDefinition, String> {
    if type_name.trim().is_empty() {
        return Err("empty type name".to_string());
    }

    let def: NodeTypeDefinition =
        serde_json::from_value(schema.clone()).map_err(|e| e.to_string())?;

    for (handle_id, handle) in def.inputs.iter().chain(def.outputs.iter()) {
        if handle_id.trim().is_empty() {
            return Err("empty handle id".to_string());
        }
        if handle.data_type.trim().is_empty() {
            return Err(format!("handle '{handle_id}' has an empty data type"));
        }
    }

    Ok(def)
}
