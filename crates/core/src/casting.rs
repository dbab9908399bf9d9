//! Parameter type casting matrix.
//!
//! Answers "can a value of type A flow into a handle expecting type B".
//! The matrix is fixed data: numeric types cast between each other as
//! listed below, everything else casts only to itself. Types added by
//! configuration that are absent from the table still satisfy the
//! reflexive rule.

/// Parameter types that flow through connections between nodes.
pub mod param_types {
    pub const INT: &str = "INT";
    pub const FLOAT: &str = "FLOAT";
    pub const DOUBLE: &str = "DOUBLE";
    pub const STRING: &str = "STRING";
    pub const STRING_ARRAY: &str = "STRING_ARRAY";
    pub const FILENAMES_ARRAY: &str = "FILENAMES_ARRAY";
    pub const VECTOR2D: &str = "VECTOR2D";

    /// All recognised parameter types.
    pub const ALL: &[&str] = &[
        INT,
        FLOAT,
        DOUBLE,
        STRING,
        STRING_ARRAY,
        FILENAMES_ARRAY,
        VECTOR2D,
    ];
}

/// Allowed cast targets for a parameter type, excluding the type itself.
///
/// Every declared type has an entry, even if empty. Unknown types get the
/// empty entry and therefore only cast reflexively.
pub fn casts_for(param_type: &str) -> &'static [&'static str] {
    match param_type {
        param_types::INT => &[param_types::FLOAT, param_types::DOUBLE],
        param_types::FLOAT => &[param_types::DOUBLE, param_types::INT],
        param_types::DOUBLE => &[param_types::FLOAT, param_types::INT],
        _ => &[],
    }
}

/// Check whether a value of `source_type` may feed a handle expecting
/// `target_type`.
///
/// Reflexive for every type, otherwise looked up in the fixed table.
pub fn can_cast(source_type: &str, target_type: &str) -> bool {
    if source_type == target_type {
        return true;
    }
    casts_for(source_type).contains(&target_type)
}
