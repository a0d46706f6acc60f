//! Core data model for romsift: machines, name parsing, and the attribute
//! registry that rule and sort expressions resolve against.
//!
//! Everything in this crate is free of I/O. Catalog readers, metadata
//! importers and the install pipeline live in the other workspace crates.

pub mod attribute;
pub mod error;
pub mod machine;
pub mod name;

pub use attribute::{
    Attribute, AttributeRegistry, AttributeValue, DataType, FieldAttribute, NULL_SENTINEL,
};
pub use error::ConfigError;
pub use machine::{Machine, Manual};
pub use name::{DumpStatus, ParsedName, parse_name};
