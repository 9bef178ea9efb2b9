//! Schema Registry - column metadata for the archive tables
//!
//! One immutable table set is loaded at startup from the static schema
//! document and replaced wholesale when refreshed from `TAP_SCHEMA`.

pub mod registry;

pub use registry::{ColumnCheck, ColumnInfo, SchemaRegistry, SchemaTable, TableSet, REFRESH_TABLES};
