//! # recast-commons
//!
//! Shared types for the Recast attribute system: scalar values, column
//! descriptors, typed name wrappers, the error taxonomy, pluggable codecs,
//! and process configuration.
//!
//! This crate is the leaf of the workspace - `recast-core` builds the
//! registry, type descriptors, and enum machinery on top of it.

pub mod config;
pub mod errors;
pub mod models;
pub mod serialization;

// Re-export commonly used types at crate root
pub use config::{EncryptionConfig, RecastConfig};
pub use errors::{CastError, DeclarationError, ResolutionError};
pub use models::{AttributeName, Column, ColumnType, ModelName, TableName, Value};
pub use serialization::{Codec, EncryptingCodec, JsonCodec};
