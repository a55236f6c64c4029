//! # recast-core
//!
//! Lazy, thread-safe, inheritance-aware attribute typing for record-mapping
//! stacks.
//!
//! Models declare attributes - raw, codec-serialized, or enum-backed - and
//! each declaration stores a deferred producer. On first schema access the
//! registry resolves every producer against the real column types (merging
//! inherited declarations, nearest entry winning) and installs an immutable
//! [`ResolvedSchema`] atomically; concurrent first readers are serialized so
//! the schema lookup runs once, and every reader observes a complete schema.
//!
//! ```ignore
//! let source = Arc::new(MemorySchemaSource::new());
//! source.set_table("topics", vec![Column::simple("status", ColumnType::Integer)]);
//!
//! let registry = AttributeRegistry::new(source);
//! let topic = registry.define_model("Topic", "topics")?;
//! topic
//!     .enum_attribute("status", vec![("draft", 0), ("published", 1)])
//!     .declare()?;
//!
//! let record = topic.instantiate(row)?;
//! assert!(record.predicate("draft")?);
//! ```

pub mod enums;
pub mod error;
pub mod record;
pub mod registry;
pub mod schema;
pub mod types;

pub use enums::{EnumDeclaration, EnumMapping, GeneratedMethod, MethodNamespace};
pub use error::{RecastError, Result};
pub use record::{ModelRecords, Record, ScopeCondition};
pub use registry::{
    AttributeDefault, AttributeRegistry, Model, PendingAttributeTable, ResolvedSchema,
    TypeProducer,
};
pub use schema::{MemorySchemaSource, SchemaSource};
pub use types::{CastBehavior, CastType, TypeDescriptor, TypeLookup};

// Re-export the commons surface for downstream convenience
pub use recast_commons::config::{EncryptionConfig, RecastConfig};
pub use recast_commons::errors::{CastError, DeclarationError, ResolutionError};
pub use recast_commons::models::{AttributeName, Column, ColumnType, ModelName, TableName, Value};
pub use recast_commons::serialization::{Codec, EncryptingCodec, JsonCodec};
