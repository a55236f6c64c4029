//! Attribute registry: pending declarations and the schema-load resolver.

pub mod model;
pub mod pending;
pub mod resolved;

#[cfg(test)]
mod tests;

pub use model::{AttributeRegistry, Model};
pub use pending::{
    AttributeDefault, DecorateFn, PendingAttribute, PendingAttributeTable, TypeProducer,
};
pub use resolved::ResolvedSchema;
