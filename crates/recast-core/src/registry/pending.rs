//! Pending attribute declarations, held until schema load.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use recast_commons::models::{AttributeName, Value};

use crate::error::RecastError;
use crate::types::TypeDescriptor;

/// Decorating producer function: receives the resolved inner descriptor and
/// returns the wrapping one.
pub type DecorateFn =
    Arc<dyn Fn(TypeDescriptor) -> Result<TypeDescriptor, RecastError> + Send + Sync>;

/// Deferred computation of a [`TypeDescriptor`], run once the real column
/// type is known.
#[derive(Clone)]
pub enum TypeProducer {
    /// Symbolic base type, looked up at resolution. Starts a fresh chain.
    Named(String),

    /// Explicit descriptor used as-is.
    Fixed(TypeDescriptor),

    /// Decoration over a previously-registered producer, or over the raw
    /// column descriptor when `inner` is `None`.
    Decorator {
        inner: Option<Box<TypeProducer>>,
        decorate: DecorateFn,
    },
}

impl TypeProducer {
    /// Identity decoration over the raw column type.
    pub fn passthrough() -> Self {
        TypeProducer::Decorator {
            inner: None,
            decorate: Arc::new(Ok),
        }
    }
}

impl fmt::Debug for TypeProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeProducer::Named(name) => f.debug_tuple("Named").field(name).finish(),
            TypeProducer::Fixed(descriptor) => f.debug_tuple("Fixed").field(descriptor).finish(),
            TypeProducer::Decorator { inner, .. } => f
                .debug_struct("Decorator")
                .field("inner", inner)
                .finish_non_exhaustive(),
        }
    }
}

/// Declared-default sentinel: "no default given" is distinct from an
/// explicit null default.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeDefault {
    /// No default was provided; the column's own default applies.
    NotProvided,

    /// Explicit default, including `Value::Null`.
    Value(Value),
}

impl AttributeDefault {
    pub fn is_provided(&self) -> bool {
        matches!(self, AttributeDefault::Value(_))
    }
}

/// One pending declaration: the producer and its declared default, tracked
/// independently so either can be overridden without losing the other.
#[derive(Debug, Clone)]
pub struct PendingAttribute {
    pub producer: TypeProducer,
    pub default: AttributeDefault,
}

/// Per-model table of attributes awaiting schema resolution.
///
/// Owned exclusively by its model; subclasses never mutate a parent's table,
/// they shadow entries in their own.
#[derive(Debug, Default)]
pub struct PendingAttributeTable {
    entries: BTreeMap<AttributeName, PendingAttribute>,
}

impl PendingAttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: AttributeName, entry: PendingAttribute) {
        self.entries.insert(name, entry);
    }

    pub fn get(&self, name: &AttributeName) -> Option<&PendingAttribute> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &PendingAttribute)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
