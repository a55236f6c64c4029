//! Finalized per-model schema.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use recast_commons::models::{AttributeName, ColumnType};

use crate::types::TypeDescriptor;

static UNTYPED: Lazy<Arc<TypeDescriptor>> =
    Lazy::new(|| Arc::new(TypeDescriptor::base(ColumnType::Untyped)));

/// The complete, immutable name -> descriptor mapping for one model.
///
/// Built once per (model, generation) and installed atomically: readers see
/// either the previous complete schema or this one, never a mix.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    attributes: BTreeMap<AttributeName, Arc<TypeDescriptor>>,
    generation: u64,
}

impl ResolvedSchema {
    pub(crate) fn new(
        attributes: BTreeMap<AttributeName, Arc<TypeDescriptor>>,
        generation: u64,
    ) -> Self {
        Self {
            attributes,
            generation,
        }
    }

    /// Descriptor for `name`. Unknown attributes read as the neutral
    /// untyped descriptor rather than an error.
    pub fn type_of(&self, name: &AttributeName) -> Arc<TypeDescriptor> {
        self.attributes
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&UNTYPED))
    }

    /// Whether `name` resolved to a real attribute.
    pub fn contains(&self, name: &AttributeName) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &AttributeName> {
        self.attributes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &Arc<TypeDescriptor>)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Schema generation this resolution was built against.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
