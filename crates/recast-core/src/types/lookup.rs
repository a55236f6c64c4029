//! Symbolic type lookup.
//!
//! Maps the names used in attribute declarations (`"integer"`, `"string"`,
//! a registered custom name) to descriptor factories. Owned by the
//! [`AttributeRegistry`](crate::registry::AttributeRegistry) rather than
//! living in a process-wide global, so two registries can carry different
//! custom type sets.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use recast_commons::errors::DeclarationError;
use recast_commons::models::ColumnType;

use crate::types::TypeDescriptor;

/// Factory producing a descriptor once the underlying column type is known.
pub type TypeFactory = Arc<dyn Fn(ColumnType) -> TypeDescriptor + Send + Sync>;

/// Name -> descriptor-factory table.
#[derive(Default)]
pub struct TypeLookup {
    custom: RwLock<HashMap<String, TypeFactory>>,
}

impl TypeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom type factory under `name`.
    ///
    /// The factory receives the resolved column type of the attribute it is
    /// applied to, so custom types can decorate the native type.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl Fn(ColumnType) -> TypeDescriptor + Send + Sync + 'static,
    ) {
        self.custom.write().insert(name.into(), Arc::new(factory));
    }

    /// Resolves a symbolic name against the built-in column types first,
    /// then the registered factories.
    pub fn lookup(
        &self,
        name: &str,
        base: ColumnType,
    ) -> Result<TypeDescriptor, DeclarationError> {
        if let Some(column_type) = ColumnType::from_sql_name(name) {
            return Ok(TypeDescriptor::base(column_type));
        }
        if let Some(factory) = self.custom.read().get(name) {
            return Ok(factory(base));
        }
        Err(DeclarationError::UnknownType {
            name: name.to_string(),
        })
    }
}
