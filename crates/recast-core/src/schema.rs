//! Schema-source seam.
//!
//! The registry never reads column metadata directly; it goes through
//! [`SchemaSource`], the one collaborator allowed to perform I/O during
//! resolution. Implementations must tolerate being called repeatedly - the
//! registry re-consults the source after an explicit schema reload.

use dashmap::DashMap;
use recast_commons::errors::ResolutionError;
use recast_commons::models::{Column, TableName};

/// Provider of raw column descriptors for a table.
pub trait SchemaSource: Send + Sync {
    /// Ordered column descriptors for `table`.
    ///
    /// Called at most once per resolution cycle per model; must be safe to
    /// call again at any time.
    fn columns_for(&self, table: &TableName) -> Result<Vec<Column>, ResolutionError>;
}

/// In-memory schema source for embedding and tests.
///
/// Tables can be replaced at any time to simulate external schema changes;
/// models pick the new definition up after `reload_schema()`.
#[derive(Debug, Default)]
pub struct MemorySchemaSource {
    tables: DashMap<TableName, Vec<Column>>,
}

impl MemorySchemaSource {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Installs or replaces a table definition.
    pub fn set_table(&self, table: impl Into<TableName>, columns: Vec<Column>) {
        self.tables.insert(table.into(), columns);
    }

    /// Removes a table definition.
    pub fn remove_table(&self, table: &TableName) {
        self.tables.remove(table);
    }
}

impl SchemaSource for MemorySchemaSource {
    fn columns_for(&self, table: &TableName) -> Result<Vec<Column>, ResolutionError> {
        self.tables
            .get(table)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ResolutionError::TableNotFound {
                table: table.to_string(),
            })
    }
}
