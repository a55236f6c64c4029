//! Record instances over a resolved schema.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use recast_commons::models::{AttributeName, Value};

use crate::enums::{GeneratedMethod, MethodNamespace};
use crate::error::RecastError;
use crate::registry::model::Model;
use crate::registry::resolved::ResolvedSchema;
use crate::types::TypeDescriptor;

/// Per-attribute state: the raw stored form (if loaded), a one-time cast of
/// it, and any value assigned since.
#[derive(Debug, Default)]
struct AttributeState {
    original: Option<Value>,
    cast_cache: OnceCell<Value>,
    assigned: Option<Value>,
}

/// One instance of a model.
///
/// Reads cast lazily and at most once per loaded value; writes are held
/// uncast until [`changes_applied`](Self::changes_applied) serializes them
/// into new stored state. The schema is captured at instantiation, so a
/// record is never exposed to a half-replaced schema.
pub struct Record {
    model: Arc<Model>,
    schema: Arc<ResolvedSchema>,
    attributes: BTreeMap<AttributeName, AttributeState>,
}

/// Record constructors, available on any shared model handle.
pub trait ModelRecords {
    /// Fresh record with no stored state; reads fall back to defaults.
    fn new_record(&self) -> Result<Record, RecastError>;

    /// Record loaded from raw stored values.
    fn instantiate(&self, row: BTreeMap<AttributeName, Value>) -> Result<Record, RecastError>;
}

impl ModelRecords for Arc<Model> {
    fn new_record(&self) -> Result<Record, RecastError> {
        Ok(Record {
            model: Arc::clone(self),
            schema: self.resolved_schema()?,
            attributes: BTreeMap::new(),
        })
    }

    fn instantiate(&self, row: BTreeMap<AttributeName, Value>) -> Result<Record, RecastError> {
        let schema = self.resolved_schema()?;
        let attributes = row
            .into_iter()
            .map(|(name, raw)| {
                (
                    name,
                    AttributeState {
                        original: Some(raw),
                        ..AttributeState::default()
                    },
                )
            })
            .collect();
        Ok(Record {
            model: Arc::clone(self),
            schema,
            attributes,
        })
    }
}

impl Record {
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn schema(&self) -> &Arc<ResolvedSchema> {
        &self.schema
    }

    /// Current application value of `name`.
    ///
    /// Assigned values are cast on every read (they may still be replaced);
    /// loaded values are cast once and cached; absent values fall back to
    /// the cast declared/column default.
    pub fn get(&self, name: impl Into<AttributeName>) -> Result<Value, RecastError> {
        let name = name.into();
        let descriptor = self.schema.type_of(&name);
        match self.attributes.get(&name) {
            Some(state) => {
                if let Some(assigned) = &state.assigned {
                    return Ok(descriptor.cast_user(assigned)?);
                }
                if let Some(original) = &state.original {
                    let cast = state
                        .cast_cache
                        .get_or_try_init(|| descriptor.cast(original))?;
                    return Ok(cast.clone());
                }
                self.default_for(&descriptor)
            }
            None => self.default_for(&descriptor),
        }
    }

    fn default_for(&self, descriptor: &TypeDescriptor) -> Result<Value, RecastError> {
        match descriptor.default_value() {
            // Declared defaults are user-space values, not stored forms.
            Some(default) => Ok(descriptor.cast_user(default)?),
            None => Ok(Value::Null),
        }
    }

    /// Assigns a value. No casting happens until the value is read or
    /// applied.
    pub fn set(&mut self, name: impl Into<AttributeName>, value: impl Into<Value>) {
        let entry = self.attributes.entry(name.into()).or_default();
        entry.assigned = Some(value.into());
    }

    /// Whether any attribute differs from its stored state.
    pub fn changed(&self) -> Result<bool, RecastError> {
        Ok(!self.changed_attributes()?.is_empty())
    }

    /// Names of attributes that differ from their stored state.
    ///
    /// Assigned values compare by cast value against the original (or the
    /// default, for new records). Loaded values that have been read compare
    /// via the descriptor's in-place detection, which deserializes rather
    /// than byte-compares - a pure assign-then-read round trip reports
    /// unchanged.
    pub fn changed_attributes(&self) -> Result<Vec<AttributeName>, RecastError> {
        let mut changed = Vec::new();
        for (name, state) in &self.attributes {
            let descriptor = self.schema.type_of(name);
            if let Some(assigned) = &state.assigned {
                let new_value = descriptor.cast_user(assigned)?;
                let original_value = match &state.original {
                    Some(raw) => descriptor.cast(raw)?,
                    None => self.default_for(&descriptor)?,
                };
                if new_value != original_value {
                    changed.push(name.clone());
                }
            } else if let (Some(raw), Some(cast)) = (&state.original, state.cast_cache.get()) {
                if descriptor.changed_in_place(raw, cast) {
                    changed.push(name.clone());
                }
            }
        }
        Ok(changed)
    }

    /// Serializes assigned values into new stored state, clearing dirtiness.
    pub fn changes_applied(&mut self) -> Result<(), RecastError> {
        for (name, state) in self.attributes.iter_mut() {
            if let Some(assigned) = state.assigned.take() {
                let descriptor = self.schema.type_of(name);
                let value = descriptor.cast_user(&assigned)?;
                state.original = Some(descriptor.serialize(&value)?);
                state.cast_cache = OnceCell::new();
            }
        }
        Ok(())
    }

    /// Serialized storage image of every schema attribute.
    pub fn to_row(&self) -> Result<BTreeMap<AttributeName, Value>, RecastError> {
        let mut row = BTreeMap::new();
        for name in self.schema.attribute_names() {
            let descriptor = self.schema.type_of(name);
            let value = self.get(name.clone())?;
            row.insert(name.clone(), descriptor.serialize(&value)?);
        }
        Ok(row)
    }

    /// Evaluates a generated predicate (e.g. an enum label check).
    pub fn predicate(&self, method: &str) -> Result<bool, RecastError> {
        match self.model.find_method(MethodNamespace::Instance, method) {
            Some(GeneratedMethod::Predicate { attribute, stored }) => {
                let descriptor = self.schema.type_of(&attribute);
                let current = self.get(attribute)?;
                if current.is_null() {
                    return Ok(false);
                }
                Ok(descriptor.serialize(&current)? == stored)
            }
            _ => Err(RecastError::UnknownMethod {
                model: self.model.name().to_string(),
                method: method.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filtered = self.model.filtered().read();
        let rendered: Vec<(String, String)> = self
            .attributes
            .keys()
            .map(|name| {
                let shown = if filtered.contains(name.as_str()) {
                    "[FILTERED]".to_string()
                } else {
                    match self.get(name.clone()) {
                        Ok(value) => value.to_string(),
                        Err(_) => "<uncastable>".to_string(),
                    }
                };
                (name.to_string(), shown)
            })
            .collect();

        let mut s = f.debug_struct("Record");
        s.field("model", &self.model.name().as_str());
        for (name, shown) in &rendered {
            s.field(name, shown);
        }
        s.finish()
    }
}

/// One attribute-equals-value condition, as produced by a generated scope.
///
/// External query builders read the attribute and stored value; embedded
/// callers can evaluate it directly against records.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeCondition {
    attribute: AttributeName,
    stored: Value,
    negated: bool,
}

impl ScopeCondition {
    pub(crate) fn new(attribute: AttributeName, stored: Value, negated: bool) -> Self {
        Self {
            attribute,
            stored,
            negated,
        }
    }

    pub fn attribute(&self) -> &AttributeName {
        &self.attribute
    }

    pub fn stored_value(&self) -> &Value {
        &self.stored
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    /// SQL comparison semantics: an absent value matches neither the
    /// positive nor the negative form.
    pub fn matches(&self, record: &Record) -> Result<bool, RecastError> {
        let descriptor = record.schema.type_of(&self.attribute);
        let current = record.get(self.attribute.clone())?;
        if current.is_null() {
            return Ok(false);
        }
        let serialized = descriptor.serialize(&current)?;
        Ok((serialized == self.stored) != self.negated)
    }
}
