//! Finalized cast/serialize behavior for one attribute.

use std::fmt;
use std::sync::Arc;

use recast_commons::errors::{CastError, DeclarationError};
use recast_commons::models::{AttributeName, Column, ColumnType, Value};
use recast_commons::serialization::Codec;

use crate::enums::EnumMapping;

/// Open seam for externally-registered cast types.
///
/// Implementations registered through
/// [`TypeLookup`](crate::types::TypeLookup) plug arbitrary cast/serialize
/// behavior into an attribute without touching the built-in kinds.
pub trait CastBehavior: Send + Sync {
    /// Stable name, used for descriptor equality and error messages.
    fn name(&self) -> &str;

    /// Root column type this behavior stores into.
    fn base_type(&self) -> ColumnType {
        ColumnType::Untyped
    }

    /// Raw stored value -> application value.
    fn cast(&self, value: &Value) -> Result<Value, CastError>;

    /// Application value -> raw stored value.
    fn serialize(&self, value: &Value) -> Result<Value, CastError>;

    /// Deserialize-and-compare change detection.
    fn changed_in_place(&self, old_raw: &Value, new_value: &Value) -> bool {
        if old_raw.is_null() {
            return !new_value.is_null();
        }
        match self.cast(old_raw) {
            Ok(current) => current != *new_value,
            Err(_) => true,
        }
    }
}

/// The cast kind of a resolved attribute.
///
/// Decoration nests: an enum over a serialized type over a base column type
/// is `Enum { subtype: Serialized { subtype: Base(..) } }`.
#[derive(Clone)]
pub enum CastType {
    /// Plain column-native casting
    Base(ColumnType),

    /// Externally-registered behavior
    Custom {
        name: String,
        behavior: Arc<dyn CastBehavior>,
    },

    /// Codec-decorated subtype; the codec sits next to the application
    /// value, the subtype next to the column
    Serialized {
        subtype: Box<CastType>,
        codec: Arc<dyn Codec>,
    },

    /// Label-mapped subtype; strict in both directions
    Enum {
        attribute: AttributeName,
        mapping: Arc<EnumMapping>,
        subtype: Box<CastType>,
    },
}

impl CastType {
    /// Root column type at the bottom of the decoration chain.
    pub fn base_type(&self) -> ColumnType {
        match self {
            CastType::Base(t) => *t,
            CastType::Custom { behavior, .. } => behavior.base_type(),
            CastType::Serialized { subtype, .. } => subtype.base_type(),
            CastType::Enum { subtype, .. } => subtype.base_type(),
        }
    }

    /// Whether values of this kind can be mutated through a reference the
    /// caller holds, requiring deserialize-and-compare change detection.
    pub fn is_mutable(&self) -> bool {
        match self {
            CastType::Base(t) => *t == ColumnType::Json,
            CastType::Custom { .. } => true,
            CastType::Serialized { .. } => true,
            CastType::Enum { subtype, .. } => subtype.is_mutable(),
        }
    }

    /// Raw stored value -> application value. `Null` passes through.
    pub fn cast(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            CastType::Base(t) => t.cast_value(value),
            CastType::Custom { behavior, .. } => behavior.cast(value),
            CastType::Serialized { subtype, codec } => {
                let intermediate = subtype.cast(value)?;
                if intermediate.is_null() {
                    return Ok(Value::Null);
                }
                codec.load(&intermediate)
            }
            CastType::Enum {
                attribute,
                mapping,
                subtype,
            } => {
                if let Value::Text(label) = value {
                    if mapping.contains_label(label) {
                        return Ok(value.clone());
                    }
                }
                let stored = subtype.cast(value)?;
                match mapping.label_for(&stored) {
                    Some(label) => Ok(Value::Text(label.to_string())),
                    None => Err(CastError::UnknownEnumValue {
                        attribute: attribute.to_string(),
                        value: stored.to_string(),
                    }),
                }
            }
        }
    }

    /// Application value -> raw stored value. `Null` passes through.
    pub fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            CastType::Base(t) => t.serialize_value(value),
            CastType::Custom { behavior, .. } => behavior.serialize(value),
            CastType::Serialized { subtype, codec } => {
                let intermediate = codec.dump(value)?;
                if intermediate.is_null() {
                    return Ok(Value::Null);
                }
                subtype.serialize(&intermediate)
            }
            CastType::Enum {
                attribute,
                mapping,
                subtype,
            } => {
                if let Value::Text(label) = value {
                    if let Some(stored) = mapping.value_for(label) {
                        return subtype.serialize(stored);
                    }
                }
                let stored = subtype.cast(value)?;
                if mapping.label_for(&stored).is_some() {
                    subtype.serialize(&stored)
                } else {
                    Err(CastError::UnknownEnumValue {
                        attribute: attribute.to_string(),
                        value: stored.to_string(),
                    })
                }
            }
        }
    }

    /// Whether the stored form `old_raw` no longer matches `new_value`.
    pub fn changed_in_place(&self, old_raw: &Value, new_value: &Value) -> bool {
        match self {
            CastType::Custom { behavior, .. } => behavior.changed_in_place(old_raw, new_value),
            _ if !self.is_mutable() => false,
            _ => {
                if old_raw.is_null() {
                    return !new_value.is_null();
                }
                match self.cast(old_raw) {
                    Ok(current) => current != *new_value,
                    Err(_) => true,
                }
            }
        }
    }
}

impl fmt::Debug for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastType::Base(t) => f.debug_tuple("Base").field(t).finish(),
            CastType::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            CastType::Serialized { subtype, codec } => f
                .debug_struct("Serialized")
                .field("subtype", subtype)
                .field("codec", &codec.name())
                .finish(),
            CastType::Enum {
                attribute,
                mapping,
                subtype,
            } => f
                .debug_struct("Enum")
                .field("attribute", attribute)
                .field("labels", &mapping.labels().collect::<Vec<_>>())
                .field("subtype", subtype)
                .finish(),
        }
    }
}

impl PartialEq for CastType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CastType::Base(a), CastType::Base(b)) => a == b,
            (CastType::Custom { name: a, .. }, CastType::Custom { name: b, .. }) => a == b,
            (
                CastType::Serialized {
                    subtype: a,
                    codec: ca,
                },
                CastType::Serialized {
                    subtype: b,
                    codec: cb,
                },
            ) => a == b && ca.name() == cb.name(),
            (
                CastType::Enum {
                    attribute: aa,
                    mapping: ma,
                    subtype: sa,
                },
                CastType::Enum {
                    attribute: ab,
                    mapping: mb,
                    subtype: sb,
                },
            ) => aa == ab && ma == mb && sa == sb,
            _ => false,
        }
    }
}

/// Immutable cast/serialize/default description for one attribute.
///
/// Installed into a [`ResolvedSchema`](crate::registry::ResolvedSchema) and
/// never mutated afterward; re-declaration replaces the table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    cast: CastType,
    default: Option<Value>,
}

impl TypeDescriptor {
    pub fn new(cast: CastType) -> Self {
        Self {
            cast,
            default: None,
        }
    }

    /// Descriptor casting straight through a column type.
    pub fn base(column_type: ColumnType) -> Self {
        Self::new(CastType::Base(column_type))
    }

    /// Pass-through descriptor for a raw column, carrying its default.
    pub fn from_column(column: &Column) -> Self {
        Self {
            cast: CastType::Base(column.native_type),
            default: column.default_literal.clone(),
        }
    }

    /// Descriptor backed by a registered custom behavior.
    pub fn custom(behavior: Arc<dyn CastBehavior>) -> Self {
        Self::new(CastType::Custom {
            name: behavior.name().to_string(),
            behavior,
        })
    }

    /// Wraps `inner` in `codec`. An already-serialized inner has its codec
    /// replaced rather than stacked. Fails when the root base type cannot
    /// round-trip through a codec.
    pub fn serialized(
        attribute: &AttributeName,
        inner: TypeDescriptor,
        codec: Arc<dyn Codec>,
    ) -> Result<TypeDescriptor, DeclarationError> {
        let TypeDescriptor { cast, default } = inner;
        let subtype = match cast {
            CastType::Serialized { subtype, .. } => subtype,
            other => Box::new(other),
        };
        ensure_serializable(attribute, subtype.base_type())?;
        Ok(TypeDescriptor {
            cast: CastType::Serialized { subtype, codec },
            default,
        })
    }

    /// Wraps `inner` in an enum mapping. An already-enumerated inner is
    /// unwrapped first, so re-declaration replaces the mapping.
    pub fn enumerated(
        attribute: &AttributeName,
        mapping: Arc<EnumMapping>,
        inner: TypeDescriptor,
    ) -> TypeDescriptor {
        let TypeDescriptor { cast, default } = inner;
        let subtype = match cast {
            CastType::Enum { subtype, .. } => subtype,
            other => Box::new(other),
        };
        TypeDescriptor {
            cast: CastType::Enum {
                attribute: attribute.clone(),
                mapping,
                subtype,
            },
            default,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub(crate) fn replacing_default(mut self, default: Option<Value>) -> Self {
        self.default = default;
        self
    }

    pub fn cast_type(&self) -> &CastType {
        &self.cast
    }

    pub fn base_type(&self) -> ColumnType {
        self.cast.base_type()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn cast(&self, value: &Value) -> Result<Value, CastError> {
        self.cast.cast(value)
    }

    /// Casts a user-provided value (as opposed to a raw stored one).
    ///
    /// Mutable kinds normalize through a serialize/cast round trip, so the
    /// held value is exactly what a reload would produce; immutable kinds
    /// cast directly.
    pub fn cast_user(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if self.cast.is_mutable() {
            let stored = self.cast.serialize(value)?;
            self.cast.cast(&stored)
        } else {
            self.cast.cast(value)
        }
    }

    pub fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        self.cast.serialize(value)
    }

    pub fn changed_in_place(&self, old_raw: &Value, new_value: &Value) -> bool {
        self.cast.changed_in_place(old_raw, new_value)
    }
}

pub(crate) fn ensure_serializable(
    attribute: &AttributeName,
    base: ColumnType,
) -> Result<(), DeclarationError> {
    if base == ColumnType::Binary {
        return Err(DeclarationError::ColumnNotSerializable {
            attribute: attribute.to_string(),
            base: base.sql_name().to_string(),
        });
    }
    Ok(())
}
