//! Shared error taxonomy for Recast.
//!
//! Three tiers, matching where in an attribute's lifecycle a failure can
//! occur: declaring it ([`DeclarationError`]), resolving its type against the
//! schema ([`ResolutionError`]), and casting individual values through it
//! ([`CastError`]). Declaration errors are never deferred; resolution errors
//! are fatal to the triggering access but recoverable on retry; cast errors
//! surface to whoever is reading or writing the value.

use thiserror::Error;

/// Fatal errors raised while a model's attributes are being declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("cannot serialize attribute `{attribute}`: `{base}` is not a serializable base type")]
    ColumnNotSerializable { attribute: String, base: String },

    #[error("enum mapping for `{attribute}` is empty")]
    EmptyEnumMapping { attribute: String },

    #[error("duplicate enum label `{label}` for `{attribute}`")]
    DuplicateEnumLabel { attribute: String, label: String },

    #[error("method `{method}` conflicts with an existing {existing} definition")]
    MethodConflict { method: String, existing: String },

    #[error("unknown attribute type `{name}`")]
    UnknownType { name: String },

    #[error("model `{model}` is already defined")]
    ModelAlreadyDefined { model: String },

    #[error("encrypted attributes require a primary key in the encryption configuration")]
    MissingEncryptionKey,
}

/// Errors raised while resolving pending attributes against column metadata.
///
/// The failing model stays unresolved, so the next access retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("table `{table}` is not present in the schema source")]
    TableNotFound { table: String },

    #[error("schema lookup for `{table}` failed: {message}")]
    LookupFailed { table: String, message: String },
}

/// Per-value errors raised when casting or decoding an attribute value.
///
/// Every variant is distinguishable from "value absent": `Null` never
/// produces a `CastError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("cannot cast {value} ({kind}) to {target}")]
    IncompatibleValue {
        target: String,
        kind: &'static str,
        value: String,
    },

    #[error("`{value}` is not a valid {attribute}")]
    UnknownEnumValue { attribute: String, value: String },

    #[error("malformed payload for codec `{codec}`: {message}")]
    MalformedPayload { codec: String, message: String },

    #[error("payload integrity check failed for codec `{codec}`")]
    IntegrityCheckFailed { codec: String },
}

impl CastError {
    /// Convenience constructor for the common incompatible-value case.
    pub fn incompatible(target: impl Into<String>, value: &crate::models::Value) -> Self {
        CastError::IncompatibleValue {
            target: target.into(),
            kind: value.type_name(),
            value: value.to_string(),
        }
    }
}
