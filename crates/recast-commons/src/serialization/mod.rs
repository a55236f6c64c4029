//! Pluggable column codecs.
//!
//! A [`Codec`] transforms an application value into its stored form and back:
//! structured-text encoding ([`JsonCodec`]), transparent encryption
//! ([`EncryptingCodec`]), or anything a caller plugs in. Codecs sit between
//! an attribute's cast type and its backing column; the type layer composes
//! them, this module only defines the dump/load contract and the built-ins.

mod encrypting_codec;
mod json_codec;

pub use encrypting_codec::EncryptingCodec;
pub use json_codec::JsonCodec;

use crate::errors::CastError;
use crate::models::Value;

/// A dump/load pair applied to values before/after storage.
///
/// Contract: `Null` passes through unchanged in both directions - a codec is
/// never responsible for inventing or removing absence. `load(dump(v)) == v`
/// must hold for every value the codec accepts.
pub trait Codec: Send + Sync {
    /// Stable codec name, used for descriptor equality and error messages.
    fn name(&self) -> &str;

    /// Application value -> stored form.
    fn dump(&self, value: &Value) -> Result<Value, CastError>;

    /// Stored form -> application value.
    fn load(&self, stored: &Value) -> Result<Value, CastError>;
}
