//! Structured-text codec backed by serde_json.

use crate::errors::CastError;
use crate::models::Value;
use crate::serialization::Codec;

/// Encodes application values as JSON text.
///
/// `load` maps JSON scalars back onto native [`Value`] variants, so an
/// integer stored through this codec reads back as `Value::Integer`, not as
/// text - the behavior callers rely on when a plain text column carries
/// JSON-coded data.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn dump(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::Text(value.to_json().to_string()))
    }

    fn load(&self, stored: &Value) -> Result<Value, CastError> {
        match stored {
            Value::Null => Ok(Value::Null),
            // Already-structured input (e.g. a json column) passes through.
            Value::Json(v) => Ok(Value::from_json(v.clone())),
            Value::Text(text) => serde_json::from_str(text)
                .map(Value::from_json)
                .map_err(|e| CastError::MalformedPayload {
                    codec: "json".to_string(),
                    message: e.to_string(),
                }),
            other => Err(CastError::MalformedPayload {
                codec: "json".to_string(),
                message: format!("expected text, got {}", other.type_name()),
            }),
        }
    }
}
