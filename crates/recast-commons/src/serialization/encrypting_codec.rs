//! Transparent encrypt-and-sign codec.

use base64::prelude::*;
use sha2::{Digest, Sha256};

use crate::errors::CastError;
use crate::models::Value;
use crate::serialization::Codec;

const NONCE_LEN: usize = 12;
const CODEC_NAME: &str = "encrypting";

/// Encrypts values on the way to storage and verifies them on the way back.
///
/// The key is derived with SHA-256 from a secret plus a derivation salt. The
/// payload is the JSON encoding of the value XORed with a SHA-256 counter
/// keystream; a SHA-256 MAC over key, nonce, and ciphertext provides tamper
/// detection. The sealed envelope is bincode-encoded and base64-armored, so
/// the stored form is opaque text that fits any text column.
///
/// Nonces are random by default. [`deterministic`](Self::deterministic)
/// derives the nonce from the plaintext instead, producing stable ciphertext
/// for equal inputs - the property equality queries over encrypted columns
/// need.
pub struct EncryptingCodec {
    key: [u8; 32],
    deterministic: bool,
}

/// Wire envelope for one encrypted value.
#[derive(bincode::Encode, bincode::Decode)]
struct SealedEnvelope {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    mac: [u8; 32],
}

impl EncryptingCodec {
    /// Codec with a random nonce per encryption.
    pub fn new(secret: &str, salt: &str) -> Self {
        Self {
            key: derive_key(secret, salt),
            deterministic: false,
        }
    }

    /// Codec whose ciphertext is a pure function of the plaintext.
    pub fn deterministic(secret: &str, salt: &str) -> Self {
        Self {
            key: derive_key(secret, salt),
            deterministic: true,
        }
    }

    fn nonce_for(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        if self.deterministic {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update(plaintext);
            let digest = hasher.finalize();
            let mut nonce = [0u8; NONCE_LEN];
            nonce.copy_from_slice(&digest[..NONCE_LEN]);
            nonce
        } else {
            rand::random::<[u8; NONCE_LEN]>()
        }
    }

    fn keystream_xor(&self, nonce: &[u8; NONCE_LEN], data: &mut [u8]) {
        for (block_index, block) in data.chunks_mut(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update(nonce);
            hasher.update((block_index as u64).to_le_bytes());
            let pad = hasher.finalize();
            for (byte, pad_byte) in block.iter_mut().zip(pad.iter()) {
                *byte ^= pad_byte;
            }
        }
    }

    fn mac(&self, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(nonce);
        hasher.update(ciphertext);
        hasher.finalize().into()
    }
}

fn derive_key(secret: &str, salt: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

fn malformed(message: impl Into<String>) -> CastError {
    CastError::MalformedPayload {
        codec: CODEC_NAME.to_string(),
        message: message.into(),
    }
}

impl Codec for EncryptingCodec {
    fn name(&self) -> &str {
        CODEC_NAME
    }

    fn dump(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let plaintext =
            serde_json::to_vec(value).map_err(|e| malformed(format!("encode failed: {e}")))?;
        let nonce = self.nonce_for(&plaintext);

        let mut ciphertext = plaintext;
        self.keystream_xor(&nonce, &mut ciphertext);
        let mac = self.mac(&nonce, &ciphertext);

        let envelope = SealedEnvelope {
            nonce,
            ciphertext,
            mac,
        };
        let encoded = bincode::encode_to_vec(&envelope, bincode::config::standard())
            .map_err(|e| malformed(format!("envelope encode failed: {e}")))?;
        Ok(Value::Text(BASE64_STANDARD.encode(encoded)))
    }

    fn load(&self, stored: &Value) -> Result<Value, CastError> {
        let text = match stored {
            Value::Null => return Ok(Value::Null),
            Value::Text(text) => text,
            other => {
                return Err(malformed(format!(
                    "expected armored text, got {}",
                    other.type_name()
                )))
            }
        };

        let encoded = BASE64_STANDARD
            .decode(text)
            .map_err(|e| malformed(format!("base64 decode failed: {e}")))?;
        let (envelope, _): (SealedEnvelope, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard())
                .map_err(|e| malformed(format!("envelope decode failed: {e}")))?;

        if self.mac(&envelope.nonce, &envelope.ciphertext) != envelope.mac {
            return Err(CastError::IntegrityCheckFailed {
                codec: CODEC_NAME.to_string(),
            });
        }

        let mut plaintext = envelope.ciphertext;
        self.keystream_xor(&envelope.nonce, &mut plaintext);
        serde_json::from_slice(&plaintext).map_err(|e| malformed(format!("decode failed: {e}")))
    }
}
