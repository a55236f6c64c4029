//! Process-wide Recast configuration.
//!
//! Constructed once at startup (typically deserialized from the host
//! application's settings) and passed by `Arc` into the attribute registry.
//! The core reads these values at model-definition time only.

use serde::{Deserialize, Serialize};

/// Top-level settings consumed by the attribute registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecastConfig {
    /// Transparent-encryption settings
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

/// Settings for the encrypting codec and its surrounding behavior.
///
/// Key material is treated as opaque strings; key management itself lives
/// outside this library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Secret used for non-deterministic encryption
    pub primary_key: Option<String>,

    /// Secret used when deterministic ciphertext is requested
    pub deterministic_key: Option<String>,

    /// Salt mixed into key derivation
    pub key_derivation_salt: Option<String>,

    /// Whether equality queries over deterministic attributes are supported
    #[serde(default)]
    pub extend_queries: bool,

    /// Whether test fixtures should be written encrypted
    #[serde(default)]
    pub encrypt_fixtures: bool,

    /// Whether encrypted attribute names join the filtered-parameter list
    #[serde(default)]
    pub add_to_filter_parameters: bool,
}

impl RecastConfig {
    /// Configuration with encryption keys set and the filter list enabled,
    /// the common production shape.
    pub fn with_encryption_keys(
        primary_key: impl Into<String>,
        deterministic_key: impl Into<String>,
        key_derivation_salt: impl Into<String>,
    ) -> Self {
        Self {
            encryption: EncryptionConfig {
                primary_key: Some(primary_key.into()),
                deterministic_key: Some(deterministic_key.into()),
                key_derivation_salt: Some(key_derivation_salt.into()),
                extend_queries: true,
                encrypt_fixtures: false,
                add_to_filter_parameters: true,
            },
        }
    }
}
