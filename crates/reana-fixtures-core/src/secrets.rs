//! Sample user secrets.
//!
//! Secret values are stored base64-encoded, as the secret store keeps them.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a secret is exposed to workflow jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    /// Environment variable.
    Env,
    /// Mounted file.
    File,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::File => "file",
        }
    }
}

/// A single user secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSecret {
    /// Base64-encoded value.
    pub value: String,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
}

impl UserSecret {
    /// Create a secret from its plain value.
    pub fn new(plain: impl AsRef<[u8]>, secret_type: SecretType) -> Self {
        Self {
            value: STANDARD.encode(plain.as_ref()),
            secret_type,
        }
    }

    /// Decode the stored value.
    pub fn decoded(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.value)?)
    }
}

/// User secrets keyed by secret name.
pub type UserSecrets = BTreeMap<String, UserSecret>;

fn secrets(entries: &[(&str, &str, SecretType)]) -> UserSecrets {
    entries
        .iter()
        .map(|(name, plain, secret_type)| (name.to_string(), UserSecret::new(plain, *secret_type)))
        .collect()
}

/// Generic user secrets: credentials as env vars plus a keytab file.
pub fn user_secrets() -> UserSecrets {
    secrets(&[
        ("username", "reanauser", SecretType::Env),
        ("password", "1232456", SecretType::Env),
        (".keytab", "keytab file.", SecretType::File),
    ])
}

/// Secrets needed to obtain a Kerberos ticket.
pub fn kerberos_user_secrets() -> UserSecrets {
    secrets(&[
        ("CERN_USER", "johndoe", SecretType::Env),
        ("CERN_KEYTAB", ".keytab", SecretType::Env),
        (".keytab", "keytab file", SecretType::File),
    ])
}

/// No secrets at all.
pub fn empty_user_secrets() -> UserSecrets {
    UserSecrets::new()
}

/// Map of secret name to type, as recorded in the secret store annotation.
pub fn secret_types(secrets: &UserSecrets) -> BTreeMap<String, SecretType> {
    secrets
        .iter()
        .map(|(name, secret)| (name.clone(), secret.secret_type))
        .collect()
}
