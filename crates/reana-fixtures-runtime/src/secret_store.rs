//! Kubernetes secret store access and its test double.
//!
//! Each user's secrets live in one Kubernetes `Secret` named
//! `<prefix><user id>`. Values are kept in `data`; the `secrets_types`
//! annotation maps every secret name to how it is exposed (`env` or `file`).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use uuid::Uuid;

use reana_fixtures_core::config::SecretsConfig;
use reana_fixtures_core::error::{FixtureError, Result};
use reana_fixtures_core::secrets::{secret_types, SecretType, UserSecret, UserSecrets};
use reana_fixtures_core::users::NoDbUser;

/// Annotation holding the JSON map of secret name to type.
pub const SECRETS_TYPES_ANNOTATION: &str = "secrets_types";

/// The part of the Kubernetes core API the platform uses for secrets.
pub trait SecretStoreClient: Send + Sync {
    fn read_namespaced_secret<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret>> + Send + 'a>>;
}

/// Name of a user's secret store.
pub fn secret_store_name(config: &SecretsConfig, user_id: Uuid) -> String {
    format!("{}{}", config.store_prefix, user_id)
}

/// Build the secret store holding `secrets` for `user_id`.
pub fn build_secret_store(
    config: &SecretsConfig,
    user_id: Uuid,
    secrets: &UserSecrets,
) -> Result<Secret> {
    let types = serde_json::to_string(&secret_types(secrets))?;

    let mut data = BTreeMap::new();
    for (name, secret) in secrets {
        data.insert(name.clone(), ByteString(secret.decoded()?));
    }

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(secret_store_name(config, user_id)),
            namespace: Some(config.namespace.clone()),
            annotations: Some(BTreeMap::from([(
                SECRETS_TYPES_ANNOTATION.to_string(),
                types,
            )])),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

/// Read a secret store back into user secrets.
pub fn parse_secret_store(secret: &Secret) -> Result<UserSecrets> {
    let types: BTreeMap<String, SecretType> = match secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(SECRETS_TYPES_ANNOTATION))
    {
        Some(raw) => serde_json::from_str(raw)?,
        None => BTreeMap::new(),
    };

    let mut secrets = UserSecrets::new();
    for (name, value) in secret.data.iter().flatten() {
        let secret_type = types.get(name).copied().ok_or_else(|| {
            FixtureError::Secret(format!("secret '{}' has no recorded type", name))
        })?;
        secrets.insert(
            name.clone(),
            UserSecret {
                value: STANDARD.encode(&value.0),
                secret_type,
            },
        );
    }
    Ok(secrets)
}

/// Fetch and parse a user's secrets through `client`.
pub async fn fetch_user_secrets(
    client: &dyn SecretStoreClient,
    config: &SecretsConfig,
    user_id: Uuid,
) -> Result<UserSecrets> {
    let name = secret_store_name(config, user_id);
    let secret = client
        .read_namespaced_secret(&name, &config.namespace)
        .await?;
    parse_secret_store(&secret)
}

/// A read made against [`MockCoreV1Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRead {
    pub name: String,
    pub namespace: String,
}

/// Core API client that answers every read with one secret store.
///
/// # Example
///
/// ```ignore
/// let make_client = corev1_api_client_with_user_secrets(&no_db_user());
/// let client = make_client.make(&user_secrets())?;
///
/// let secrets = fetch_user_secrets(&client, &SecretsConfig::default(), user.id).await?;
/// client.assert_read(&secret_store_name(&SecretsConfig::default(), user.id));
/// ```
pub struct MockCoreV1Client {
    secret: Secret,
    reads: RwLock<Vec<SecretRead>>,
}

impl MockCoreV1Client {
    /// Serve `secret` for every read.
    pub fn new(secret: Secret) -> Self {
        Self {
            secret,
            reads: RwLock::new(Vec::new()),
        }
    }

    /// Serve the secret store of `user_id` holding `secrets`.
    pub fn with_user_secrets(
        user_id: Uuid,
        secrets: &UserSecrets,
        config: &SecretsConfig,
    ) -> Result<Self> {
        Ok(Self::new(build_secret_store(config, user_id, secrets)?))
    }

    /// The secret served.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Every read, oldest first.
    pub fn reads(&self) -> Vec<SecretRead> {
        self.reads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Assert the secret `name` was read at least once.
    pub fn assert_read(&self, name: &str) {
        let reads = self.reads();
        assert!(
            reads.iter().any(|r| r.name == name),
            "Expected secret '{}' to be read, reads: {:?}",
            name,
            reads
        );
    }

    /// Assert no secret was read.
    pub fn assert_not_read(&self) {
        let reads = self.reads();
        assert!(reads.is_empty(), "Expected no secret reads, got {:?}", reads);
    }
}

impl SecretStoreClient for MockCoreV1Client {
    fn read_namespaced_secret<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret>> + Send + 'a>> {
        Box::pin(async move {
            self.reads
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(SecretRead {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                });
            tracing::trace!(name, namespace, "Served mock secret store");
            Ok(self.secret.clone())
        })
    }
}

/// Makes [`MockCoreV1Client`]s for one in-memory user.
#[derive(Debug, Clone)]
pub struct CoreV1ClientFactory {
    owner: NoDbUser,
    config: SecretsConfig,
}

impl CoreV1ClientFactory {
    pub fn new(owner: NoDbUser, config: SecretsConfig) -> Self {
        Self { owner, config }
    }

    pub fn owner(&self) -> NoDbUser {
        self.owner
    }

    /// A client serving `secrets` as the owner's secret store.
    pub fn make(&self, secrets: &UserSecrets) -> Result<MockCoreV1Client> {
        MockCoreV1Client::with_user_secrets(self.owner.id, secrets, &self.config)
    }
}

/// Factory of core API clients serving `owner`'s secrets.
pub fn corev1_api_client_with_user_secrets(owner: &NoDbUser) -> CoreV1ClientFactory {
    CoreV1ClientFactory::new(*owner, SecretsConfig::default())
}
