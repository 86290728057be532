//! Secret resolution against a remote key/value secret store.
//!
//! The resolver performs one network fetch per call and caches nothing;
//! memoization is the initialization gate's job. Two implementations:
//! [`VaultSecretResolver`] over HTTP, and [`MemorySecretStore`] for local
//! development and tests.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SecretError;

/// A resolved secret. Redacts itself in every formatting context; the raw
/// value is exposed only to connection factories.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Hand out the raw value. Callers must not log or echo it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Fetches a named secret from a remote store.
#[async_trait]
pub trait SecretResolver: Send + Sync + 'static {
    async fn resolve(&self, store_id: &str, secret_name: &str)
        -> Result<SecretValue, SecretError>;
}

/// HTTP client for a key-vault style secret store.
///
/// The endpoint template maps a store id onto its base URL
/// (`https://{store}.vault.example.net`); secrets are read with
/// `GET {base}/secrets/{name}?api-version=…` and a bearer token.
pub struct VaultSecretResolver {
    http: reqwest::Client,
    endpoint_template: String,
    api_version: String,
}

#[derive(Deserialize)]
struct VaultSecretBody {
    value: String,
}

impl VaultSecretResolver {
    pub fn new(
        endpoint_template: impl Into<String>,
        token: &str,
        api_version: impl Into<String>,
    ) -> Result<Self, String> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {token}")
                .parse()
                .map_err(|e| format!("vault token is not header-safe: {e}"))?,
        );
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| format!("build vault http client: {e}"))?;
        Ok(Self {
            http,
            endpoint_template: endpoint_template.into(),
            api_version: api_version.into(),
        })
    }

    fn secret_url(&self, store_id: &str, secret_name: &str) -> String {
        let base = self.endpoint_template.replace("{store}", store_id);
        format!(
            "{}/secrets/{}?api-version={}",
            base.trim_end_matches('/'),
            secret_name,
            self.api_version
        )
    }
}

#[async_trait]
impl SecretResolver for VaultSecretResolver {
    async fn resolve(
        &self,
        store_id: &str,
        secret_name: &str,
    ) -> Result<SecretValue, SecretError> {
        debug!(store = store_id, secret = secret_name, "resolving secret");

        let response = self
            .http
            .get(self.secret_url(store_id, secret_name))
            .send()
            .await
            .map_err(|e| SecretError::StoreUnreachable(format!("secret store request: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: VaultSecretBody = response.json().await.map_err(|e| {
                SecretError::StoreUnreachable(format!("unexpected secret payload: {e}"))
            })?;
            return Ok(SecretValue::new(body.value));
        }

        match status.as_u16() {
            404 => Err(SecretError::SecretNotFound {
                store: store_id.to_string(),
                name: secret_name.to_string(),
            }),
            401 | 403 => Err(SecretError::AccessDenied {
                store: store_id.to_string(),
                message: format!("secret store returned {status}"),
            }),
            _ => Err(SecretError::StoreUnreachable(format!(
                "secret store returned {status}"
            ))),
        }
    }
}

/// In-memory secret store for local development and tests.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: HashMap<(String, String), String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        store_id: impl Into<String>,
        secret_name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.secrets
            .insert((store_id.into(), secret_name.into()), value.into());
    }

    /// Build from config entries keyed `store_id/secret_name`. Keys without a
    /// separator are rejected earlier by config validation and skipped here.
    pub fn from_entries(entries: &HashMap<String, String>) -> Self {
        let mut store = Self::new();
        for (key, value) in entries {
            if let Some((store_id, secret_name)) = key.split_once('/') {
                store.insert(store_id, secret_name, value.clone());
            }
        }
        store
    }
}

#[async_trait]
impl SecretResolver for MemorySecretStore {
    async fn resolve(
        &self,
        store_id: &str,
        secret_name: &str,
    ) -> Result<SecretValue, SecretError> {
        self.secrets
            .get(&(store_id.to_string(), secret_name.to_string()))
            .map(|value| SecretValue::new(value.clone()))
            .ok_or_else(|| SecretError::SecretNotFound {
                store: store_id.to_string(),
                name: secret_name.to_string(),
            })
    }
}
