//! Document-by-id lookup over a remote document store.
//!
//! The store credential is a connection string
//! (`AccountEndpoint=…;AccountKey=…`) held in the secret store; the factory
//! parses it, builds an authenticated HTTP client, and probes the container
//! before handing the handle to the gate.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    config::DocumentsConfig,
    error::{ConnectError, ToolError, ToolResult},
    gate::{ConnectionFactory, GateStatus, InitGate},
    secrets::{SecretResolver, SecretValue},
};

/// Native operations of a connected document store.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Point-read by id. `Ok(None)` when the id is absent.
    async fn get_by_id(&self, id: &str) -> ToolResult<Option<Value>>;

    async fn container_info(&self) -> ToolResult<ContainerInfo>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerInfo {
    pub container_id: String,
    #[serde(default)]
    pub partition_key: Value,
    #[serde(default)]
    pub indexing_policy: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentPayload {
    pub id: String,
    pub data: Value,
}

#[derive(Debug)]
pub(crate) struct ConnectionString {
    pub endpoint: String,
    pub key: String,
}

/// Parse `AccountEndpoint=…;AccountKey=…` segments. The key may itself
/// contain `=` (base64 padding), so only the first `=` per segment splits.
pub(crate) fn parse_connection_string(raw: &str) -> Result<ConnectionString, ConnectError> {
    let mut endpoint = None;
    let mut key = None;
    for segment in raw.split(';').filter(|s| !s.trim().is_empty()) {
        let Some((name, value)) = segment.split_once('=') else {
            return Err(ConnectError::MalformedSecret(
                "connection string segments must be 'Name=value'".to_string(),
            ));
        };
        match name.trim() {
            "AccountEndpoint" => endpoint = Some(value.trim().to_string()),
            "AccountKey" => key = Some(value.trim().to_string()),
            _ => {}
        }
    }
    let endpoint = endpoint.filter(|e| !e.is_empty()).ok_or_else(|| {
        ConnectError::MalformedSecret("connection string is missing AccountEndpoint".to_string())
    })?;
    let key = key.filter(|k| !k.is_empty()).ok_or_else(|| {
        ConnectError::MalformedSecret("connection string is missing AccountKey".to_string())
    })?;
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConnectError::MalformedSecret(format!(
            "AccountEndpoint has unsupported scheme: {endpoint}"
        )));
    }
    Ok(ConnectionString { endpoint, key })
}

/// HTTP document store handle.
pub struct HttpDocumentStore {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    container: String,
}

impl HttpDocumentStore {
    fn container_url(&self) -> String {
        format!(
            "{}/dbs/{}/colls/{}",
            self.endpoint.trim_end_matches('/'),
            self.database,
            self.container
        )
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_by_id(&self, id: &str) -> ToolResult<Option<Value>> {
        let url = format!("{}/docs/{}", self.container_url(), id);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("document read: {e}")))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "document store returned {}",
                response.status()
            )));
        }
        let document = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("document body: {e}")))?;
        Ok(Some(document))
    }

    async fn container_info(&self) -> ToolResult<ContainerInfo> {
        let response = self
            .http
            .get(self.container_url())
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("container read: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "document store returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("container body: {e}")))?;
        Ok(container_info_from_value(&self.container, &body))
    }
}

fn container_info_from_value(fallback_id: &str, body: &Value) -> ContainerInfo {
    ContainerInfo {
        container_id: body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(fallback_id)
            .to_string(),
        partition_key: body.get("partitionKey").cloned().unwrap_or(Value::Null),
        indexing_policy: body.get("indexingPolicy").cloned().unwrap_or(Value::Null),
    }
}

/// In-memory document store used in tests and local development.
#[derive(Default)]
pub struct MemoryDocumentStore {
    container: String,
    docs: parking_lot::Mutex<HashMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            docs: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: impl Into<String>, document: Value) {
        self.docs.lock().insert(id.into(), document);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_by_id(&self, id: &str) -> ToolResult<Option<Value>> {
        Ok(self.docs.lock().get(id).cloned())
    }

    async fn container_info(&self) -> ToolResult<ContainerInfo> {
        Ok(ContainerInfo {
            container_id: self.container.clone(),
            partition_key: Value::Null,
            indexing_policy: Value::Null,
        })
    }
}

/// Builds an [`HttpDocumentStore`] from a resolved connection string.
pub struct DocumentStoreFactory {
    database: String,
    container: String,
}

impl DocumentStoreFactory {
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for DocumentStoreFactory {
    type Handle = Arc<dyn DocumentStore>;

    async fn build(&self, secret: &SecretValue) -> Result<Self::Handle, ConnectError> {
        let conn = parse_connection_string(secret.expose())?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", conn.key).parse().map_err(|e| {
                ConnectError::MalformedSecret(format!("AccountKey is not header-safe: {e}"))
            })?,
        );
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectError::ConnectionRefused(format!("build http client: {e}")))?;

        let store = HttpDocumentStore {
            http,
            endpoint: conn.endpoint,
            database: self.database.clone(),
            container: self.container.clone(),
        };

        // Handshake: read the container metadata so a bad endpoint or key
        // surfaces at build time rather than on the first lookup.
        store
            .container_info()
            .await
            .map_err(|e| ConnectError::ConnectionRefused(e.to_string()))?;

        debug!(database = %store.database, container = %store.container, "document store connected");
        Ok(Arc::new(store))
    }
}

/// Document lookup tool; every operation passes through the gate.
pub struct DocumentsAdapter {
    gate: InitGate<Arc<dyn DocumentStore>>,
}

impl DocumentsAdapter {
    pub fn new(config: &DocumentsConfig, resolver: Arc<dyn SecretResolver>) -> Self {
        let factory = DocumentStoreFactory::new(&config.database, &config.container);
        Self {
            gate: InitGate::provisioned("documents", resolver, factory, config.credential.clone()),
        }
    }

    /// Adapter over an arbitrary factory; used by tests to inject mocks.
    pub fn with_factory<F>(
        resolver: Arc<dyn SecretResolver>,
        factory: F,
        credential: crate::config::CredentialSpec,
    ) -> Self
    where
        F: ConnectionFactory<Handle = Arc<dyn DocumentStore>>,
    {
        Self {
            gate: InitGate::provisioned("documents", resolver, factory, credential),
        }
    }

    pub fn status(&self) -> GateStatus {
        self.gate.status()
    }

    pub async fn get_document_by_id(&self, doc_id: &str) -> ToolResult<DocumentPayload> {
        if doc_id.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "doc_id must not be empty".to_string(),
            ));
        }
        let store = self
            .gate
            .ensure_ready()
            .await
            .map_err(ToolError::NotInitialized)?;
        match store.get_by_id(doc_id).await? {
            Some(data) => Ok(DocumentPayload {
                id: doc_id.to_string(),
                data,
            }),
            None => Err(ToolError::NotFound(format!("document '{doc_id}'"))),
        }
    }

    pub async fn container_info(&self) -> ToolResult<ContainerInfo> {
        let store = self
            .gate
            .ensure_ready()
            .await
            .map_err(ToolError::NotInitialized)?;
        store.container_info().await
    }
}
