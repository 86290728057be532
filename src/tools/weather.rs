//! Current-conditions lookup against a remote weather service.
//!
//! The API key lives in the secret store. Key-authenticated services have no
//! handshake to probe, so the factory validates the key shape and the first
//! lookup surfaces reachability.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::WeatherConfig,
    error::{ConnectError, ToolError, ToolResult},
    gate::{ConnectionFactory, GateStatus, InitGate},
    secrets::{SecretResolver, SecretValue},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeatherReport {
    pub location: String,
    pub description: String,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub units: String,
}

/// Native operations of a connected weather service.
#[async_trait]
pub trait WeatherProvider: Send + Sync + 'static {
    /// `Ok(None)` when the service does not know the location.
    async fn current(&self, location: &str) -> ToolResult<Option<WeatherReport>>;
}

impl std::fmt::Debug for dyn WeatherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn WeatherProvider")
    }
}

/// HTTP weather handle.
pub struct HttpWeather {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    units: String,
}

#[async_trait]
impl WeatherProvider for HttpWeather {
    async fn current(&self, location: &str) -> ToolResult<Option<WeatherReport>> {
        let url = format!("{}/weather", self.endpoint.trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("weather lookup: {e}")))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "weather service returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("weather body: {e}")))?;
        Ok(Some(report_from_value(location, &self.units, &body)))
    }
}

pub(crate) fn report_from_value(location: &str, units: &str, body: &Value) -> WeatherReport {
    WeatherReport {
        location: body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(location)
            .to_string(),
        description: body
            .get("weather")
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        temperature: body
            .get("main")
            .and_then(|main| main.get("temp"))
            .and_then(Value::as_f64)
            .unwrap_or_default(),
        humidity: body
            .get("main")
            .and_then(|main| main.get("humidity"))
            .and_then(Value::as_f64),
        wind_speed: body
            .get("wind")
            .and_then(|wind| wind.get("speed"))
            .and_then(Value::as_f64),
        units: units.to_string(),
    }
}

/// Builds an [`HttpWeather`] from a resolved API key.
pub struct WeatherFactory {
    endpoint: String,
    units: String,
}

impl WeatherFactory {
    pub fn new(endpoint: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            units: units.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for WeatherFactory {
    type Handle = Arc<dyn WeatherProvider>;

    async fn build(&self, secret: &SecretValue) -> Result<Self::Handle, ConnectError> {
        let api_key = secret.expose().trim();
        if api_key.is_empty() || api_key.contains(char::is_whitespace) {
            return Err(ConnectError::MalformedSecret(
                "weather api key must be a single non-empty token".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConnectError::ConnectionRefused(format!("build http client: {e}")))?;

        debug!(endpoint = %self.endpoint, "weather service configured");
        Ok(Arc::new(HttpWeather {
            http,
            endpoint: self.endpoint.clone(),
            api_key: api_key.to_string(),
            units: self.units.clone(),
        }))
    }
}

/// Weather tool; the single operation passes through the gate.
pub struct WeatherAdapter {
    gate: InitGate<Arc<dyn WeatherProvider>>,
}

impl WeatherAdapter {
    pub fn new(config: &WeatherConfig, resolver: Arc<dyn SecretResolver>) -> Self {
        let factory = WeatherFactory::new(&config.endpoint, &config.units);
        Self {
            gate: InitGate::provisioned("weather", resolver, factory, config.credential.clone()),
        }
    }

    /// Adapter over an arbitrary factory; used by tests to inject mocks.
    pub fn with_factory<F>(
        resolver: Arc<dyn SecretResolver>,
        factory: F,
        credential: crate::config::CredentialSpec,
    ) -> Self
    where
        F: ConnectionFactory<Handle = Arc<dyn WeatherProvider>>,
    {
        Self {
            gate: InitGate::provisioned("weather", resolver, factory, credential),
        }
    }

    pub fn status(&self) -> GateStatus {
        self.gate.status()
    }

    pub async fn current_conditions(&self, location: &str) -> ToolResult<WeatherReport> {
        if location.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "location must not be empty".to_string(),
            ));
        }
        let provider = self
            .gate
            .ensure_ready()
            .await
            .map_err(ToolError::NotInitialized)?;
        match provider.current(location).await? {
            Some(report) => Ok(report),
            None => Err(ToolError::NotFound(format!("location '{location}'"))),
        }
    }
}
