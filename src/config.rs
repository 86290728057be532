//! Application configuration.
//!
//! One YAML file holds the secret-store section plus one optional section per
//! tool adapter. Sections that are absent simply leave their tool
//! unregistered. Every section carries its own `validate()`; `AppConfig::load`
//! runs them all before anything touches the network.

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ToolError, ToolResult};

/// Names a secret inside a remote secret store. Supplied at adapter
/// construction time and never changed afterwards.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialSpec {
    pub store_id: String,
    pub secret_name: String,
}

impl CredentialSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.store_id.trim().is_empty() {
            return Err("credential store_id must not be empty".to_string());
        }
        if self.secret_name.trim().is_empty() {
            return Err("credential secret_name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Secret store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretStoreBackend {
    #[default]
    Memory,
    Vault,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecretStoreConfig {
    #[serde(default)]
    pub backend: SecretStoreBackend,

    /// Vault endpoint template; `{store}` is replaced with the credential's
    /// store id (e.g. `https://{store}.vault.example.net`).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the vault access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Memory backend only: `store_id/secret_name` keys mapped to values.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

fn default_token_env() -> String {
    "TOOLHOST_VAULT_TOKEN".to_string()
}

fn default_api_version() -> String {
    "7.4".to_string()
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            backend: SecretStoreBackend::default(),
            endpoint: None,
            token_env: default_token_env(),
            api_version: default_api_version(),
            secrets: HashMap::new(),
        }
    }
}

impl SecretStoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.backend {
            SecretStoreBackend::Memory => {
                for key in self.secrets.keys() {
                    if key.split_once('/').is_none() {
                        return Err(format!(
                            "memory secret key '{key}' must be 'store_id/secret_name'"
                        ));
                    }
                }
                Ok(())
            }
            SecretStoreBackend::Vault => {
                let endpoint = self
                    .endpoint
                    .as_deref()
                    .ok_or("vault backend requires an endpoint template")?;
                if !endpoint.contains("{store}") {
                    return Err("vault endpoint must contain a '{store}' placeholder".to_string());
                }
                validate_http_url(&endpoint.replace("{store}", "probe"))?;
                if self.token_env.trim().is_empty() {
                    return Err("token_env must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Document-by-id lookup. The store endpoint and key arrive inside the
/// resolved connection string, so only the resource coordinates live here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentsConfig {
    pub credential: CredentialSpec,
    pub database: String,
    pub container: String,
}

impl DocumentsConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.credential.validate()?;
        if self.database.trim().is_empty() {
            return Err("documents database must not be empty".to_string());
        }
        if self.container.trim().is_empty() {
            return Err("documents container must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalendarConfig {
    pub credential: CredentialSpec,
    pub endpoint: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.credential.validate()?;
        validate_http_url(&self.endpoint)?;
        if self.calendar_id.trim().is_empty() {
            return Err("calendar_id must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeatherConfig {
    pub credential: CredentialSpec,
    pub endpoint: String,
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_units() -> String {
    "metric".to_string()
}

impl WeatherConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.credential.validate()?;
        validate_http_url(&self.endpoint)?;
        if self.units.trim().is_empty() {
            return Err("weather units must not be empty".to_string());
        }
        Ok(())
    }
}

/// Local media playback; no remote credential involved.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Scripting interpreter used to drive the player.
    #[serde(default = "default_player_command")]
    pub command: String,

    /// Player application addressed by the script.
    #[serde(default = "default_player_app")]
    pub application: String,
}

fn default_player_command() -> String {
    "osascript".to_string()
}

fn default_player_app() -> String {
    "Music".to_string()
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            application: default_player_app(),
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("playback command must not be empty".to_string());
        }
        if self.application.trim().is_empty() {
            return Err("playback application must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub secret_store: SecretStoreConfig,

    #[serde(default)]
    pub documents: Option<DocumentsConfig>,

    #[serde(default)]
    pub calendar: Option<CalendarConfig>,

    #[serde(default)]
    pub weather: Option<WeatherConfig>,

    #[serde(default)]
    pub playback: Option<PlaybackConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> ToolResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ToolError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> ToolResult<Self> {
        let config: AppConfig =
            serde_yaml::from_str(raw).map_err(|e| ToolError::Config(format!("parse config: {e}")))?;
        config.validate().map_err(ToolError::Config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.secret_store
            .validate()
            .map_err(|e| format!("secret_store: {e}"))?;
        if let Some(documents) = &self.documents {
            documents.validate().map_err(|e| format!("documents: {e}"))?;
        }
        if let Some(calendar) = &self.calendar {
            calendar.validate().map_err(|e| format!("calendar: {e}"))?;
        }
        if let Some(weather) = &self.weather {
            weather.validate().map_err(|e| format!("weather: {e}"))?;
        }
        if let Some(playback) = &self.playback {
            playback.validate().map_err(|e| format!("playback: {e}"))?;
        }
        Ok(())
    }
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("invalid url '{raw}': {e}"))?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(format!("unsupported url scheme: {scheme}"));
    }
    if url.host().is_none() {
        return Err(format!("url '{raw}' must have a host"));
    }
    Ok(())
}
