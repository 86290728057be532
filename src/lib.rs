//! MCP server packaging independent tool adapters — calendar, weather, media
//! playback, document lookup — behind one request/response protocol.
//!
//! ## Modules
//!
//! - [`gate`]: lazy, single-flight adapter initialization (the core)
//! - [`secrets`]: remote secret store clients
//! - [`tools`]: tool adapters and dispatch
//! - [`server`]: MCP front-end over stdio
//! - [`config`]: YAML application configuration
//! - [`error`]: layered error taxonomy

pub mod config;
pub mod error;
pub mod gate;
pub mod secrets;
pub mod server;
pub mod tools;

pub use config::{
    AppConfig, CalendarConfig, CredentialSpec, DocumentsConfig, PlaybackConfig, SecretStoreBackend,
    SecretStoreConfig, WeatherConfig,
};
pub use error::{ConnectError, InitError, SecretError, ToolError, ToolResult};
pub use gate::{ConnectionFactory, GateStatus, InitGate};
pub use secrets::{MemorySecretStore, SecretResolver, SecretValue, VaultSecretResolver};
pub use server::ToolhostServer;
pub use tools::{CalendarAdapter, DocumentsAdapter, PlaybackAdapter, Toolbox, WeatherAdapter};
