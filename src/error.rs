//! Error types for toolhost.
//!
//! Layered taxonomy: secret resolution and connection building feed the
//! initialization gate; tool operations wrap gate failures as
//! `NotInitialized` so callers can tell "never came up" apart from
//! "configured, but the requested item is absent".

use thiserror::Error;

pub type ToolResult<T> = Result<T, ToolError>;

/// Secret store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("Secret '{name}' not found in store '{store}'")]
    SecretNotFound { store: String, name: String },

    #[error("Access denied to store '{store}': {message}")]
    AccessDenied { store: String, message: String },

    #[error("Secret store unreachable: {0}")]
    StoreUnreachable(String),
}

impl SecretError {
    /// Transient failures may succeed on a later attempt; the other two are
    /// fatal for the attempt that observed them.
    pub fn is_transient(&self) -> bool {
        matches!(self, SecretError::StoreUnreachable(_))
    }
}

/// Connection factory failures. Never retried internally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Malformed secret: {0}")]
    MalformedSecret(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),
}

/// Terminal payload of a failed initialization attempt.
///
/// `Clone` so every caller suspended on the same attempt receives the same
/// classified error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Connection(#[from] ConnectError),

    #[error("Initialization aborted: {0}")]
    Aborted(String),
}

impl InitError {
    /// Stable kind tag for the wire envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            InitError::Secret(SecretError::SecretNotFound { .. }) => "secret_not_found",
            InitError::Secret(SecretError::AccessDenied { .. }) => "access_denied",
            InitError::Secret(SecretError::StoreUnreachable(_)) => "store_unreachable",
            InitError::Connection(ConnectError::MalformedSecret(_)) => "malformed_secret",
            InitError::Connection(ConnectError::ConnectionRefused(_)) => "connection_refused",
            InitError::Aborted(_) => "aborted",
        }
    }
}

/// Errors surfaced by tool operations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The adapter's gate could not produce a handle; wraps the resolver or
    /// factory error verbatim.
    #[error("Tool not initialized: {0}")]
    NotInitialized(#[source] InitError),

    /// The backing service answered, but the requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for unclassified backend errors; the original message is
    /// preserved.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ToolError {
    /// Stable kind tag for the wire envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotInitialized(_) => "not_initialized",
            ToolError::NotFound(_) => "not_found",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Config(_) => "config",
            ToolError::Backend(_) => "unknown",
        }
    }
}
