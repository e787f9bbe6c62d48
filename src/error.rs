//! Error types for pairgate.

use crate::session::ConnectionState;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote client error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("API server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Device store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Device store at {path} is unreadable: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Device store at {path} is closed")]
    Closed { path: String },

    #[error("Device store IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode credentials: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors reported by the remote protocol client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("client is not connected")]
    NotConnected,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Whether the error means the connection itself is down, as opposed to a
    /// failure of one request over a working connection.
    pub fn is_connection_down(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionLost(_))
    }
}

/// Connection lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is not initialized")]
    NotInitialized,

    #[error("Pairing timed out")]
    PairingTimeout,

    #[error("Cannot transition session from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Connect handshake failed: {0}")]
    ConnectFailed(RemoteError),

    #[error("Teardown failed: {0}")]
    TeardownFailed(RemoteError),

    #[error("Device store corrupted at {path}: {reason}")]
    StoreCorrupted { path: String, reason: String },

    #[error("Device store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupted { path, reason } => Self::StoreCorrupted { path, reason },
            other => Self::Store(other),
        }
    }
}

impl SessionError {
    /// Stable status string for external callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::PairingTimeout => "pairing_timeout",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ConnectFailed(_) => "connect_failed",
            Self::TeardownFailed(_) => "teardown_failed",
            Self::StoreCorrupted { .. } => "store_corrupted",
            Self::Store(_) => "store_failed",
        }
    }
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Messaging client is not connected")]
    NotConnected,

    #[error("Field '{field}' is required")]
    InvalidInput { field: &'static str },

    #[error("Invalid recipient '{input}': no digits to address")]
    InvalidRecipient { input: String },

    #[error("Lookup failed: {0}")]
    LookupFailed(RemoteError),

    #[error("Send failed after {attempts} attempts: {last_error}")]
    SendFailed { attempts: u32, last_error: RemoteError },
}

impl GatewayError {
    /// Stable status string for external callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::InvalidInput { .. } => "invalid_input",
            Self::InvalidRecipient { .. } => "invalid_recipient",
            Self::LookupFailed(_) => "lookup_failed",
            Self::SendFailed { .. } => "send_failed",
        }
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    StartupFailed {
        addr: std::net::SocketAddr,
        reason: String,
    },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
