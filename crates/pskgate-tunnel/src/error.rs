use pskgate_config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors reported to whoever asked for the tunnel
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Invalid tunnel configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Failed to resolve remote host {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    #[error("Failed to bind to {address}: {source}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different local port")]
    Bind {
        address: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tunnel startup ended before reporting a result")]
    Aborted,
}

impl TunnelError {
    pub fn is_config_invalid(&self) -> bool {
        matches!(self, TunnelError::Config(_))
    }

    pub fn is_bind_failure(&self) -> bool {
        matches!(self, TunnelError::Bind { .. })
    }
}

impl From<openssl::error::ErrorStack> for TunnelError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        TunnelError::Tls(err.to_string())
    }
}

/// Failure of a single relay session
///
/// These never leave the tunnel; they are logged and the session is torn down.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("Connecting to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("TLS handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("TLS handshake with {address} timed out after {timeout:?}")]
    HandshakeTimeout { address: String, timeout: Duration },

    #[error("Relay I/O error: {0}")]
    Relay(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the session ended before the TLS session was established
    pub fn is_handshake_failure(&self) -> bool {
        !matches!(self, SessionError::Relay(_))
    }
}
