//! Validated tunnel configuration

use crate::ConfigError;
use std::fmt;
use std::ops::Range;

/// Remote port used when the descriptor does not name one
pub const DEFAULT_REMOTE_PORT: u16 = 443;

/// Range a random local port is drawn from when none is configured
pub const RANDOM_LOCAL_PORTS: Range<u16> = 10000..65535;

/// Pre-shared key presented during the TLS handshake
#[derive(Clone, PartialEq, Eq)]
pub struct PresharedKey {
    identity: String,
    secret: String,
}

impl PresharedKey {
    pub fn new(
        identity: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let identity = identity.into();
        let secret = secret.into();

        if identity.is_empty() {
            return Err(ConfigError::EmptyField("preSharedKey.identity"));
        }
        if secret.is_empty() {
            return Err(ConfigError::EmptyField("preSharedKey.key"));
        }

        Ok(Self { identity, secret })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

// Keep the secret out of logs.
impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Immutable configuration of one forwarding tunnel
///
/// Both ports are non-zero, the remote host is non-empty and the pre-shared
/// key carries a non-empty identity and secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    local_port: u16,
    remote_host: String,
    remote_port: u16,
    psk: PresharedKey,
}

impl TunnelConfig {
    pub fn new(
        local_port: u16,
        remote_host: impl Into<String>,
        remote_port: u16,
        psk: PresharedKey,
    ) -> Result<Self, ConfigError> {
        let remote_host = remote_host.into();

        if local_port == 0 {
            return Err(ConfigError::PortOutOfRange {
                field: "localPort",
                value: 0,
            });
        }
        if remote_port == 0 {
            return Err(ConfigError::PortOutOfRange {
                field: "remotePort",
                value: 0,
            });
        }
        if remote_host.is_empty() {
            return Err(ConfigError::EmptyField("remoteAddress"));
        }

        Ok(Self {
            local_port,
            remote_host,
            remote_port,
            psk,
        })
    }

    /// Loopback port the tunnel listens on
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn psk(&self) -> &PresharedKey {
        &self.psk
    }

    /// `host:port` of the remote endpoint, bracketing IPv6 literals
    pub fn remote_authority(&self) -> String {
        if self.remote_host.contains(':') && !self.remote_host.starts_with('[') {
            format!("[{}]:{}", self.remote_host, self.remote_port)
        } else {
            format!("{}:{}", self.remote_host, self.remote_port)
        }
    }
}
