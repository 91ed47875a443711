//! Operational knobs that are not part of the tunnel descriptor

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// Timeouts and resolution settings for a tunnel
#[derive(Debug, Clone)]
pub struct TunnelOptions {
    /// Upper bound for resolving and connecting to the remote host
    pub connect_timeout: Duration,

    /// Upper bound for the PSK handshake once TCP is connected
    pub handshake_timeout: Duration,

    /// How many times to try binding the local port before giving up.
    /// Only `AddrInUse` is retried, with a one second pause.
    pub bind_attempts: u32,

    /// Resolve the remote host once during start and fail early if it does
    /// not resolve. Off by default: the remote is otherwise only contacted
    /// when a local client connects.
    pub verify_remote: bool,

    /// Fixed addresses for host names, consulted before DNS
    pub host_overrides: HashMap<String, IpAddr>,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            bind_attempts: 1,
            verify_remote: false,
            host_overrides: HashMap::new(),
        }
    }
}

impl TunnelOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_bind_attempts(mut self, attempts: u32) -> Self {
        self.bind_attempts = attempts.max(1);
        self
    }

    pub fn with_verify_remote(mut self, verify: bool) -> Self {
        self.verify_remote = verify;
        self
    }

    /// Resolve `host` to `addr` without asking DNS
    pub fn with_host_override(mut self, host: impl Into<String>, addr: IpAddr) -> Self {
        self.host_overrides.insert(host.into(), addr);
        self
    }
}
