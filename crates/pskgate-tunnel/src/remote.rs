//! Remote endpoint resolution and TCP connect

use crate::error::SessionError;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct RemoteEndpoint {
    host: String,
    port: u16,
    overrides: HashMap<String, IpAddr>,
}

impl RemoteEndpoint {
    pub fn new(host: &str, port: u16, overrides: HashMap<String, IpAddr>) -> Self {
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Self {
            host,
            port,
            overrides,
        }
    }

    /// Host name as presented during the handshake
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]:{}", self.host, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    pub async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        if let Some(ip) = self.overrides.get(&self.host) {
            return Ok(vec![SocketAddr::new(*ip, self.port)]);
        }
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, self.port)]);
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", self.host),
            ));
        }
        Ok(addrs)
    }

    /// Resolve and connect within `timeout`
    pub async fn connect(&self, timeout: Duration) -> Result<TcpStream, SessionError> {
        tokio::time::timeout(timeout, self.connect_any())
            .await
            .map_err(|_| SessionError::ConnectTimeout {
                address: self.authority(),
                timeout,
            })?
    }

    /// Try each resolved address in turn, keeping the last error
    async fn connect_any(&self) -> Result<TcpStream, SessionError> {
        let addrs = self
            .resolve()
            .await
            .map_err(|source| SessionError::Resolve {
                host: self.host.clone(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!("Connected to {} ({})", self.authority(), addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(SessionError::Connect {
            address: self.authority(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")),
        })
    }
}
