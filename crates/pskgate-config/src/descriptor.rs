//! JSON tunnel descriptor
//!
//! The on-disk format mirrors what the dashboard app ships with:
//!
//! ```json
//! {
//!   "localPort": 8123,
//!   "remoteAddress": "home.example.com",
//!   "remotePort": 443,
//!   "preSharedKey": { "identity": "phone", "key": "..." }
//! }
//! ```

use crate::config::{PresharedKey, TunnelConfig, DEFAULT_REMOTE_PORT, RANDOM_LOCAL_PORTS};
use crate::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Where the descriptor is looked up when no path is given
pub const DEFAULT_DESCRIPTOR_PATH: &str = "config/redirect.json";

const MAX_PORT: i64 = 65535;

/// Raw, unvalidated tunnel descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<PresharedKeyDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresharedKeyDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl TunnelDescriptor {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&contents)
    }

    /// Check that every required value is present and looks usable.
    ///
    /// Non-positive ports are accepted here; they select the defaults in
    /// [`TunnelDescriptor::into_config`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(self.remote_address.as_deref(), "remoteAddress")?;

        let psk = self
            .pre_shared_key
            .as_ref()
            .ok_or(ConfigError::MissingField("preSharedKey"))?;
        require_non_empty(psk.identity.as_deref(), "preSharedKey.identity")?;
        require_non_empty(psk.key.as_deref(), "preSharedKey.key")?;

        check_port_upper_bound(self.local_port, "localPort")?;
        check_port_upper_bound(self.remote_port, "remotePort")?;

        Ok(())
    }

    /// Validate and resolve into a [`TunnelConfig`], drawing a random local
    /// port from the thread RNG when none is configured.
    pub fn into_config(self) -> Result<TunnelConfig, ConfigError> {
        self.into_config_with_rng(&mut rand::thread_rng())
    }

    pub fn into_config_with_rng<R: Rng + ?Sized>(
        self,
        rng: &mut R,
    ) -> Result<TunnelConfig, ConfigError> {
        self.validate()?;

        let local_port = match self.local_port {
            Some(port) if port > 0 => port as u16,
            _ => {
                let port = rng.gen_range(RANDOM_LOCAL_PORTS);
                info!(
                    local_port = port,
                    "Choosing a random local port. Consider a fixed local port, \
                     otherwise the browser cannot remember credentials for the dashboard"
                );
                port
            }
        };

        let remote_port = match self.remote_port {
            Some(port) if port > 0 => port as u16,
            _ => {
                info!("No remote port given, connecting to {}", DEFAULT_REMOTE_PORT);
                DEFAULT_REMOTE_PORT
            }
        };

        // validate() guarantees these are present
        let psk = self
            .pre_shared_key
            .ok_or(ConfigError::MissingField("preSharedKey"))?;
        let psk = PresharedKey::new(
            psk.identity
                .ok_or(ConfigError::MissingField("preSharedKey.identity"))?,
            psk.key.ok_or(ConfigError::MissingField("preSharedKey.key"))?,
        )?;
        let remote_address = self
            .remote_address
            .ok_or(ConfigError::MissingField("remoteAddress"))?;

        TunnelConfig::new(local_port, remote_address, remote_port, psk)
    }
}

fn require_non_empty(value: Option<&str>, field: &'static str) -> Result<(), ConfigError> {
    match value {
        None => Err(ConfigError::MissingField(field)),
        Some("") => Err(ConfigError::EmptyField(field)),
        Some(_) => Ok(()),
    }
}

fn check_port_upper_bound(port: Option<i64>, field: &'static str) -> Result<(), ConfigError> {
    match port {
        Some(value) if value > MAX_PORT => Err(ConfigError::PortOutOfRange { field, value }),
        _ => Ok(()),
    }
}
