//! Tunnel configuration
//!
//! Parses the JSON tunnel descriptor, applies port defaults and validates the
//! result into an immutable [`TunnelConfig`]. Validation is synchronous and
//! happens before any network activity; a [`TunnelConfig`] that exists is
//! always valid.
//!
//! ```ignore
//! use pskgate_config::TunnelDescriptor;
//!
//! let config = TunnelDescriptor::from_path("config/redirect.json")?.into_config()?;
//! println!("forwarding 127.0.0.1:{} -> {}", config.local_port(), config.remote_authority());
//! ```

mod config;
mod descriptor;
mod error;

pub use config::{PresharedKey, TunnelConfig, DEFAULT_REMOTE_PORT, RANDOM_LOCAL_PORTS};
pub use descriptor::{PresharedKeyDescriptor, TunnelDescriptor, DEFAULT_DESCRIPTOR_PATH};
pub use error::ConfigError;
