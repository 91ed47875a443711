//! PSK-TLS forwarding tunnel
//!
//! Listens on `127.0.0.1:<local_port>` and, for every accepted connection,
//! opens a fresh TLS 1.2 session authenticated only by a pre-shared key to the
//! configured remote endpoint, then relays bytes in both directions until the
//! connection finishes.
//!
//! The remote side is only contacted when a local client connects, so a
//! running tunnel holds no upstream connection while idle.
//!
//! ```ignore
//! use pskgate_config::TunnelDescriptor;
//! use pskgate_tunnel::Tunnel;
//!
//! let config = TunnelDescriptor::from_path("config/redirect.json")?.into_config()?;
//! let handle = Tunnel::start(config).await?;
//! println!("dashboard available at {}", handle.local_url());
//!
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! ```
//!
//! Only configuration and bind failures are reported to the caller. Failures
//! inside a single connection (unreachable remote, key mismatch, I/O errors)
//! are logged and close that connection only.

mod error;
mod handle;
mod launcher;
mod options;
mod psk;
mod relay;
mod remote;
mod stats;
mod tunnel;

pub use error::{SessionError, TunnelError};
pub use handle::TunnelHandle;
pub use launcher::{PendingTunnel, TunnelLauncher};
pub use options::TunnelOptions;
pub use stats::TunnelStats;
pub use tunnel::Tunnel;

pub use pskgate_config::{PresharedKey, TunnelConfig};
