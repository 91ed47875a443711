//! Background tunnel start-up
//!
//! Resolution and binding run on a runtime worker so the caller's thread never
//! blocks on them. The started tunnel is handed over through a
//! [`PendingTunnel`]; if the requester gave up in the meantime, the background
//! task closes the tunnel itself so that nothing is left listening.

use crate::error::TunnelError;
use crate::handle::TunnelHandle;
use crate::options::TunnelOptions;
use crate::tunnel::Tunnel;
use pskgate_config::{TunnelConfig, TunnelDescriptor};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub struct TunnelLauncher;

impl TunnelLauncher {
    /// Start the tunnel on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: TunnelConfig, options: TunnelOptions) -> PendingTunnel {
        let (result_tx, result_rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = Tunnel::start_with_options(config, options).await;
            if let Err(unclaimed) = result_tx.send(result) {
                match unclaimed {
                    Ok(handle) => {
                        warn!(
                            "Tunnel on {} started after its requester went away, closing it",
                            handle.local_addr()
                        );
                        handle.shutdown().await;
                    }
                    Err(e) => debug!("Dropping start-up error nobody is waiting for: {}", e),
                }
            }
        });

        PendingTunnel { result_rx }
    }

    /// Validate a raw descriptor, then start the tunnel on a background task.
    ///
    /// Validation happens synchronously; an invalid descriptor is rejected
    /// before any task is spawned or socket opened.
    pub fn spawn_descriptor(
        descriptor: TunnelDescriptor,
        options: TunnelOptions,
    ) -> Result<PendingTunnel, TunnelError> {
        let config = descriptor.into_config()?;
        Ok(Self::spawn(config, options))
    }
}

/// A tunnel that is still starting.
///
/// Dropping this (or calling [`cancel`](Self::cancel)) before the tunnel is
/// up makes the background task close it once it finishes starting.
pub struct PendingTunnel {
    result_rx: oneshot::Receiver<Result<TunnelHandle, TunnelError>>,
}

impl PendingTunnel {
    /// Wait for start-up to finish and take ownership of the tunnel
    pub async fn wait(self) -> Result<TunnelHandle, TunnelError> {
        self.result_rx.await.map_err(|_| TunnelError::Aborted)?
    }

    /// Give up on the tunnel; it is closed as soon as it has started
    pub fn cancel(self) {
        drop(self);
    }
}
