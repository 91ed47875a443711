//! Tunnel start-up and accept loop

use crate::error::TunnelError;
use crate::handle::TunnelHandle;
use crate::options::TunnelOptions;
use crate::psk::PskConnector;
use crate::relay::{RelaySession, SessionIdGenerator};
use crate::remote::RemoteEndpoint;
use crate::stats::Counters;
use pskgate_config::TunnelConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept`, so that e.g. fd exhaustion does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Entry point for starting forwarding tunnels
pub struct Tunnel;

impl Tunnel {
    /// Start a tunnel with default options
    pub async fn start(config: TunnelConfig) -> Result<TunnelHandle, TunnelError> {
        Self::start_with_options(config, TunnelOptions::default()).await
    }

    /// Bind the loopback listener and start accepting connections.
    ///
    /// On error nothing is left running and the local port is free again.
    pub async fn start_with_options(
        config: TunnelConfig,
        options: TunnelOptions,
    ) -> Result<TunnelHandle, TunnelError> {
        let connector = PskConnector::new(config.psk())?;
        let remote = Arc::new(RemoteEndpoint::new(
            config.remote_host(),
            config.remote_port(),
            options.host_overrides.clone(),
        ));

        if options.verify_remote {
            let addrs = remote
                .resolve()
                .await
                .map_err(|source| TunnelError::Resolve {
                    host: remote.host().to_string(),
                    source,
                })?;
            debug!("Remote {} resolves to {:?}", remote.authority(), addrs);
        }

        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.local_port()));
        let listener = bind_with_retry(bind_addr, options.bind_attempts).await?;
        let local_addr = listener.local_addr()?;

        info!(
            "Tunnel listening on {} -> {} (PSK identity {})",
            local_addr,
            remote.authority(),
            config.psk().identity()
        );

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let counters = Arc::new(Counters::default());

        let accept_loop = AcceptLoop {
            listener,
            remote,
            connector,
            options,
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
            counters: counters.clone(),
            session_ids: SessionIdGenerator::new(),
        };
        tracker.spawn(accept_loop.run());

        Ok(TunnelHandle::new(local_addr, shutdown, tracker, counters))
    }
}

async fn bind_with_retry(bind_addr: SocketAddr, attempts: u32) -> Result<TcpListener, TunnelError> {
    let attempts = attempts.max(1);
    let bind_error = |source: std::io::Error| TunnelError::Bind {
        address: bind_addr.ip().to_string(),
        port: bind_addr.port(),
        source,
    };

    for attempt in 1..=attempts {
        match TcpListener::bind(bind_addr).await {
            Ok(listener) => {
                if attempt > 1 {
                    info!(
                        "Successfully bound to {} on attempt {}/{}",
                        bind_addr, attempt, attempts
                    );
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempt < attempts => {
                warn!(
                    "Port {} is in use (attempt {}/{}), retrying in 1 second...",
                    bind_addr.port(),
                    attempt,
                    attempts
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(bind_error(e)),
        }
    }

    Err(bind_error(std::io::Error::from(
        std::io::ErrorKind::AddrInUse,
    )))
}

struct AcceptLoop {
    listener: TcpListener,
    remote: Arc<RemoteEndpoint>,
    connector: PskConnector,
    options: TunnelOptions,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Arc<Counters>,
    session_ids: SessionIdGenerator,
}

impl AcceptLoop {
    async fn run(self) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((local, peer)) => {
                    let _ = local.set_nodelay(true);
                    let session = RelaySession {
                        id: self.session_ids.generate(),
                        peer,
                        local,
                        remote: self.remote.clone(),
                        connector: self.connector.clone(),
                        connect_timeout: self.options.connect_timeout,
                        handshake_timeout: self.options.handshake_timeout,
                        counters: self.counters.clone(),
                        active: self.counters.session_started(),
                    };
                    debug!(session = session.id, %peer, "Accepted local connection");

                    self.tracker.spawn(session.run(self.shutdown.clone()));
                }
                Err(e) => {
                    error!("Failed to accept local connection: {}", e);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        debug!(
            "Accept loop stopped, releasing listener on {:?}",
            self.listener.local_addr().ok()
        );
    }
}
