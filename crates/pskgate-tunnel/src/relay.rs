//! Per-connection relay session
//!
//! Each accepted local connection gets its own remote TCP connection and PSK
//! handshake. Bytes are then copied in both directions; end-of-stream on one
//! side half-closes the other side and the opposite direction keeps flowing
//! until it finishes too.

use crate::error::SessionError;
use crate::psk::PskConnector;
use crate::remote::RemoteEndpoint;
use crate::stats::{ActiveSession, Counters};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RELAY_BUFFER_SIZE: usize = 8192;

/// Session ID generator for logging
#[derive(Clone)]
pub(crate) struct SessionIdGenerator {
    next_session_id: Arc<AtomicU64>,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self {
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn generate(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::SeqCst)
    }
}

pub(crate) struct RelaySession {
    pub id: u64,
    pub peer: SocketAddr,
    pub local: TcpStream,
    pub remote: Arc<RemoteEndpoint>,
    pub connector: PskConnector,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub counters: Arc<Counters>,
    pub active: ActiveSession,
}

impl RelaySession {
    /// Run the session until it finishes on its own or `shutdown` fires.
    ///
    /// Either way both sockets are closed when this returns.
    pub async fn run(self, shutdown: CancellationToken) {
        let id = self.id;
        let peer = self.peer;
        let counters = self.counters.clone();
        let started = Instant::now();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(session = id, %peer, "Session interrupted by tunnel shutdown");
            }
            result = self.relay() => {
                match result {
                    Ok((to_remote, to_local)) => {
                        info!(
                            session = id,
                            %peer,
                            bytes_to_remote = to_remote,
                            bytes_to_local = to_local,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Relay session finished"
                        );
                    }
                    Err(e) if e.is_handshake_failure() => {
                        counters.handshake_failed();
                        warn!(session = id, %peer, "Closing local connection: {}", e);
                    }
                    Err(e) => {
                        debug!(session = id, %peer, "Relay session aborted: {}", e);
                    }
                }
            }
        }
    }

    async fn relay(self) -> Result<(u64, u64), SessionError> {
        let RelaySession {
            id,
            mut local,
            remote,
            connector,
            connect_timeout,
            handshake_timeout,
            counters,
            active: _active,
            ..
        } = self;

        // The remote side is only contacted now that a client is waiting
        let tcp = remote.connect(connect_timeout).await?;
        let _ = tcp.set_nodelay(true);

        let address = remote.authority();
        let tls = tokio::time::timeout(
            handshake_timeout,
            connector.handshake(remote.host(), &address, tcp),
        )
        .await
        .map_err(|_| SessionError::HandshakeTimeout {
            address: address.clone(),
            timeout: handshake_timeout,
        })??;

        debug!(
            session = id,
            remote = %address,
            cipher = tls.ssl().current_cipher().map(|c| c.name()).unwrap_or("unknown"),
            "PSK handshake complete"
        );

        let (mut local_read, mut local_write) = local.split();
        let (mut tls_read, mut tls_write) = tokio::io::split(tls);

        let to_remote = pump(&mut local_read, &mut tls_write, |n| counters.sent_to_remote(n));
        let to_local = pump(&mut tls_read, &mut local_write, |n| counters.sent_to_local(n));

        // Each direction ends on its own EOF; an error in either ends both
        let (to_remote, to_local) = tokio::try_join!(to_remote, to_local)?;
        Ok((to_remote, to_local))
    }
}

/// Copy `reader` into `writer` until EOF, then shut down `writer`.
///
/// `on_chunk` sees every chunk once it has been written, so counters stay
/// accurate for sessions that end in an error or are interrupted.
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    on_chunk: impl Fn(u64),
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        on_chunk(n as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pump_counts_chunks_and_half_closes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let counted = std::sync::atomic::AtomicU64::new(0);

        client.write_all(b"hello relay").await.unwrap();
        client.shutdown().await.unwrap();

        let mut sink = Vec::new();
        let total = pump(&mut server, &mut sink, |n| {
            counted.fetch_add(n, Ordering::Relaxed);
        })
        .await
        .unwrap();

        assert_eq!(total, 11);
        assert_eq!(counted.load(Ordering::Relaxed), 11);
        assert_eq!(sink, b"hello relay");
    }

    #[test]
    fn test_session_id_generator() {
        let gen = SessionIdGenerator::new();
        assert_eq!(gen.generate(), 1);

        let shared = gen.clone();
        assert_eq!(shared.generate(), 2);
        assert_eq!(gen.generate(), 3);
    }
}
