//! Owner handle of a running tunnel

use crate::stats::{Counters, TunnelStats};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// A running tunnel.
///
/// There is exactly one owner; the handle is not `Clone`. Dropping it closes
/// the tunnel. [`close`](Self::close) may be called from any thread, any
/// number of times, and never blocks or fails.
pub struct TunnelHandle {
    local_addr: SocketAddr,
    closed: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl TunnelHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        shutdown: CancellationToken,
        tracker: TaskTracker,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            local_addr,
            closed: AtomicBool::new(false),
            shutdown,
            tracker,
            counters,
        }
    }

    /// Address of the loopback listener
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Plain HTTP URL a browser should be pointed at
    pub fn local_url(&self) -> String {
        format!("http://localhost:{}", self.local_addr.port())
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting and interrupt every live session.
    ///
    /// Sockets are released asynchronously; await
    /// [`wait_closed`](Self::wait_closed) to know when that has happened.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(
            "Closing tunnel on {} ({} active sessions)",
            self.local_addr,
            self.counters.active()
        );
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Resolves once the accept loop and all sessions have exited.
    ///
    /// Only completes after [`close`](Self::close) has been called.
    pub async fn wait_closed(&self) {
        self.tracker.wait().await;
    }

    /// Close and wait until every socket is released
    pub async fn shutdown(self) {
        self.close();
        self.wait_closed().await;
    }

    /// Number of relay sessions currently alive
    pub fn active_sessions(&self) -> usize {
        self.counters.active()
    }

    pub fn stats(&self) -> TunnelStats {
        self.counters.snapshot()
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("local_addr", &self.local_addr)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle_handle() -> (TunnelHandle, CancellationToken) {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let token = shutdown.clone();
        tracker.spawn(async move { token.cancelled().await });

        let handle = TunnelHandle::new(
            "127.0.0.1:18080".parse().unwrap(),
            shutdown.clone(),
            tracker,
            Arc::new(Counters::default()),
        );
        (handle, shutdown)
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (handle, shutdown) = idle_handle();
        assert!(handle.is_open());
        assert_eq!(handle.local_url(), "http://localhost:18080");

        handle.close();
        handle.close();

        assert!(!handle.is_open());
        assert!(shutdown.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), handle.wait_closed())
            .await
            .expect("tasks did not stop");
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (handle, shutdown) = idle_handle();
        drop(handle);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_close_from_threads() {
        let (handle, shutdown) = idle_handle();
        let handle = Arc::new(handle);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    let _ = handle.is_open();
                    handle.close();
                    assert!(!handle.is_open());
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(shutdown.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), handle.wait_closed())
            .await
            .expect("tasks did not stop");
    }
}
