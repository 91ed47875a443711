use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time counters of a running tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    /// Local connections accepted since start
    pub accepted: u64,
    /// Relay sessions currently alive
    pub active: usize,
    /// Sessions that never got a TLS session up
    pub failed_handshakes: u64,
    pub bytes_to_remote: u64,
    pub bytes_to_local: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    accepted: AtomicU64,
    active: AtomicUsize,
    failed_handshakes: AtomicU64,
    bytes_to_remote: AtomicU64,
    bytes_to_local: AtomicU64,
}

impl Counters {
    /// Count an accepted connection; the session stays active until the
    /// returned guard is dropped
    pub fn session_started(self: &Arc<Self>) -> ActiveSession {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        ActiveSession {
            counters: self.clone(),
        }
    }

    pub fn handshake_failed(&self) {
        self.failed_handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_to_remote(&self, bytes: u64) {
        self.bytes_to_remote.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn sent_to_local(&self, bytes: u64) {
        self.bytes_to_local.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TunnelStats {
        TunnelStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            failed_handshakes: self.failed_handshakes.load(Ordering::Relaxed),
            bytes_to_remote: self.bytes_to_remote.load(Ordering::Relaxed),
            bytes_to_local: self.bytes_to_local.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct ActiveSession {
    counters: Arc<Counters>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_gauge_follows_guard() {
        let counters = Arc::new(Counters::default());

        let first = counters.session_started();
        let second = counters.session_started();
        assert_eq!(counters.active(), 2);

        drop(first);
        assert_eq!(counters.active(), 1);
        drop(second);

        let stats = counters.snapshot();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn test_byte_and_failure_counters() {
        let counters = Counters::default();
        counters.sent_to_remote(10);
        counters.sent_to_local(20);
        counters.sent_to_remote(1);
        counters.sent_to_local(2);
        counters.handshake_failed();

        let stats = counters.snapshot();
        assert_eq!(stats.bytes_to_remote, 11);
        assert_eq!(stats.bytes_to_local, 22);
        assert_eq!(stats.failed_handshakes, 1);
    }
}
