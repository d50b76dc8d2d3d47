//! Per-request fetch event.
//!
//! A [`FetchEvent`] travels alongside each request. Besides basic request
//! metadata it lets a stage hand off work that should outlive the pipeline
//! call (for example flushing an audit record) through
//! [`FetchEvent::wait_until`]. The server drains that work after the
//! response has been produced.

use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Metadata and background-work tracker for a single request.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    inner: Arc<EventInner>,
}

#[derive(Debug)]
struct EventInner {
    received_at: Instant,
    remote_addr: Option<SocketAddr>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl FetchEvent {
    /// Creates an event for a request with no known peer address.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an event for a request received from `remote_addr`.
    #[must_use]
    pub fn from_peer(remote_addr: SocketAddr) -> Self {
        Self::build(Some(remote_addr))
    }

    fn build(remote_addr: Option<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                received_at: Instant::now(),
                remote_addr,
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Returns the time since the request was received.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.received_at.elapsed()
    }

    /// Schedules background work tied to this request.
    ///
    /// The future is spawned on the current tokio runtime immediately.
    /// This is an extension point for custom stages: the standard stages
    /// schedule nothing, and the server drains whatever is scheduled here.
    pub fn wait_until<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.inner.pending.lock().push(handle);
    }

    /// Number of background tasks not yet drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Waits for all work scheduled through [`wait_until`](Self::wait_until).
    pub async fn drain(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.inner.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task of request failed");
            }
        }
    }
}

impl Default for FetchEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_peer_address() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(FetchEvent::from_peer(addr).remote_addr(), Some(addr));
        assert!(FetchEvent::new().remote_addr().is_none());
    }

    #[tokio::test]
    async fn test_wait_until_and_drain() {
        let event = FetchEvent::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            event.wait_until(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(event.pending(), 3);

        event.drain().await;
        assert_eq!(event.pending(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_clones_share_pending_work() {
        let event = FetchEvent::new();
        let clone = event.clone();
        clone.wait_until(async {});
        assert_eq!(event.pending(), 1);
        event.drain().await;
        assert_eq!(clone.pending(), 0);
    }
}
