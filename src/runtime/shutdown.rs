//! Cooperative shutdown signalling.
//!
//! Shutdown requests arrive from two directions: POSIX signals delivered
//! through the registered signal source, and programmatic requests from
//! another thread. Both set a shared flag the event loop checks at the top
//! of every iteration; the waker makes sure a loop blocked in poll wakes
//! up to notice.

use mio::Waker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Handle for requesting an event loop shutdown from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>, waker: Arc<Waker>) -> Self {
        Self { flag, waker }
    }

    /// Ask the event loop to stop. Safe to call more than once.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll, Token};
    use std::time::Duration;

    fn handle_with_poll() -> (ShutdownHandle, Poll) {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        let handle = ShutdownHandle::new(Arc::new(AtomicBool::new(false)), waker);
        (handle, poll)
    }

    #[test]
    fn test_request_sets_flag() {
        let (handle, _poll) = handle_with_poll();
        assert!(!handle.is_requested());
        handle.request();
        assert!(handle.is_requested());
    }

    #[test]
    fn test_request_wakes_poll() {
        let (handle, mut poll) = handle_with_poll();
        handle.request();

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(1))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(0)));
    }

    #[test]
    fn test_request_is_idempotent() {
        let (handle, _poll) = handle_with_poll();
        handle.request();
        handle.request();
        assert!(handle.is_requested());
    }

    #[test]
    fn test_clones_share_flag() {
        let (handle, _poll) = handle_with_poll();
        let other = handle.clone();
        other.request();
        assert!(handle.is_requested());
    }
}
