//! Bounded byte ring between the engine tick and the output callback.
//!
//! The live backend uses [`ByteRing`] as the hand-off point:
//! - the game tick pushes one mixed period per flush (non-blocking)
//! - the stream callback drains whatever is available (non-blocking)
//!
//! Pushes are all-or-nothing: a period either fits completely or the ring
//! reports "busy" and the caller retries next tick. That keeps the engine
//! side free of partial-write bookkeeping and the callback side free of
//! torn frames.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Thread-safe bounded FIFO of raw PCM bytes.
///
/// A single [`Condvar`] acts as a general "state changed" signal; the
/// `closed` flag lives under the same mutex as the queue so shutdown can
/// never race a push.
pub struct ByteRing {
    inner: Mutex<RingInner>,
    cv: Condvar,
    capacity: usize,
}

struct RingInner {
    buf: VecDeque<u8>,
    closed: bool,
}

impl ByteRing {
    /// Create a ring holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity,
        }
    }

    /// Maximum bytes the ring can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently buffered bytes (best-effort snapshot).
    pub fn len(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the ring has been closed.
    ///
    /// A closed ring rejects pushes but may still be drained.
    pub fn is_closed(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.closed
    }

    /// Mark the ring closed and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Push `bytes` if the ring has room for all of them.
    ///
    /// Returns `false` without queuing anything when the ring is closed
    /// or when fewer than `bytes.len()` bytes are vacant. Never blocks.
    pub fn push(&self, bytes: &[u8]) -> bool {
        let mut g = self.inner.lock().unwrap();
        if g.closed || self.capacity - g.buf.len() < bytes.len() {
            return false;
        }
        g.buf.extend(bytes.iter().copied());
        drop(g);
        self.cv.notify_all();
        true
    }

    /// Move up to `out.len()` bytes into `out`, returning how many moved.
    ///
    /// Never blocks; the output callback fills any shortfall with silence.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        let mut g = self.inner.lock().unwrap();
        let take = out.len().min(g.buf.len());
        for slot in out.iter_mut().take(take) {
            *slot = g.buf.pop_front().unwrap_or(0);
        }
        drop(g);
        if take > 0 {
            self.cv.notify_all();
        }
        take
    }

    /// Block until the ring drains or `timeout` elapses.
    ///
    /// Returns `true` if the ring was empty when the wait ended.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        loop {
            if g.buf.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, (deadline - now).min(Duration::from_millis(50)))
                .unwrap();
            g = ng;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_within_capacity_succeeds() {
        let ring = ByteRing::new(8);
        assert!(ring.push(&[1, 2, 3, 4]));
        assert_eq!(ring.len(), 4);
        assert!(ring.push(&[5, 6, 7, 8]));
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn push_is_all_or_nothing() {
        let ring = ByteRing::new(4);
        assert!(ring.push(&[1, 2, 3]));
        assert!(!ring.push(&[4, 5]));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn pop_into_moves_fifo_order() {
        let ring = ByteRing::new(8);
        ring.push(&[10, 20, 30, 40]);

        let mut out = [0u8; 3];
        assert_eq!(ring.pop_into(&mut out), 3);
        assert_eq!(out, [10, 20, 30]);

        let mut rest = [0u8; 4];
        assert_eq!(ring.pop_into(&mut rest), 1);
        assert_eq!(rest[0], 40);
    }

    #[test]
    fn pop_into_empty_returns_zero() {
        let ring = ByteRing::new(8);
        let mut out = [0u8; 4];
        assert_eq!(ring.pop_into(&mut out), 0);
    }

    #[test]
    fn closed_ring_rejects_pushes_but_drains() {
        let ring = ByteRing::new(8);
        ring.push(&[1, 2]);
        ring.close();
        assert!(ring.is_closed());
        assert!(!ring.push(&[3]));

        let mut out = [0u8; 2];
        assert_eq!(ring.pop_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn wait_empty_returns_immediately_when_empty() {
        let ring = ByteRing::new(8);
        assert!(ring.wait_empty(Duration::from_millis(10)));
    }

    #[test]
    fn wait_empty_times_out_with_stuck_data() {
        let ring = ByteRing::new(8);
        ring.push(&[1]);
        assert!(!ring.wait_empty(Duration::from_millis(20)));
    }

    #[test]
    fn wait_empty_sees_concurrent_drain() {
        let ring = Arc::new(ByteRing::new(8));
        ring.push(&[1, 2, 3]);

        let drainer = ring.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut out = [0u8; 3];
            drainer.pop_into(&mut out);
        });

        assert!(ring.wait_empty(Duration::from_secs(1)));
        handle.join().unwrap();
    }
}
