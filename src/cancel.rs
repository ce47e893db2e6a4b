//! Shared cancellation signal
//!
//! A `CancelToken` is a one-shot broadcast: it starts open and is closed at
//! most once. Closing drops the only `Sender` of an internal channel, so every
//! clone's `done()` receiver becomes disconnected and any `select!` waiting on
//! it wakes immediately. Closing never blocks and is safe to race.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    closed: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

/// Cooperative cancellation signal shared by walkers, pools and uploads
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                closed: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                done: rx,
            }),
        }
    }

    /// Close the signal. Returns true only for the call that closed it.
    pub fn cancel(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        drop(self.inner.trigger.lock().take());
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Receiver that never yields a value and disconnects once cancelled.
    ///
    /// Use as a `recv(token.done())` arm in `crossbeam_channel::select!`.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{never, select};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = thread::spawn(move || {
            let never_rx = never::<()>();
            select! {
                recv(waiter.done()) -> _ => true,
                recv(never_rx) -> _ => false,
            }
        });

        thread::sleep(Duration::from_millis(20));
        assert!(token.cancel());
        assert!(handle.join().unwrap());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_open_token_does_not_fire() {
        let token = CancelToken::new();
        assert!(token
            .done()
            .recv_timeout(Duration::from_millis(20))
            .unwrap_err()
            .is_timeout());
    }

    #[test]
    fn test_concurrent_cancel_is_idempotent() {
        let token = CancelToken::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = token.clone();
                thread::spawn(move || t.cancel())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(token.is_cancelled());
        assert!(!token.cancel());
    }
}
