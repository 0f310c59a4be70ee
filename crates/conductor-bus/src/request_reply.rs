// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    value: Mutex<Option<T>>,
    condvar: Condvar,
    completed: AtomicBool,
    unsubscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Ephemeral correlator for a single request/reply exchange. Completes
/// exactly once, with the first matching reply; terminal after that first
/// reply or an explicit [`cancel`](RequestReply::cancel).
pub struct RequestReply<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestReply<T> {
    fn clone(&self) -> Self {
        RequestReply { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static> RequestReply<T> {
    pub(crate) fn new() -> Self {
        RequestReply {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                condvar: Condvar::new(),
                completed: AtomicBool::new(false),
                unsubscribe: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_unsubscribe(&self, unsubscribe: impl FnOnce() + Send + 'static) {
        *self.inner.unsubscribe.lock() = Some(Box::new(unsubscribe));
    }

    /// A handle the subscription's `on_message` adapter can hold without
    /// keeping this `RequestReply` alive. Using a strong clone there would
    /// mean the caller's handle is never "the last" `Arc`, so drop-driven
    /// auto-cancel would never fire while the server never replies.
    pub(crate) fn sink(&self) -> ReplySink<T> {
        ReplySink { inner: Arc::downgrade(&self.inner) }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Cancels the underlying subscription. Idempotent.
    pub fn cancel(&self) {
        if let Some(unsubscribe) = self.inner.unsubscribe.lock().take() {
            unsubscribe();
        }
    }
}

impl<T: Send + Clone + 'static> RequestReply<T> {
    /// Blocks the calling thread for up to `timeout` waiting for the first
    /// reply. Returns `None` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        let mut value = self.inner.value.lock();
        while value.is_none() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.inner.condvar.wait_for(&mut value, remaining);
        }
        value.clone()
    }
}

impl<T> Drop for RequestReply<T> {
    fn drop(&mut self) {
        // Only the last handle's drop matters; cancel is idempotent and a
        // no-op if already cancelled or never subscribed. The subscription
        // side only ever holds a `ReplySink` (a `Weak`), never a strong
        // clone, so this count reflects callers' handles alone.
        if Arc::strong_count(&self.inner) == 1 {
            self.cancel();
        }
    }
}

/// A weak reference to a [`RequestReply`]'s completion slot, held by the
/// one-shot subscription adapter. Completing through a dropped (disposed)
/// `RequestReply` is a no-op rather than reviving it.
pub(crate) struct ReplySink<T> {
    inner: Weak<Inner<T>>,
}

impl<T: Send + 'static> ReplySink<T> {
    /// Completes the slot with `value` unless it is already completed or
    /// the owning `RequestReply` has been dropped. Safe to call more than
    /// once (e.g. a racing duplicate reply); only the first call has any
    /// effect.
    pub(crate) fn complete(&self, value: T) {
        let Some(inner) = self.inner.upgrade() else { return };
        if inner.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        *inner.value.lock() = Some(value);
        inner.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dropping_the_last_handle_runs_unsubscribe_even_with_a_live_sink() {
        let reply = RequestReply::<u32>::new();
        let sink = reply.sink();
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let unsubscribed2 = unsubscribed.clone();
        reply.set_unsubscribe(move || { unsubscribed2.fetch_add(1, Ordering::SeqCst); });

        drop(reply);

        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
        // The subscription adapter's sink outlives the handle; completing
        // through it is a no-op rather than reviving the dropped slot.
        sink.complete(7);
    }

    #[test]
    fn completing_through_the_sink_does_not_keep_the_handle_alive() {
        let reply = RequestReply::<u32>::new();
        let sink = reply.sink();
        sink.complete(7);
        assert_eq!(reply.recv_timeout(Duration::from_millis(50)), Some(7));
        assert_eq!(Arc::strong_count(&reply.inner), 1);
    }
}
