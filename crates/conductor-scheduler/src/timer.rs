// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use conductor_core::{Action, Command, CommandQueue};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, instrument, trace, warn};

/// A cancellation handle for a scheduled event. `cancel()` is idempotent and
/// safe to call from any thread.
#[derive(Clone)]
pub struct TimerControl {
    canceled: Arc<AtomicBool>,
}

impl TimerControl {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

struct PendingEvent {
    expiration: i64,
    target: Arc<CommandQueue>,
    action: Action,
    canceled: Arc<AtomicBool>,
    /// `None` for a one-shot `SingleEvent`; `Some(interval)` for a
    /// `RecurringEvent`.
    recur: Option<Duration>,
}

impl PendingEvent {
    /// Runs this event's action (unless cancelled) and returns a successor
    /// for recurring events, or `None` for one-shot events and cancelled
    /// recurring events (a cancelled recurring chain is simply not
    /// re-armed — there is no way to un-cancel it).
    fn execute(self, now: i64) -> Option<PendingEvent> {
        if self.canceled.load(Ordering::SeqCst) {
            return None;
        }
        let action = self.action.clone();
        let command: Command = Box::new(move || action());
        if let Err(error) = self.target.enqueue(command) {
            // Policy contract: the timer is not backpressure-aware. The
            // error is swallowed here; ProcessBus provides the
            // QueueFullEvent pathway on the publish side instead.
            warn!(queue = self.target.name(), %error, "timer target queue full, event dropped");
        }
        self.recur.map(|interval| PendingEvent {
            expiration: now + interval.as_millis() as i64,
            target: self.target,
            action: self.action,
            canceled: self.canceled,
            recur: self.recur,
        })
    }
}

struct State {
    index: BTreeMap<i64, VecDeque<PendingEvent>>,
    stopped: bool,
}

struct Inner {
    state: Mutex<State>,
    condvar: Condvar,
    epoch: Instant,
}

impl Inner {
    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    fn insert(&self, event: PendingEvent) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.index.entry(event.expiration).or_default().push_back(event);
        self.condvar.notify_all();
    }
}

/// One scheduler per runtime: owns the timer index and a monotonic
/// millisecond clock started at zero at construction. Arms exactly one
/// timed wait at a time for the earliest future expiration.
pub struct TimerThread {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    /// Starts the worker thread eagerly (see Design Notes: eager start is
    /// equivalent to lazy start and simpler to reason about at shutdown).
    pub fn start() -> Arc<Self> {
        let inner = Arc::new(Inner {
            state: Mutex::new(State { index: BTreeMap::new(), stopped: false }),
            condvar: Condvar::new(),
            epoch: Instant::now(),
        });
        let worker_inner = inner.clone();
        let handle = thread::spawn(move || Self::run(worker_inner));
        Arc::new(TimerThread { inner, worker: Mutex::new(Some(handle)) })
    }

    #[instrument(name = "timer_thread::schedule", level = "debug", skip(self, target, action))]
    pub fn schedule(&self, target: Arc<CommandQueue>, action: Action, delay: Duration) -> TimerControl {
        let canceled = Arc::new(AtomicBool::new(false));
        let expiration = self.inner.now_ms() + delay.as_millis() as i64;
        self.inner.insert(PendingEvent { expiration, target, action, canceled: canceled.clone(), recur: None });
        TimerControl { canceled }
    }

    #[instrument(name = "timer_thread::schedule_on_interval", level = "debug", skip(self, target, action))]
    pub fn schedule_on_interval(
        &self,
        target: Arc<CommandQueue>,
        action: Action,
        first_delay: Duration,
        interval: Duration,
    ) -> TimerControl {
        let canceled = Arc::new(AtomicBool::new(false));
        let expiration = self.inner.now_ms() + first_delay.as_millis() as i64;
        self.inner.insert(PendingEvent {
            expiration,
            target,
            action,
            canceled: canceled.clone(),
            recur: Some(interval),
        });
        TimerControl { canceled }
    }

    /// Freezes scheduling: in-flight expirations complete, but no new wait
    /// is armed.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.stopped = true;
        self.inner.condvar.notify_all();
    }

    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().index.values().map(VecDeque::len).sum()
    }

    fn run(inner: Arc<Inner>) {
        loop {
            let expired = {
                let mut state = inner.state.lock();
                loop {
                    if state.stopped {
                        return;
                    }
                    let now = inner.now_ms();
                    let expired_keys: Vec<i64> = state.index.range(..=now).map(|(k, _)| *k).collect();
                    if !expired_keys.is_empty() {
                        let mut expired = Vec::new();
                        for key in expired_keys {
                            if let Some(events) = state.index.remove(&key) {
                                expired.extend(events);
                            }
                        }
                        break expired;
                    }
                    match state.index.keys().next().copied() {
                        Some(next) => {
                            let wait_ms = (next - now).max(0) as u64;
                            inner.condvar.wait_for(&mut state, Duration::from_millis(wait_ms));
                        }
                        None => {
                            inner.condvar.wait(&mut state);
                        }
                    }
                }
            };
            trace!(count = expired.len(), "timer thread waking for expired events");
            for event in expired {
                let now = inner.now_ms();
                if let Some(successor) = event.execute(now) {
                    inner.insert(successor);
                }
            }
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        debug!("timer thread dropped");
    }
}
