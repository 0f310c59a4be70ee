// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use conductor_core::MessageHeader;
use conductor_scheduler::ProcessThread;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub min_batch_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { min_batch_interval: Duration::from_millis(50) }
    }
}

struct BatchState<T> {
    pending: Vec<(MessageHeader, T)>,
    flush_scheduled: bool,
}

/// Collects `(header, data)` pairs within a time window, then delivers them
/// as a list, in original order, to the wrapped handler. At most one flush
/// is scheduled at a time; if a flush schedule would land while the
/// previous flush is still queued, the new items simply await the next
/// window.
pub struct BatchSubscriber<T> {
    process: Arc<ProcessThread>,
    config: BatchConfig,
    state: Mutex<BatchState<T>>,
    handler: Box<dyn Fn(Vec<(MessageHeader, T)>) + Send + Sync>,
}

impl<T: Send + 'static> BatchSubscriber<T> {
    pub fn new(
        process: Arc<ProcessThread>,
        config: BatchConfig,
        handler: impl Fn(Vec<(MessageHeader, T)>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(BatchSubscriber {
            process,
            config,
            state: Mutex::new(BatchState { pending: Vec::new(), flush_scheduled: false }),
            handler: Box::new(handler),
        })
    }

    pub fn receive(self: &Arc<Self>, header: MessageHeader, data: T) {
        let mut state = self.state.lock();
        state.pending.push((header, data));
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let this = self.clone();
            self.process.schedule(move || this.flush(), self.config.min_batch_interval);
        }
    }

    fn flush(self: &Arc<Self>) {
        let items = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            std::mem::take(&mut state.pending)
        };
        if items.is_empty() {
            return;
        }
        debug!(count = items.len(), "flushing batch");
        (self.handler)(items);
    }
}

struct KeyedBatchState<K, T> {
    pending: HashMap<K, (MessageHeader, T)>,
    flush_scheduled: bool,
}

/// As [`BatchSubscriber`], but collects a `key -> (header, data)` mapping,
/// replacing any prior entry for the same key within a window
/// (last-write-wins), and delivers the collected mapping.
pub struct KeyedBatchSubscriber<K, T> {
    process: Arc<ProcessThread>,
    config: BatchConfig,
    state: Mutex<KeyedBatchState<K, T>>,
    handler: Box<dyn Fn(HashMap<K, (MessageHeader, T)>) + Send + Sync>,
}

impl<K: Eq + Hash + Send + 'static, T: Send + 'static> KeyedBatchSubscriber<K, T> {
    pub fn new(
        process: Arc<ProcessThread>,
        config: BatchConfig,
        handler: impl Fn(HashMap<K, (MessageHeader, T)>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(KeyedBatchSubscriber {
            process,
            config,
            state: Mutex::new(KeyedBatchState { pending: HashMap::new(), flush_scheduled: false }),
            handler: Box::new(handler),
        })
    }

    pub fn receive(self: &Arc<Self>, key: K, header: MessageHeader, data: T) {
        let mut state = self.state.lock();
        state.pending.insert(key, (header, data));
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let this = self.clone();
            self.process.schedule(move || this.flush(), self.config.min_batch_interval);
        }
    }

    fn flush(self: &Arc<Self>) {
        let items = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            std::mem::take(&mut state.pending)
        };
        if items.is_empty() {
            return;
        }
        debug!(count = items.len(), "flushing keyed batch");
        (self.handler)(items);
    }
}
