// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use conductor_core::{Action, Command, CommandQueue, CommandQueueConfig, Result};
use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::timer::{TimerControl, TimerThread};

#[derive(Debug, Clone, Default)]
pub struct ProcessThreadConfig {
    pub queue: CommandQueueConfig,
}

/// Owns a [`CommandQueue`] and a dedicated worker thread; delegates
/// scheduling to a shared [`TimerThread`].
pub struct ProcessThread {
    name: String,
    queue: Arc<CommandQueue>,
    timer: Arc<TimerThread>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessThread {
    pub fn new(name: impl Into<String>, timer: Arc<TimerThread>) -> Arc<Self> {
        Self::with_config(name, timer, ProcessThreadConfig::default())
    }

    pub fn with_config(name: impl Into<String>, timer: Arc<TimerThread>, config: ProcessThreadConfig) -> Arc<Self> {
        let name = name.into();
        Arc::new(ProcessThread {
            queue: Arc::new(CommandQueue::with_config(name.clone(), config.queue)),
            name,
            timer,
            worker: Mutex::new(None),
        })
    }

    /// Launches the worker running the queue loop. Idempotent.
    #[instrument(name = "process_thread::start", level = "info", skip(self))]
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        info!(thread = %self.name, "process thread starting");
        let queue = self.queue.clone();
        *worker = Some(thread::spawn(move || queue.run()));
    }

    /// Halts the queue. Idempotent.
    pub fn stop(&self) {
        info!(thread = %self.name, "process thread stopping");
        self.queue.stop();
    }

    /// Waits for the worker to exit.
    pub fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn enqueue(&self, command: Command) -> Result<()> {
        self.queue.enqueue(command)
    }

    pub fn schedule(&self, action: impl Fn() + Send + Sync + 'static, delay: Duration) -> TimerControl {
        self.schedule_action(Arc::new(action), delay)
    }

    pub fn schedule_action(&self, action: Action, delay: Duration) -> TimerControl {
        self.timer.schedule(self.queue.clone(), action, delay)
    }

    pub fn schedule_on_interval(
        &self,
        action: impl Fn() + Send + Sync + 'static,
        first_delay: Duration,
        interval: Duration,
    ) -> TimerControl {
        self.timer.schedule_on_interval(self.queue.clone(), Arc::new(action), first_delay, interval)
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
