// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{instrument, trace};

use crate::error::{Result, RuntimeError};

/// A nullary action. Identity is not observable; ordering in a queue is
/// FIFO.
pub type Command = Box<dyn FnOnce() + Send + 'static>;

/// A reusable action, invoked possibly more than once (the timer thread
/// re-invokes a recurring event's action at each tick).
pub type Action = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct CommandQueueConfig {
    /// `None` means unbounded.
    pub max_depth: Option<usize>,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        CommandQueueConfig { max_depth: None }
    }
}

struct Inner {
    queue: VecDeque<Command>,
    running: bool,
}

/// A single-consumer, many-producer blocking FIFO of commands.
///
/// Commands enqueued before a [`stop`](CommandQueue::stop) may or may not
/// run — the queue drains opportunistically — but after `stop` no further
/// commands are admitted.
pub struct CommandQueue {
    name: String,
    state: Mutex<Inner>,
    not_empty: Condvar,
    max_depth: Option<usize>,
}

impl CommandQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CommandQueueConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CommandQueueConfig) -> Self {
        CommandQueue {
            name: name.into(),
            state: Mutex::new(Inner { queue: VecDeque::new(), running: true }),
            not_empty: Condvar::new(),
            max_depth: config.max_depth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a command and wakes a waiting consumer.
    #[instrument(name = "command_queue::enqueue", level = "trace", skip(self, command))]
    pub fn enqueue(&self, command: Command) -> Result<()> {
        let mut state = self.state.lock();
        if !state.running {
            // Usage error: enqueue after stop. No-op per the idempotent
            // lifecycle policy.
            return Ok(());
        }
        if let Some(max_depth) = self.max_depth {
            if state.queue.len() >= max_depth {
                return Err(RuntimeError::queue_full(&self.name, max_depth));
            }
        }
        state.queue.push_back(command);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks while empty and running; returns `None` once stopped and
    /// drained.
    fn dequeue(&self) -> Option<Command> {
        let mut state = self.state.lock();
        loop {
            if let Some(command) = state.queue.pop_front() {
                return Some(command);
            }
            if !state.running {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Dequeues and invokes the next command. Returns `false` once the queue
    /// is stopped and drained.
    ///
    /// A panicking command is caught at this boundary, logged at `error`
    /// level, and the loop continues with the next command — otherwise one
    /// bad callback would terminate the worker thread for good.
    #[instrument(name = "command_queue::execute_next", level = "trace", skip(self))]
    pub fn execute_next(&self) -> bool {
        match self.dequeue() {
            Some(command) => {
                trace!(queue = %self.name, "executing command");
                if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(command)) {
                    let message = panic_message(&payload);
                    tracing::error!(queue = %self.name, %message, "command panicked, worker continuing");
                }
                true
            }
            None => false,
        }
    }

    /// Loops `execute_next` until it returns `false`.
    pub fn run(&self) {
        while self.execute_next() {}
    }

    /// Marks the queue non-running and wakes all waiters. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.not_empty.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_is_preserved() {
        let queue = Arc::new(CommandQueue::new("test"));
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let order = order.clone();
            queue.enqueue(Box::new(move || order.lock().push(i))).unwrap();
        }
        for _ in 0..10 {
            assert!(queue.execute_next());
        }
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_command_does_not_stop_the_worker() {
        let queue = Arc::new(CommandQueue::new("test"));
        let after = Arc::new(AtomicUsize::new(0));
        queue.enqueue(Box::new(|| panic!("boom"))).unwrap();
        let after2 = after.clone();
        queue.enqueue(Box::new(move || { after2.fetch_add(1, Ordering::SeqCst); })).unwrap();

        assert!(queue.execute_next());
        assert!(queue.execute_next());
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_drains_remaining_then_returns_false() {
        let queue = Arc::new(CommandQueue::new("test"));
        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let executed = executed.clone();
            queue.enqueue(Box::new(move || { executed.fetch_add(1, Ordering::SeqCst); })).unwrap();
        }
        queue.stop();
        assert!(!queue.enqueue(Box::new(|| {})).is_err());
        while queue.execute_next() {}
        assert_eq!(executed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn enqueue_after_stop_is_a_no_op() {
        let queue = CommandQueue::new("test");
        queue.stop();
        let executed = Arc::new(AtomicUsize::new(0));
        let executed2 = executed.clone();
        queue.enqueue(Box::new(move || { executed2.fetch_add(1, Ordering::SeqCst); })).unwrap();
        assert!(!queue.execute_next());
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queue_full_is_reported() {
        let queue = CommandQueue::with_config("bounded", CommandQueueConfig { max_depth: Some(1) });
        queue.enqueue(Box::new(|| {})).unwrap();
        let err = queue.enqueue(Box::new(|| {})).unwrap_err();
        match err {
            RuntimeError::QueueFull { max_depth, .. } => assert_eq!(max_depth, 1),
        }
    }

    #[test]
    fn blocking_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(CommandQueue::new("test"));
        let worker_queue = queue.clone();
        let handle = thread::spawn(move || worker_queue.execute_next());
        thread::sleep(Duration::from_millis(20));
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        queue.enqueue(Box::new(move || { ran2.fetch_add(1, Ordering::SeqCst); })).unwrap();
        assert!(handle.join().unwrap());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_wakes_blocked_consumer() {
        let queue = Arc::new(CommandQueue::new("test"));
        let worker_queue = queue.clone();
        let handle = thread::spawn(move || worker_queue.execute_next());
        thread::sleep(Duration::from_millis(20));
        queue.stop();
        assert!(!handle.join().unwrap());
    }
}
