// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use thiserror::Error;

/// The only domain error surfaced by the conductor runtime.
///
/// Usage errors (enqueue-after-stop, double-stop) are deliberately not
/// represented here: they are no-ops per the queue's idempotent lifecycle.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("command queue '{queue}' is full (max depth {max_depth})")]
    QueueFull { queue: String, max_depth: usize },
}

impl RuntimeError {
    pub fn queue_full(queue: impl Into<String>, max_depth: usize) -> Self {
        RuntimeError::QueueFull { queue: queue.into(), max_depth }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
