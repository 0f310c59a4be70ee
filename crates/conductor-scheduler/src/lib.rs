// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

//! Process thread and shared timer scheduler for the conductor runtime.

mod process_thread;
mod timer;

pub use process_thread::{ProcessThread, ProcessThreadConfig};
pub use timer::{TimerControl, TimerThread};
