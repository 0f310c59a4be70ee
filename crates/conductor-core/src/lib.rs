// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

//! Data model and serial command queue underlying the conductor runtime.

mod command;
mod envelope;
mod error;

pub use command::{Action, Command, CommandQueue, CommandQueueConfig};
pub use envelope::{MessageHeader, Topic, TopicMatcher, TransferEnvelope};
pub use error::{Result, RuntimeError};
