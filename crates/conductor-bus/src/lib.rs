// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

//! Topic-matched publish/subscribe bus, request/reply, and time-window
//! batching wrappers, composed atop `conductor-core` and
//! `conductor-scheduler`.

mod batch;
mod message_bus;
mod process_bus;
mod registry;
mod request_reply;

pub use batch::{BatchConfig, BatchSubscriber, KeyedBatchSubscriber};
pub use message_bus::MessageBus;
pub use process_bus::{ProcessBus, QueueFullEvent, QueueFullListener};
pub use registry::{OnMessage, SubscriberRegistry, SubscriptionId};
pub use request_reply::RequestReply;

pub use conductor_core::{Command, MessageHeader, Result, RuntimeError, Topic, TopicMatcher, TransferEnvelope};
pub use conductor_scheduler::{ProcessThread, ProcessThreadConfig, TimerControl, TimerThread};
