// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::sync::Arc;

use conductor_core::{Result, Topic, TopicMatcher, TransferEnvelope};
use conductor_scheduler::{ProcessThread, TimerThread};
use tracing::instrument;

use crate::registry::{OnMessage, SubscriberRegistry, SubscriptionId};

/// Process-wide fan-out of envelopes to all registered subscribers, running
/// on its own dedicated thread (the "bus thread"). This single-threaded
/// dispatch is load-bearing for publish-order guarantees and must not be
/// parallelised.
pub struct MessageBus {
    bus_thread: Arc<ProcessThread>,
    registry: Arc<SubscriberRegistry>,
}

impl MessageBus {
    pub fn new(timer: Arc<TimerThread>) -> Arc<Self> {
        Arc::new(MessageBus {
            bus_thread: ProcessThread::new("message-bus", timer),
            registry: Arc::new(SubscriberRegistry::new()),
        })
    }

    pub fn start(&self) {
        self.bus_thread.start();
    }

    pub fn stop(&self) {
        self.bus_thread.stop();
    }

    pub fn join(&self) {
        self.bus_thread.join();
    }

    /// Enqueues a command that calls `registry.publish(envelope)` on the
    /// bus thread, giving every subscriber a consistent publish order.
    #[instrument(name = "message_bus::publish", level = "trace", skip(self, envelope))]
    pub fn publish(&self, envelope: TransferEnvelope) -> Result<()> {
        let registry = self.registry.clone();
        self.bus_thread.enqueue(Box::new(move || {
            registry.publish(&envelope);
        }))
    }

    pub fn subscribe(&self, matcher: Arc<dyn TopicMatcher>, on_message: Arc<dyn OnMessage>) -> SubscriptionId {
        self.registry.subscribe(matcher, on_message)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unsubscribe(id);
    }

    pub fn has_match(&self, topic: &Topic) -> bool {
        self.registry.has_match(topic)
    }
}
