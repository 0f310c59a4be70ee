// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conductor_core::{Topic, TopicMatcher, TransferEnvelope};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Invoked with the envelope that matched a subscription's topic matcher.
pub trait OnMessage: Send + Sync {
    fn call(&self, envelope: &TransferEnvelope);
}

impl<F> OnMessage for F
where
    F: Fn(&TransferEnvelope) + Send + Sync,
{
    fn call(&self, envelope: &TransferEnvelope) {
        self(envelope)
    }
}

struct Subscription {
    matcher: Arc<dyn TopicMatcher>,
    on_message: Arc<dyn OnMessage>,
}

/// A thread-safe collection of topic subscribers, guarded by a lock-striped
/// concurrent map rather than a single mutex (the spec permits either,
/// provided a subscriber never synchronously mutates the registry from its
/// own `on_message`).
#[derive(Default)]
pub struct SubscriberRegistry {
    subs: DashMap<u64, Subscription>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        SubscriberRegistry { subs: DashMap::new(), next_id: AtomicU64::new(0) }
    }

    pub fn subscribe(&self, matcher: Arc<dyn TopicMatcher>, on_message: Arc<dyn OnMessage>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs.insert(id, Subscription { matcher, on_message });
        debug!(subscription = id, "subscribed");
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subs.remove(&id.0);
        debug!(subscription = id.0, "unsubscribed");
    }

    /// `true` if at least one subscriber's matcher accepts `topic`, without
    /// invoking anything. Used to decide whether a published envelope is
    /// worth handing off to a context at all.
    pub fn has_match(&self, topic: &Topic) -> bool {
        self.subs.iter().any(|entry| entry.value().matcher.is_match(topic))
    }

    /// Invokes `on_message` for every subscriber whose matcher accepts the
    /// envelope's topic. Returns `true` if at least one subscriber matched.
    pub fn publish(&self, envelope: &TransferEnvelope) -> bool {
        let mut matched = false;
        for entry in self.subs.iter() {
            let subscription = entry.value();
            if subscription.matcher.is_match(envelope.header().topic()) {
                matched = true;
                subscription.on_message.call(envelope);
            }
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }
}
