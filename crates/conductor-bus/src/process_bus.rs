// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;

use conductor_core::{MessageHeader, Result, RuntimeError, Topic, TopicMatcher, TransferEnvelope};
use conductor_scheduler::{ProcessThread, ProcessThreadConfig, TimerControl, TimerThread};
use parking_lot::Mutex;
use tracing::{instrument, warn};

use crate::batch::{BatchConfig, BatchSubscriber, KeyedBatchSubscriber};
use crate::message_bus::MessageBus;
use crate::registry::{OnMessage, SubscriberRegistry, SubscriptionId};
use crate::request_reply::RequestReply;

/// Notification delivered when an adapter's enqueue onto a subscriber's
/// process thread raised `QueueFull` — so one slow subscriber cannot break a
/// publish.
#[derive(Debug, Clone)]
pub struct QueueFullEvent {
    pub error: RuntimeError,
    pub header: MessageHeader,
}

pub type QueueFullListener = Arc<dyn Fn(&QueueFullEvent) + Send + Sync>;

struct RegistryMatcher(Weak<Inner>);

impl TopicMatcher for RegistryMatcher {
    fn is_match(&self, topic: &Topic) -> bool {
        match self.0.upgrade() {
            Some(inner) => inner.registry.has_match(topic),
            None => false,
        }
    }
}

struct Inner {
    process: Arc<ProcessThread>,
    bus: Arc<MessageBus>,
    registry: SubscriberRegistry,
    bus_subscription: Mutex<Option<SubscriptionId>>,
    queue_full_listeners: Mutex<Vec<QueueFullListener>>,
}

/// Per-context façade: bound to one [`ProcessThread`] and composed with one
/// [`MessageBus`]. On `start`, registers itself as a single subscriber of
/// the bus (via a `Weak` back-reference, so a dropped `ProcessBus` can be
/// collected without an explicit unsubscribe); on `stop`, unregisters.
#[derive(Clone)]
pub struct ProcessBus(Arc<Inner>);

impl ProcessBus {
    pub fn new(name: impl Into<String>, timer: Arc<TimerThread>, bus: Arc<MessageBus>) -> Self {
        Self::with_config(name, timer, bus, ProcessThreadConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        timer: Arc<TimerThread>,
        bus: Arc<MessageBus>,
        config: ProcessThreadConfig,
    ) -> Self {
        ProcessBus(Arc::new(Inner {
            process: ProcessThread::with_config(name, timer, config),
            bus,
            registry: SubscriberRegistry::new(),
            bus_subscription: Mutex::new(None),
            queue_full_listeners: Mutex::new(Vec::new()),
        }))
    }

    #[instrument(name = "process_bus::start", level = "info", skip(self))]
    pub fn start(&self) {
        self.0.process.start();
        let weak = Arc::downgrade(&self.0);
        let on_message: Arc<dyn OnMessage> = Arc::new(move |envelope: &TransferEnvelope| {
            if let Some(inner) = weak.upgrade() {
                inner.registry.publish(envelope);
            }
        });
        let matcher: Arc<dyn TopicMatcher> = Arc::new(RegistryMatcher(Arc::downgrade(&self.0)));
        let id = self.0.bus.subscribe(matcher, on_message);
        *self.0.bus_subscription.lock() = Some(id);
    }

    pub fn stop(&self) {
        if let Some(id) = self.0.bus_subscription.lock().take() {
            self.0.bus.unsubscribe(id);
        }
        self.0.process.stop();
    }

    pub fn join(&self) {
        self.0.process.join();
    }

    pub fn enqueue(&self, command: conductor_core::Command) -> Result<()> {
        self.0.process.enqueue(command)
    }

    pub fn schedule(&self, action: impl Fn() + Send + Sync + 'static, delay: Duration) -> TimerControl {
        self.0.process.schedule(action, delay)
    }

    pub fn schedule_on_interval(
        &self,
        action: impl Fn() + Send + Sync + 'static,
        first_delay: Duration,
        interval: Duration,
    ) -> TimerControl {
        self.0.process.schedule_on_interval(action, first_delay, interval)
    }

    pub fn create_unique_topic(&self) -> Topic {
        Topic::unique()
    }

    /// Registers a topic subscription whose `on_message` is an adapter:
    /// when invoked on the bus thread, it builds a command
    /// `() -> handler(header, data)` and enqueues it onto this context's
    /// process thread; if that enqueue raises `QueueFull`, a
    /// [`QueueFullEvent`] is emitted instead.
    pub fn subscribe<T, F>(&self, matcher: Arc<dyn TopicMatcher>, handler: F) -> SubscriptionId
    where
        T: Any + Send + Sync + 'static,
        F: Fn(&MessageHeader, &T) + Send + Sync + 'static,
    {
        let process = self.0.process.clone();
        let this = self.clone();
        let handler = Arc::new(handler);
        let on_message: Arc<dyn OnMessage> = Arc::new(move |envelope: &TransferEnvelope| {
            let envelope = envelope.clone();
            let handler = handler.clone();
            let this = this.clone();
            let process = process.clone();
            let command: conductor_core::Command = Box::new(move || {
                if let Some(typed) = envelope.downcast_ref::<T>() {
                    handler(envelope.header(), typed);
                }
            });
            if let Err(error) = process.enqueue(command) {
                this.emit_queue_full(error, envelope.header().clone());
            }
        });
        self.0.registry.subscribe(matcher, on_message)
    }

    pub fn subscribe_batch<T, F>(
        &self,
        matcher: Arc<dyn TopicMatcher>,
        config: BatchConfig,
        handler: F,
    ) -> SubscriptionId
    where
        T: Any + Send + Sync + Clone + 'static,
        F: Fn(Vec<(MessageHeader, T)>) + Send + Sync + 'static,
    {
        let batch = BatchSubscriber::new(self.0.process.clone(), config, handler);
        self.subscribe::<T, _>(matcher, move |header: &MessageHeader, value: &T| {
            batch.receive(header.clone(), value.clone());
        })
    }

    pub fn subscribe_keyed_batch<T, K, F>(
        &self,
        matcher: Arc<dyn TopicMatcher>,
        config: BatchConfig,
        key_of: impl Fn(&MessageHeader, &T) -> K + Send + Sync + 'static,
        handler: F,
    ) -> SubscriptionId
    where
        T: Any + Send + Sync + Clone + 'static,
        K: Eq + std::hash::Hash + Send + 'static,
        F: Fn(std::collections::HashMap<K, (MessageHeader, T)>) + Send + Sync + 'static,
    {
        let batch = KeyedBatchSubscriber::new(self.0.process.clone(), config, handler);
        self.subscribe::<T, _>(matcher, move |header: &MessageHeader, value: &T| {
            let key = key_of(header, value);
            batch.receive(key, header.clone(), value.clone());
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.0.registry.unsubscribe(id);
    }

    pub fn publish<T: Any + Send + Sync + 'static>(
        &self,
        topic: Topic,
        message: T,
        reply_to: Option<Topic>,
    ) -> Result<()> {
        let header = MessageHeader::new(topic, reply_to);
        self.0.bus.publish(TransferEnvelope::new(header, message))
    }

    /// Creates a unique reply topic, installs a one-shot subscription on
    /// it, publishes `message` on `topic` with that reply topic attached,
    /// and returns a handle that completes exactly once with the first
    /// reply envelope.
    pub fn send_request<Req, Res>(&self, topic: Topic, message: Req) -> RequestReply<Res>
    where
        Req: Any + Send + Sync + 'static,
        Res: Any + Send + Sync + Clone + 'static,
    {
        let reply_topic = self.create_unique_topic();
        let reply = RequestReply::<Res>::new();

        let sub_id_cell: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let sub_id_cell2 = sub_id_cell.clone();
        let sink = reply.sink();
        let this = self.clone();
        let matcher: Arc<dyn TopicMatcher> = Arc::new(reply_topic.clone());
        let sub_id = self.subscribe::<Res, _>(matcher, move |_header, value: &Res| {
            sink.complete(value.clone());
            if let Some(id) = sub_id_cell2.lock().take() {
                this.unsubscribe(id);
            }
        });
        *sub_id_cell.lock() = Some(sub_id);

        let this2 = self.clone();
        reply.set_unsubscribe(move || this2.unsubscribe(sub_id));

        if let Err(error) = self.publish(topic, message, Some(reply_topic.clone())) {
            self.emit_queue_full(error, MessageHeader::new(reply_topic, None));
        }
        reply
    }

    pub fn add_queue_full_listener(&self, listener: QueueFullListener) {
        self.0.queue_full_listeners.lock().push(listener);
    }

    pub fn remove_all_queue_full_listeners(&self) {
        self.0.queue_full_listeners.lock().clear();
    }

    fn emit_queue_full(&self, error: RuntimeError, header: MessageHeader) {
        warn!(topic = header.topic().as_str(), %error, "queue full delivering message");
        let event = QueueFullEvent { error, header };
        let listeners = self.0.queue_full_listeners.lock().clone();
        for listener in listeners.iter() {
            listener(&event);
        }
    }
}
