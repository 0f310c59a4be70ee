// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// An opaque topic identity. Two topics are equal iff they were constructed
/// from the same name, or are the same unique topic.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Topic(name.into())
    }

    /// A topic value distinct from every other such value, suitable for a
    /// one-shot reply correlator.
    pub fn unique() -> Self {
        Topic(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.0.as_ref()).finish()
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Topic::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Topic::new(value)
    }
}

/// Immutable header carried by every envelope: its topic and, optionally,
/// the topic a reply should be published on.
#[derive(Debug, Clone)]
pub struct MessageHeader {
    topic: Topic,
    reply_to: Option<Topic>,
}

impl MessageHeader {
    pub fn new(topic: Topic, reply_to: Option<Topic>) -> Self {
        MessageHeader { topic, reply_to }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn reply_to(&self) -> Option<&Topic> {
        self.reply_to.as_ref()
    }
}

struct EnvelopeInner {
    header: MessageHeader,
    message: Box<dyn Any + Send + Sync>,
}

/// A header plus a type-erased payload. Immutable once constructed; cheap to
/// clone (an `Arc` clone) so the same envelope can be handed to many
/// subscribers without requiring the payload type to implement `Clone`.
#[derive(Clone)]
pub struct TransferEnvelope(Arc<EnvelopeInner>);

impl TransferEnvelope {
    pub fn new<T: Any + Send + Sync + 'static>(header: MessageHeader, message: T) -> Self {
        TransferEnvelope(Arc::new(EnvelopeInner { header, message: Box::new(message) }))
    }

    pub fn header(&self) -> &MessageHeader {
        &self.0.header
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.message.downcast_ref::<T>()
    }
}

impl fmt::Debug for TransferEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEnvelope").field("header", &self.0.header).finish_non_exhaustive()
    }
}

/// A predicate over header topics. Pure, side-effect free, safely callable
/// from the bus thread.
pub trait TopicMatcher: Send + Sync {
    fn is_match(&self, topic: &Topic) -> bool;
}

impl TopicMatcher for Topic {
    fn is_match(&self, topic: &Topic) -> bool {
        self == topic
    }
}

impl<F> TopicMatcher for F
where
    F: Fn(&Topic) -> bool + Send + Sync,
{
    fn is_match(&self, topic: &Topic) -> bool {
        self(topic)
    }
}
