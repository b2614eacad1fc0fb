//! Publisher
//!
//! Turns a leaf value into an outbound message and hands it to the broker
//! session. Publishing is fire-and-forget: the session accepts the message
//! for delivery and nothing awaits an acknowledgement. A submission error
//! is reported to the caller, which treats it as loss of the session.

use bytes::Bytes;
use rumqttc::QoS;

use crate::topic::TopicMapper;

/// One message bound for the broker. Created per leaf read and consumed
/// immediately by the session, never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// Publish error: the session refused the submission.
#[derive(Debug)]
pub struct PublishError {
    topic: String,
    reason: String,
}

impl PublishError {
    pub fn new(topic: &str, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish to '{}' failed: {}", self.topic, self.reason)
    }
}

impl std::error::Error for PublishError {}

/// Submission side of a broker session.
pub trait MessageSink {
    fn submit(&self, message: OutboundMessage) -> Result<(), PublishError>;
}

/// Builds outbound messages for leaf values and submits them.
pub struct Publisher<S> {
    sink: S,
    mapper: TopicMapper,
    qos: QoS,
    retain: bool,
}

impl<S: MessageSink> Publisher<S> {
    pub fn new(sink: S, mapper: TopicMapper, qos: QoS, retain: bool) -> Self {
        Self {
            sink,
            mapper,
            qos,
            retain,
        }
    }

    /// Publish one leaf value under the topic derived from its path.
    pub fn publish(&self, path: &str, value: &str) -> Result<(), PublishError> {
        self.sink.submit(OutboundMessage {
            topic: self.mapper.to_topic(path),
            payload: Bytes::copy_from_slice(value.as_bytes()),
            qos: self.qos,
            retain: self.retain,
        })
    }
}
