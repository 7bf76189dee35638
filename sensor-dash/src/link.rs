//! Broker-facing seam of the subscriber.
//!
//! The MQTT event loop's callbacks (CONNACK, SUBACK, PUBLISH, DISCONNECT) are
//! flattened into [`BrokerEvent`]s so the connection lifecycle can be driven by
//! a real `rumqttc` client or by the devkit mock broker.

use crate::error::{ConnectionError, SubscriptionError};
use rumqttc::QoS;
use std::future::Future;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: OffsetDateTime,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, received_at: OffsetDateTime) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Session established; subscriptions from any earlier session are gone.
    Connected,
    SubscribeAck { granted: usize, rejected: usize },
    Message(InboundMessage),
    /// Broker closed the session in an orderly way.
    Disconnected,
}

pub trait BrokerLink: Send {
    /// Queues one subscribe request covering every topic.
    fn subscribe_all(
        &mut self,
        topics: &[String],
        qos: QoS,
    ) -> impl Future<Output = Result<(), SubscriptionError>> + Send;

    /// Waits for the next event. After an `Err` the next call attempts to reconnect.
    fn next_event(&mut self) -> impl Future<Output = Result<BrokerEvent, ConnectionError>> + Send;
}
