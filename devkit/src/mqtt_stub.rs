/*!
Mock MQTT broker for dashboard tests without a running broker.

[`MockBroker`] is the subscriber's side (implements `BrokerLink`),
[`BrokerHandle`] is the test's side: open/drop sessions, publish, inspect
subscriptions. Like a clean-session broker, every disconnect forgets all
subscriptions and publishes only reach topics subscribed in the current session.
*/

use parking_lot::Mutex;
use rumqttc::{ConnectReturnCode, QoS};
use sensor_dash::error::{ConnectionError, SubscriptionError};
use sensor_dash::link::{BrokerEvent, BrokerLink, InboundMessage};
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::debug;

type Delivery = Result<BrokerEvent, ConnectionError>;

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    sessions: u32,
    subscriptions: HashSet<String>,
    subscribe_requests: Vec<Vec<String>>,
    rejected_topics: HashSet<String>,
    last_qos: Option<QoS>,
}

/// Subscriber side of the mock.
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
    events: mpsc::UnboundedReceiver<Delivery>,
    acks: mpsc::UnboundedSender<Delivery>,
}

/// Test side of the mock. Cheap to clone.
#[derive(Clone)]
pub struct BrokerHandle {
    state: Arc<Mutex<BrokerState>>,
    events: mpsc::UnboundedSender<Delivery>,
}

pub fn mock_broker() -> (MockBroker, BrokerHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(BrokerState::default()));
    (
        MockBroker {
            state: state.clone(),
            events: rx,
            acks: tx.clone(),
        },
        BrokerHandle { state, events: tx },
    )
}

impl BrokerLink for MockBroker {
    async fn subscribe_all(&mut self, topics: &[String], qos: QoS) -> Result<(), SubscriptionError> {
        let ack = {
            let mut state = self.state.lock();
            state.subscribe_requests.push(topics.to_vec());
            state.last_qos = Some(qos);
            if !state.connected {
                // a real client would queue the request; the session it targets is gone
                return Ok(());
            }
            let mut rejected = 0;
            for topic in topics {
                if state.rejected_topics.contains(topic) {
                    rejected += 1;
                } else {
                    state.subscriptions.insert(topic.clone());
                }
            }
            BrokerEvent::SubscribeAck {
                granted: topics.len() - rejected,
                rejected,
            }
        };
        debug!(?topics, "[mock] subscribe");
        let _ = self.acks.send(Ok(ack));
        Ok(())
    }

    async fn next_event(&mut self) -> Result<BrokerEvent, ConnectionError> {
        match self.events.recv().await {
            Some(delivery) => delivery,
            // unreachable while `acks` keeps the channel open
            None => std::future::pending().await,
        }
    }
}

impl BrokerHandle {
    /// Opens a fresh session (CONNACK). Subscriptions start empty.
    pub fn connect(&self) {
        {
            let mut state = self.state.lock();
            state.connected = true;
            state.sessions += 1;
            state.subscriptions.clear();
        }
        debug!("[mock] session opened");
        let _ = self.events.send(Ok(BrokerEvent::Connected));
    }

    /// Network failure: the subscriber sees a connection error.
    pub fn drop_connection(&self) {
        self.close_session();
        debug!("[mock] connection dropped");
        let _ = self.events.send(Err(ConnectionError::Closed));
    }

    /// Orderly DISCONNECT from the broker.
    pub fn disconnect(&self) {
        self.close_session();
        let _ = self.events.send(Ok(BrokerEvent::Disconnected));
    }

    /// A connection attempt that fails before any CONNACK (broker unreachable).
    pub fn fail_connection(&self) {
        let _ = self.events.send(Err(ConnectionError::Closed));
    }

    /// The broker answers the attempt with a refusing CONNACK.
    pub fn refuse_connection(&self) {
        debug!("[mock] connection refused");
        let refused = rumqttc::ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
        let _ = self.events.send(Err(ConnectionError::Mqtt(refused)));
    }

    /// Future subscribe requests for `topic` get a failure return code.
    pub fn reject_topic(&self, topic: &str) {
        self.state.lock().rejected_topics.insert(topic.to_string());
    }

    /// Delivers to the subscriber only if `topic` is subscribed in the current
    /// session, like a real broker. Returns whether it was delivered.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        self.publish_at(topic, payload, OffsetDateTime::now_utc())
    }

    pub fn publish_at(&self, topic: &str, payload: impl Into<Vec<u8>>, received_at: OffsetDateTime) -> bool {
        let deliverable = {
            let state = self.state.lock();
            state.connected && state.subscriptions.contains(topic)
        };
        if !deliverable {
            debug!(topic, "[mock] no subscriber, message discarded");
            return false;
        }
        self.events
            .send(Ok(BrokerEvent::Message(InboundMessage::new(topic, payload, received_at))))
            .is_ok()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().subscriptions.contains(topic)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.lock().subscriptions.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn subscribe_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().subscribe_requests.clone()
    }

    pub fn sessions(&self) -> u32 {
        self.state.lock().sessions
    }

    pub fn last_qos(&self) -> Option<QoS> {
        self.state.lock().last_qos
    }

    fn close_session(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriptions_live_for_one_session() {
        let (mut broker, handle) = mock_broker();
        handle.connect();
        assert_eq!(broker.next_event().await.unwrap(), BrokerEvent::Connected);

        broker
            .subscribe_all(&["a".to_string(), "b".to_string()], QoS::AtLeastOnce)
            .await
            .unwrap();
        assert_eq!(
            broker.next_event().await.unwrap(),
            BrokerEvent::SubscribeAck { granted: 2, rejected: 0 }
        );
        assert_eq!(handle.subscriptions(), vec!["a", "b"]);
        assert_eq!(handle.last_qos(), Some(QoS::AtLeastOnce));

        assert!(handle.publish("a", "occupied"));
        assert!(!handle.publish("c", "occupied"));
        match broker.next_event().await.unwrap() {
            BrokerEvent::Message(msg) => {
                assert_eq!(msg.topic, "a");
                assert_eq!(msg.payload, b"occupied");
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.drop_connection();
        assert!(broker.next_event().await.is_err());
        assert!(handle.subscriptions().is_empty());
        assert!(!handle.publish("a", "free"));
    }

    #[tokio::test]
    async fn test_rejected_topics_are_reported() {
        let (mut broker, handle) = mock_broker();
        handle.reject_topic("b");
        handle.connect();
        broker.next_event().await.unwrap();
        broker
            .subscribe_all(&["a".to_string(), "b".to_string()], QoS::AtMostOnce)
            .await
            .unwrap();
        assert_eq!(
            broker.next_event().await.unwrap(),
            BrokerEvent::SubscribeAck { granted: 1, rejected: 1 }
        );
        assert!(handle.is_subscribed("a"));
        assert!(!handle.is_subscribed("b"));
    }

    #[tokio::test]
    async fn test_refused_and_failed_attempts() {
        let (mut broker, handle) = mock_broker();
        handle.refuse_connection();
        handle.fail_connection();
        assert!(broker.next_event().await.unwrap_err().is_refused());
        assert!(!broker.next_event().await.unwrap_err().is_refused());
        assert_eq!(handle.sessions(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_while_offline_is_recorded_only() {
        let (mut broker, handle) = mock_broker();
        broker.subscribe_all(&["a".to_string()], QoS::AtMostOnce).await.unwrap();
        assert_eq!(handle.subscribe_requests(), vec![vec!["a".to_string()]]);
        assert!(!handle.is_subscribed("a"));
        assert_eq!(handle.sessions(), 0);
    }
}
