/**
 * SUBSCRIBER - Broker connection lifecycle and event dispatch into the state store
 *
 * ROLE : keeps one broker session alive, (re)subscribes every configured
 * channel on each CONNACK, and applies inbound messages to the store in
 * arrival order.
 *
 * LIFECYCLE : Disconnected -> Connecting -> Connected -> Subscribed.
 * Any connection loss goes back to Connecting after a backoff delay; a
 * refused CONNACK parks in Disconnected and keeps retrying at the same pace.
 */

use crate::config::DashboardConfig;
use crate::error::{ConfigError, ConnectionError, DecodeError, SubscriptionError};
use crate::link::{BrokerEvent, BrokerLink, InboundMessage};
use crate::models::{LinkState, LinkStatus, SlotValue};
use crate::state::StateStore;
use rumqttc::QoS;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    pub slot_topics: Vec<String>,
    pub alerts_topic: Option<String>,
    pub qos: QoS,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl SubscriberSettings {
    pub fn from_config(cfg: &DashboardConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            slot_topics: cfg.channels.slots.iter().map(|s| s.topic.clone()).collect(),
            alerts_topic: cfg.channels.alerts.clone(),
            qos: cfg.mqtt.qos()?,
            reconnect_delay: cfg.mqtt.reconnect_delay(),
            max_reconnect_delay: cfg.mqtt.max_reconnect_delay(),
        })
    }

    fn topics(&self) -> Vec<String> {
        let mut topics = self.slot_topics.clone();
        topics.extend(self.alerts_topic.iter().cloned());
        topics
    }
}

/// Doubling delay between reconnect attempts, capped, reset on a successful CONNACK.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base), attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(16)).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Maps a slot payload to a value.
///
/// Trimmed, ASCII case-insensitive: `occupied` and `free` are recognised, any
/// other text (empty included) is `Unknown`. Only non-UTF-8 bytes are an error.
pub fn decode_slot(topic: &str, payload: &[u8]) -> Result<SlotValue, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8 {
        topic: topic.to_string(),
    })?;
    let text = text.trim();
    if text.eq_ignore_ascii_case("occupied") {
        Ok(SlotValue::Occupied)
    } else if text.eq_ignore_ascii_case("free") {
        Ok(SlotValue::Free)
    } else {
        Ok(SlotValue::Unknown)
    }
}

pub struct Subscriber<L> {
    link: L,
    store: StateStore,
    slot_topics: HashSet<String>,
    alerts_topic: Option<String>,
    topics: Vec<String>,
    qos: QoS,
    backoff: Backoff,
    status: LinkStatus,
}

impl<L: BrokerLink> Subscriber<L> {
    pub fn new(link: L, store: StateStore, settings: SubscriberSettings) -> Self {
        Self {
            link,
            store,
            topics: settings.topics(),
            slot_topics: settings.slot_topics.into_iter().collect(),
            alerts_topic: settings.alerts_topic,
            qos: settings.qos,
            backoff: Backoff::new(settings.reconnect_delay, settings.max_reconnect_delay),
            status: LinkStatus::default(),
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.set_state(LinkState::Connecting);
        info!(topics = ?self.topics, "subscriber started");

        while !*shutdown.borrow() {
            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                event = self.link.next_event() => event,
            };

            let lost = match outcome {
                Ok(BrokerEvent::Disconnected) => ConnectionError::Closed,
                Ok(event) => {
                    self.handle_event(event).await;
                    continue;
                }
                Err(e) => e,
            };

            let delay = self.connection_lost(&lost);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(LinkState::Disconnected);
        info!("subscriber stopped");
    }

    /// Applies one broker event. Connection loss is handled by [`Subscriber::run`].
    pub async fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => self.on_connected().await,
            BrokerEvent::SubscribeAck { granted, rejected } => {
                if rejected == 0 {
                    self.set_state(LinkState::Subscribed);
                    info!(granted, "subscriptions active");
                } else {
                    let err = SubscriptionError::Rejected {
                        requested: granted + rejected,
                        rejected,
                    };
                    warn!("{err}, retrying on next reconnect");
                }
            }
            BrokerEvent::Message(msg) => self.apply(msg),
            BrokerEvent::Disconnected => {
                self.connection_lost(&ConnectionError::Closed);
            }
        }
    }

    async fn on_connected(&mut self) {
        self.backoff.reset();
        self.set_state(LinkState::Connected);
        info!(reconnects = self.status.reconnects, "connected to broker");

        if self.topics.is_empty() {
            return;
        }
        if let Err(e) = self.link.subscribe_all(&self.topics, self.qos).await {
            warn!("{e}, retrying on next reconnect");
        }
    }

    /// Returns how long to wait before the next connection attempt.
    fn connection_lost(&mut self, err: &ConnectionError) -> Duration {
        self.status.reconnects = self.status.reconnects.saturating_add(1);
        let state = if err.is_refused() {
            LinkState::Disconnected
        } else {
            LinkState::Connecting
        };
        self.set_state(state);

        let delay = self.backoff.next_delay();
        warn!(
            error = %err,
            attempt = self.status.reconnects,
            delay_ms = delay.as_millis() as u64,
            "broker link lost, reconnecting"
        );
        delay
    }

    fn apply(&self, msg: InboundMessage) {
        if self.slot_topics.contains(&msg.topic) {
            match decode_slot(&msg.topic, &msg.payload) {
                Ok(value) => {
                    if value == SlotValue::Unknown {
                        debug!(topic = %msg.topic, payload = %String::from_utf8_lossy(&msg.payload), "unrecognised slot value");
                    }
                    self.store.update_slot(&msg.topic, value, msg.received_at);
                }
                Err(e) => warn!("{e}, message dropped"),
            }
        } else if self.alerts_topic.as_deref() == Some(msg.topic.as_str()) {
            let text = String::from_utf8_lossy(&msg.payload).into_owned();
            info!(alert = %text, "intrusion alert");
            self.store.push_alert(text, msg.received_at);
        } else {
            debug!(topic = %msg.topic, "ignoring message on unmonitored topic");
        }
    }

    fn set_state(&mut self, state: LinkState) {
        self.status.state = state;
        self.store.set_link(self.status);
    }
}
