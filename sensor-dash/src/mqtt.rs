use crate::config::MqttConf;
use crate::error::{ConnectionError, SubscriptionError};
use crate::link::{BrokerEvent, BrokerLink, InboundMessage};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, SubscribeFilter, SubscribeReasonCode};
use time::OffsetDateTime;
use tracing::{debug, info};

/// `rumqttc` client + event loop behind [`BrokerLink`].
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttLink {
    pub fn new(cfg: &MqttConf) -> Self {
        let client_id = cfg.client_id();
        let mut opts = MqttOptions::new(client_id.clone(), cfg.host.clone(), cfg.port);
        opts.set_keep_alive(cfg.keep_alive());
        // the broker forgets subscriptions on every reconnect; the subscriber re-issues them
        opts.set_clean_session(true);
        let (client, eventloop) = AsyncClient::new(opts, 10);
        info!(%client_id, host = %cfg.host, port = cfg.port, "MQTT client created");
        Self { client, eventloop }
    }
}

impl BrokerLink for MqttLink {
    async fn subscribe_all(&mut self, topics: &[String], qos: QoS) -> Result<(), SubscriptionError> {
        let filters: Vec<SubscribeFilter> = topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), qos))
            .collect();
        // non-blocking: the request queue is only drained by `poll`, on this same task
        self.client.try_subscribe_many(filters)?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<BrokerEvent, ConnectionError> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(packet) => {
                    if let Some(event) = map_incoming(packet, OffsetDateTime::now_utc()) {
                        return Ok(event);
                    }
                }
                Event::Outgoing(packet) => debug!(?packet, "MQTT outgoing"),
            }
        }
    }
}

/// Broker packet -> dashboard event. `None` for packets the subscriber ignores (pings, acks...).
fn map_incoming(packet: Incoming, received_at: OffsetDateTime) -> Option<BrokerEvent> {
    match packet {
        Incoming::ConnAck(_) => Some(BrokerEvent::Connected),
        Incoming::SubAck(ack) => {
            let rejected = ack
                .return_codes
                .iter()
                .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                .count();
            Some(BrokerEvent::SubscribeAck {
                granted: ack.return_codes.len() - rejected,
                rejected,
            })
        }
        Incoming::Publish(p) => Some(BrokerEvent::Message(InboundMessage {
            topic: p.topic,
            payload: p.payload.to_vec(),
            received_at,
        })),
        Incoming::Disconnect => Some(BrokerEvent::Disconnected),
        other => {
            debug!(packet = ?other, "MQTT incoming");
            None
        }
    }
}
