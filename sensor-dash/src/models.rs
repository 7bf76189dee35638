use serde::Serialize;
use time::OffsetDateTime;

/// Occupancy reported on a slot channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotValue {
    #[default]
    Unknown,
    Occupied,
    Free,
}

impl SlotValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotValue::Unknown => "unknown",
            SlotValue::Occupied => "occupied",
            SlotValue::Free => "free",
        }
    }
}

/// Latest known value of one slot. `last_update` stays `None` until the first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SlotState {
    pub value: SlotValue,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReading {
    pub channel: String,
    pub label: String,
    pub state: SlotState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Subscribed => "subscribed",
        }
    }
}

/// Broker link as last reported by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub reconnects: u32,
}

/// Point-in-time copy of the whole board, handed to the display sink.
///
/// Slots keep the configured order; alerts are newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub slots: Vec<SlotReading>,
    pub alerts: Vec<AlertEvent>,
    pub link: LinkStatus,
}

impl Snapshot {
    pub fn slot(&self, channel: &str) -> Option<&SlotState> {
        self.slots
            .iter()
            .find(|reading| reading.channel == channel)
            .map(|reading| &reading.state)
    }

    pub fn alert_messages(&self) -> Vec<&str> {
        self.alerts.iter().map(|a| a.message.as_str()).collect()
    }
}
