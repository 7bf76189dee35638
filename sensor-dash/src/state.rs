/**
 * STATE STORE - Single shared board between the MQTT subscriber and the render loop
 *
 * ROLE : owns the latest value of every slot channel, the bounded list of
 * recent alerts and the broker link status. Every method takes the one lock
 * for the mutation or the copy only, never across network or display I/O.
 */

use crate::config::SlotChannel;
use crate::models::{AlertEvent, LinkStatus, SlotReading, SlotState, SlotValue, Snapshot};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use time::OffsetDateTime;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Debug)]
struct Board {
    slots: Vec<SlotReading>,
    index: HashMap<String, usize>,
    alerts: VecDeque<AlertEvent>,
    link: LinkStatus,
}

/// Cloneable handle; all clones share the same board.
#[derive(Debug, Clone)]
pub struct StateStore {
    board: Shared<Board>,
    alert_capacity: usize,
}

impl StateStore {
    /// Every slot starts `Unknown` with no timestamp. Duplicate topics keep the first label.
    pub fn new(slots: &[SlotChannel], alert_capacity: usize) -> Self {
        let mut readings = Vec::with_capacity(slots.len());
        let mut index = HashMap::with_capacity(slots.len());
        for slot in slots {
            if index.contains_key(&slot.topic) {
                continue;
            }
            index.insert(slot.topic.clone(), readings.len());
            readings.push(SlotReading {
                channel: slot.topic.clone(),
                label: slot.label().to_string(),
                state: SlotState::default(),
            });
        }

        Self {
            board: new_state(Board {
                slots: readings,
                index,
                alerts: VecDeque::with_capacity(alert_capacity),
                link: LinkStatus::default(),
            }),
            alert_capacity,
        }
    }

    /// Returns `false` when `channel` is not a configured slot; nothing is changed then.
    pub fn update_slot(&self, channel: &str, value: SlotValue, timestamp: OffsetDateTime) -> bool {
        let mut board = self.board.lock();
        let Some(&idx) = board.index.get(channel) else {
            return false;
        };
        board.slots[idx].state = SlotState {
            value,
            last_update: Some(timestamp),
        };
        true
    }

    pub fn push_alert(&self, message: impl Into<String>, timestamp: OffsetDateTime) {
        let alert = AlertEvent {
            timestamp,
            message: message.into(),
        };
        let mut board = self.board.lock();
        board.alerts.push_front(alert);
        board.alerts.truncate(self.alert_capacity);
    }

    pub fn set_link(&self, link: LinkStatus) {
        self.board.lock().link = link;
    }

    pub fn snapshot(&self) -> Snapshot {
        let board = self.board.lock();
        Snapshot {
            slots: board.slots.clone(),
            alerts: board.alerts.iter().cloned().collect(),
            link: board.link,
        }
    }

    pub fn alert_capacity(&self) -> usize {
        self.alert_capacity
    }

    pub fn channels(&self) -> Vec<String> {
        self.board
            .lock()
            .slots
            .iter()
            .map(|reading| reading.channel.clone())
            .collect()
    }
}
