/*!
# sensor-dash - live MQTT sensor dashboard

Two long-running tasks share one [`StateStore`]:
- [`Subscriber`]: broker connection lifecycle, (re)subscription, event dispatch
- [`RenderLoop`]: periodic snapshot handed to a [`DisplaySink`]

They never talk to each other directly; the store's lock is the only
synchronisation point and is never held across I/O.
*/

pub mod config;
pub mod display;
pub mod error;
pub mod link;
pub mod models;
pub mod mqtt;
pub mod render;
pub mod state;
pub mod subscriber;

pub use config::{DashboardConfig, SlotChannel};
pub use link::{BrokerEvent, BrokerLink, InboundMessage};
pub use models::{AlertEvent, LinkState, LinkStatus, SlotReading, SlotState, SlotValue, Snapshot};
pub use render::{DisplaySink, RenderLoop, RenderStats};
pub use state::StateStore;
pub use subscriber::{Subscriber, SubscriberSettings};
