/*!
# sensor-dash DevKit - broker mock and harness for dashboard tests

- Mock broker implementing `BrokerLink`, with real-broker session semantics
  (subscriptions are lost on every disconnect)
- Recording display sink
- Harness wiring store + subscriber + render loop on the tokio runtime
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{mock_broker, BrokerHandle, MockBroker};
pub use test_utils::{HarnessConfig, RecordedFrame, RecordingSink, TestHarness};
