/*!
Test harness for the dashboard core.

Starts the real subscriber and render loop against the mock broker and a
recording sink, then lets tests wait on store snapshots or rendered frames.
*/

use crate::mqtt_stub::{mock_broker, BrokerHandle};
use anyhow::Result;
use parking_lot::Mutex;
use rumqttc::QoS;
use sensor_dash::error::SinkError;
use sensor_dash::{
    AlertEvent, DisplaySink, LinkStatus, RenderLoop, RenderStats, SlotChannel, SlotValue, Snapshot,
    StateStore, Subscriber, SubscriberSettings,
};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// One frame as the sink saw it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedFrame {
    pub link: LinkStatus,
    pub slots: Vec<(String, SlotValue, Option<OffsetDateTime>)>,
    pub alerts: Vec<String>,
}

#[derive(Default)]
struct Recording {
    frames: Vec<RecordedFrame>,
    current: Option<RecordedFrame>,
    failures_left: u32,
}

/// Display sink keeping every completed frame. Clones share the recording.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` frames fail at `begin_frame`.
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().failures_left = n;
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.inner.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.inner.lock().frames.last().cloned()
    }
}

impl DisplaySink for RecordingSink {
    fn begin_frame(&mut self) -> Result<(), SinkError> {
        let mut rec = self.inner.lock();
        if rec.failures_left > 0 {
            rec.failures_left -= 1;
            rec.current = None;
            return Err(SinkError::Unavailable("simulated sink failure".into()));
        }
        rec.current = Some(RecordedFrame::default());
        Ok(())
    }

    fn render_link(&mut self, link: &LinkStatus) -> Result<(), SinkError> {
        if let Some(frame) = self.inner.lock().current.as_mut() {
            frame.link = *link;
        }
        Ok(())
    }

    fn render_slot(
        &mut self,
        label: &str,
        state: SlotValue,
        last_update: Option<OffsetDateTime>,
    ) -> Result<(), SinkError> {
        if let Some(frame) = self.inner.lock().current.as_mut() {
            frame.slots.push((label.to_string(), state, last_update));
        }
        Ok(())
    }

    fn render_alerts(&mut self, alerts: &[AlertEvent]) -> Result<(), SinkError> {
        if let Some(frame) = self.inner.lock().current.as_mut() {
            frame.alerts = alerts.iter().map(|a| a.message.clone()).collect();
        }
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<(), SinkError> {
        let mut rec = self.inner.lock();
        if let Some(frame) = rec.current.take() {
            rec.frames.push(frame);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub slots: Vec<String>,
    pub alerts: Option<String>,
    pub alert_capacity: usize,
    pub tick: Duration,
    pub reconnect_delay: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            slots: vec!["slotA".into(), "slotB".into()],
            alerts: Some("alerts".into()),
            alert_capacity: 10,
            tick: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(10),
        }
    }
}

/// Running dashboard core wired to the mock broker.
pub struct TestHarness {
    pub store: StateStore,
    pub broker: BrokerHandle,
    pub sink: RecordingSink,
    shutdown: watch::Sender<bool>,
    subscriber: JoinHandle<()>,
    render: JoinHandle<RenderStats>,
}

impl TestHarness {
    pub const WAIT: Duration = Duration::from_secs(2);

    pub fn start(cfg: HarnessConfig) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let channels: Vec<SlotChannel> = cfg.slots.iter().map(SlotChannel::new).collect();
        let store = StateStore::new(&channels, cfg.alert_capacity);
        let (link, broker) = mock_broker();
        let sink = RecordingSink::new();
        let (shutdown, rx) = watch::channel(false);

        let settings = SubscriberSettings {
            slot_topics: cfg.slots.clone(),
            alerts_topic: cfg.alerts.clone(),
            qos: QoS::AtMostOnce,
            reconnect_delay: cfg.reconnect_delay,
            max_reconnect_delay: cfg.reconnect_delay * 4,
        };
        let subscriber = tokio::spawn(Subscriber::new(link, store.clone(), settings).run(rx.clone()));
        let render = tokio::spawn(RenderLoop::new(store.clone(), sink.clone(), cfg.tick).run(rx));

        Self {
            store,
            broker,
            sink,
            shutdown,
            subscriber,
            render,
        }
    }

    /// Polls the store until `check` holds or [`TestHarness::WAIT`] elapses.
    pub async fn wait_for<F>(&self, what: &str, check: F) -> Result<Snapshot>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let deadline = Instant::now() + Self::WAIT;
        loop {
            let snapshot = self.store.snapshot();
            if check(&snapshot) {
                return Ok(snapshot);
            }
            if Instant::now() >= deadline {
                anyhow::bail!("timed out waiting for {what}; last snapshot: {snapshot:?}");
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Connects and waits until every topic in `topics` is subscribed.
    pub async fn connect_and_subscribe(&self, topics: &[&str]) -> Result<()> {
        self.broker.connect();
        self.wait_for_subscriptions(topics).await
    }

    pub async fn wait_for_subscriptions(&self, topics: &[&str]) -> Result<()> {
        let deadline = Instant::now() + Self::WAIT;
        while !topics.iter().all(|t| self.broker.is_subscribed(t)) {
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "timed out waiting for subscriptions {topics:?}; broker has {:?}",
                    self.broker.subscriptions()
                );
            }
            sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    /// Waits until the sink has recorded at least `n` more frames than now.
    pub async fn wait_for_frames(&self, n: usize) -> Result<()> {
        let target = self.sink.frame_count() + n;
        let deadline = Instant::now() + Self::WAIT;
        while self.sink.frame_count() < target {
            if Instant::now() >= deadline {
                anyhow::bail!("timed out waiting for {n} frames");
            }
            sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    /// Signals shutdown and waits for both tasks.
    pub async fn stop(self) -> Result<RenderStats> {
        self.shutdown.send_replace(true);
        tokio::time::timeout(Self::WAIT, self.subscriber).await??;
        let stats = tokio::time::timeout(Self::WAIT, self.render).await??;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_drops_failed_frames() {
        let mut sink = RecordingSink::new();
        sink.fail_next(1);
        assert!(sink.begin_frame().is_err());
        sink.render_slot("a", SlotValue::Free, None).unwrap();
        sink.finish_frame().unwrap();
        assert_eq!(sink.frame_count(), 0);

        sink.begin_frame().unwrap();
        sink.render_slot("a", SlotValue::Free, None).unwrap();
        sink.render_alerts(&[]).unwrap();
        sink.finish_frame().unwrap();
        assert_eq!(
            sink.last_frame().unwrap().slots,
            vec![("a".to_string(), SlotValue::Free, None)]
        );
    }

    #[tokio::test]
    async fn test_harness_starts_and_stops() {
        let harness = TestHarness::start(HarnessConfig::default());
        harness.wait_for_frames(1).await.unwrap();
        let stats = harness.stop().await.unwrap();
        assert!(stats.frames >= 1);
        assert_eq!(stats.failed_frames, 0);
    }
}
