/**
 * RENDER LOOP - Periodic snapshot -> display sink
 *
 * ROLE : every tick takes one consistent snapshot of the store and draws it
 * through a [`DisplaySink`]. Read-only on the store; a failing sink only
 * loses the current frame.
 */

use crate::error::SinkError;
use crate::models::{AlertEvent, LinkStatus, SlotValue, Snapshot};
use crate::state::StateStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drawing surface for one dashboard frame.
///
/// A frame is `begin_frame`, `render_link`, one `render_slot` per channel in
/// configured order, `render_alerts` (newest first), then `finish_frame`.
pub trait DisplaySink: Send {
    fn begin_frame(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn render_link(&mut self, _link: &LinkStatus) -> Result<(), SinkError> {
        Ok(())
    }

    fn render_slot(
        &mut self,
        label: &str,
        state: SlotValue,
        last_update: Option<OffsetDateTime>,
    ) -> Result<(), SinkError>;

    fn render_alerts(&mut self, alerts: &[AlertEvent]) -> Result<(), SinkError>;

    fn finish_frame(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn begin_frame(&mut self) -> Result<(), SinkError> {
        (**self).begin_frame()
    }

    fn render_link(&mut self, link: &LinkStatus) -> Result<(), SinkError> {
        (**self).render_link(link)
    }

    fn render_slot(
        &mut self,
        label: &str,
        state: SlotValue,
        last_update: Option<OffsetDateTime>,
    ) -> Result<(), SinkError> {
        (**self).render_slot(label, state, last_update)
    }

    fn render_alerts(&mut self, alerts: &[AlertEvent]) -> Result<(), SinkError> {
        (**self).render_alerts(alerts)
    }

    fn finish_frame(&mut self) -> Result<(), SinkError> {
        (**self).finish_frame()
    }
}

pub fn render_snapshot<S: DisplaySink + ?Sized>(sink: &mut S, snapshot: &Snapshot) -> Result<(), SinkError> {
    sink.begin_frame()?;
    sink.render_link(&snapshot.link)?;
    for reading in &snapshot.slots {
        sink.render_slot(&reading.label, reading.state.value, reading.state.last_update)?;
    }
    sink.render_alerts(&snapshot.alerts)?;
    sink.finish_frame()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub failed_frames: u64,
}

pub struct RenderLoop<S> {
    store: StateStore,
    sink: Arc<Mutex<S>>,
    period: Duration,
    stats: RenderStats,
}

impl<S: DisplaySink + 'static> RenderLoop<S> {
    pub fn new(store: StateStore, sink: S, period: Duration) -> Self {
        Self {
            store,
            sink: Arc::new(Mutex::new(sink)),
            period,
            stats: RenderStats::default(),
        }
    }

    /// Draws one frame on the calling thread; a sink error is logged and counted, never returned.
    pub fn tick(&mut self) {
        let snapshot = self.store.snapshot();
        let result = render_snapshot(&mut *self.sink.lock(), &snapshot);
        self.record(result);
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Ticks every `period` (first frame immediately) until `shutdown` flips to
    /// `true` or its sender is dropped. Late ticks are skipped, not replayed.
    ///
    /// Frames are drawn on the blocking pool: a sink stuck on its writer does
    /// not delay shutdown, its frame is abandoned.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RenderStats {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(period_ms = self.period.as_millis() as u64, "render loop started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = self.store.snapshot();
            let sink = self.sink.clone();
            let frame = task::spawn_blocking(move || render_snapshot(&mut *sink.lock(), &snapshot));
            tokio::select! {
                _ = shutdown.changed() => {
                    warn!("display sink still drawing at shutdown, frame abandoned");
                    break;
                }
                joined = frame => match joined {
                    Ok(result) => self.record(result),
                    Err(e) => self.record(Err(SinkError::Unavailable(format!("render task failed: {e}")))),
                },
            }
        }

        info!(frames = self.stats.frames, failed = self.stats.failed_frames, "render loop stopped");
        self.stats
    }

    fn record(&mut self, result: Result<(), SinkError>) {
        self.stats.frames += 1;
        if let Err(e) = result {
            self.stats.failed_frames += 1;
            warn!(frame = self.stats.frames, "render failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotChannel;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Begin,
        Link(LinkStatus),
        Slot(String, SlotValue, Option<OffsetDateTime>),
        Alerts(Vec<String>),
        Finish,
    }

    #[derive(Clone, Default)]
    struct Tape {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_every_other: bool,
        frames: Arc<Mutex<u32>>,
    }

    impl DisplaySink for Tape {
        fn begin_frame(&mut self) -> Result<(), SinkError> {
            let mut frames = self.frames.lock();
            *frames += 1;
            if self.fail_every_other && *frames % 2 == 0 {
                return Err(SinkError::Unavailable("screen detached".into()));
            }
            self.calls.lock().push(Call::Begin);
            Ok(())
        }

        fn render_link(&mut self, link: &LinkStatus) -> Result<(), SinkError> {
            self.calls.lock().push(Call::Link(*link));
            Ok(())
        }

        fn render_slot(&mut self, label: &str, state: SlotValue, last_update: Option<OffsetDateTime>) -> Result<(), SinkError> {
            self.calls.lock().push(Call::Slot(label.to_string(), state, last_update));
            Ok(())
        }

        fn render_alerts(&mut self, alerts: &[AlertEvent]) -> Result<(), SinkError> {
            self.calls.lock().push(Call::Alerts(alerts.iter().map(|a| a.message.clone()).collect()));
            Ok(())
        }

        fn finish_frame(&mut self) -> Result<(), SinkError> {
            self.calls.lock().push(Call::Finish);
            Ok(())
        }
    }

    fn store() -> StateStore {
        StateStore::new(
            &[SlotChannel::labeled("p/1", "Slot 1"), SlotChannel::labeled("p/2", "Slot 2")],
            10,
        )
    }

    #[test]
    fn test_frame_call_order() {
        let store = store();
        let at = OffsetDateTime::from_unix_timestamp(60).unwrap();
        store.update_slot("p/2", SlotValue::Occupied, at);
        store.push_alert("door", at);

        let tape = Tape::default();
        let mut render = RenderLoop::new(store, tape.clone(), Duration::from_secs(1));
        render.tick();

        assert_eq!(
            *tape.calls.lock(),
            vec![
                Call::Begin,
                Call::Link(LinkStatus::default()),
                Call::Slot("Slot 1".into(), SlotValue::Unknown, None),
                Call::Slot("Slot 2".into(), SlotValue::Occupied, Some(at)),
                Call::Alerts(vec!["door".into()]),
                Call::Finish,
            ]
        );
        assert_eq!(render.stats(), RenderStats { frames: 1, failed_frames: 0 });
    }

    #[test]
    fn test_sink_failure_is_contained() {
        let tape = Tape { fail_every_other: true, ..Default::default() };
        let mut render = RenderLoop::new(store(), tape.clone(), Duration::from_secs(1));
        for _ in 0..4 {
            render.tick();
        }
        assert_eq!(render.stats(), RenderStats { frames: 4, failed_frames: 2 });
        let finished = tape.calls.lock().iter().filter(|c| **c == Call::Finish).count();
        assert_eq!(finished, 2);
    }

    #[test]
    fn test_tick_never_mutates_store() {
        let store = store();
        let before = store.snapshot();
        let mut render = RenderLoop::new(store.clone(), Tape::default(), Duration::from_secs(1));
        render.tick();
        render.tick();
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_period_until_shutdown() {
        let tape = Tape::default();
        let render = RenderLoop::new(store(), tape.clone(), Duration::from_secs(1));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(render.run(rx));

        // frames at t=0, 1, 2, 3
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.frames, 4);
        assert_eq!(*tape.frames.lock(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_loop() {
        let render = RenderLoop::new(store(), Tape::default(), Duration::from_millis(100));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(render.run(rx));
        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(tx);
        let stats = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(stats.frames >= 1);
    }

    /// Blocks in `render_slot` until `release` is dropped, like a stdout nobody reads.
    struct StalledSink {
        gate: std::sync::mpsc::Receiver<()>,
    }

    impl DisplaySink for StalledSink {
        fn render_slot(&mut self, _: &str, _: SlotValue, _: Option<OffsetDateTime>) -> Result<(), SinkError> {
            let _ = self.gate.recv();
            Ok(())
        }

        fn render_alerts(&mut self, _: &[AlertEvent]) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stalled_sink_does_not_block_shutdown() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let render = RenderLoop::new(store(), StalledSink { gate }, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(render.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
        drop(release);
        let stats = stopped.expect("render loop should stop while the sink is stuck").unwrap();
        assert_eq!(stats.frames, 0);
    }
}
