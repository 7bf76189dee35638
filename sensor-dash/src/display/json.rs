use crate::error::SinkError;
use crate::models::{AlertEvent, LinkStatus, SlotValue};
use crate::render::DisplaySink;
use serde::Serialize;
use std::io::Write;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
struct JsonSlot {
    label: String,
    state: SlotValue,
    #[serde(with = "time::serde::rfc3339::option")]
    last_update: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
struct JsonFrame {
    #[serde(with = "time::serde::rfc3339")]
    rendered_at: OffsetDateTime,
    link: LinkStatus,
    slots: Vec<JsonSlot>,
    alerts: Vec<AlertEvent>,
}

impl JsonFrame {
    fn empty() -> Self {
        Self {
            rendered_at: OffsetDateTime::now_utc(),
            link: LinkStatus::default(),
            slots: Vec::new(),
            alerts: Vec::new(),
        }
    }
}

/// Newline-delimited JSON, one object per frame, for piping into other tools.
pub struct JsonSink<W> {
    out: W,
    frame: JsonFrame,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, frame: JsonFrame::empty() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DisplaySink for JsonSink<W> {
    fn begin_frame(&mut self) -> Result<(), SinkError> {
        self.frame = JsonFrame::empty();
        Ok(())
    }

    fn render_link(&mut self, link: &LinkStatus) -> Result<(), SinkError> {
        self.frame.link = *link;
        Ok(())
    }

    fn render_slot(
        &mut self,
        label: &str,
        state: SlotValue,
        last_update: Option<OffsetDateTime>,
    ) -> Result<(), SinkError> {
        self.frame.slots.push(JsonSlot {
            label: label.to_string(),
            state,
            last_update,
        });
        Ok(())
    }

    fn render_alerts(&mut self, alerts: &[AlertEvent]) -> Result<(), SinkError> {
        self.frame.alerts = alerts.to_vec();
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.out, &self.frame)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotChannel;
    use crate::render::render_snapshot;
    use crate::state::StateStore;
    use serde_json::Value;
    use time::macros::datetime;

    #[test]
    fn test_one_line_per_frame() {
        let store = StateStore::new(&[SlotChannel::labeled("parking/slot1", "Slot 1")], 10);
        let at = datetime!(2024-05-01 14:03:09 UTC);
        store.update_slot("parking/slot1", SlotValue::Occupied, at);
        store.push_alert("glass break", at);

        let mut sink = JsonSink::new(Vec::new());
        render_snapshot(&mut sink, &store.snapshot()).unwrap();
        render_snapshot(&mut sink, &store.snapshot()).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let frame: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(frame["link"]["state"], "disconnected");
        assert_eq!(frame["slots"].as_array().unwrap().len(), 1);
        assert_eq!(frame["slots"][0]["label"], "Slot 1");
        assert_eq!(frame["slots"][0]["state"], "occupied");
        assert_eq!(frame["slots"][0]["last_update"], "2024-05-01T14:03:09Z");
        assert_eq!(frame["alerts"][0]["message"], "glass break");
    }

    #[test]
    fn test_unknown_slot_has_null_timestamp() {
        let store = StateStore::new(&[SlotChannel::new("a")], 1);
        let mut sink = JsonSink::new(Vec::new());
        render_snapshot(&mut sink, &store.snapshot()).unwrap();
        let frame: Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert_eq!(frame["slots"][0]["state"], "unknown");
        assert!(frame["slots"][0]["last_update"].is_null());
        assert_eq!(frame["alerts"], Value::Array(vec![]));
    }
}
