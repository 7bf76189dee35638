use crate::error::SinkError;
use crate::models::{AlertEvent, LinkState, LinkStatus, SlotValue};
use crate::render::DisplaySink;
use std::io::Write;
use time::macros::format_description;
use time::OffsetDateTime;

fn clock(at: OffsetDateTime) -> Result<String, SinkError> {
    Ok(at.format(format_description!("[hour]:[minute]:[second]"))?)
}

/// Full-screen text dashboard. Timestamps are shown in UTC.
pub struct TerminalSink<W> {
    out: W,
    title: String,
    clear_screen: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, title: impl Into<String>, clear_screen: bool) -> Self {
        Self {
            out,
            title: title.into(),
            clear_screen,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DisplaySink for TerminalSink<W> {
    fn begin_frame(&mut self) -> Result<(), SinkError> {
        if self.clear_screen {
            // clear + cursor home
            write!(self.out, "\x1b[2J\x1b[H")?;
        }
        writeln!(self.out, "🏠 {}", self.title)?;
        writeln!(self.out, "{}", "=".repeat(self.title.chars().count() + 3))?;
        Ok(())
    }

    fn render_link(&mut self, link: &LinkStatus) -> Result<(), SinkError> {
        match link.state {
            LinkState::Subscribed => writeln!(self.out, "● live")?,
            state => writeln!(
                self.out,
                "⚠ broker {} (reconnects: {}), showing last known state",
                state.as_str(),
                link.reconnects
            )?,
        }
        Ok(())
    }

    fn render_slot(
        &mut self,
        label: &str,
        state: SlotValue,
        last_update: Option<OffsetDateTime>,
    ) -> Result<(), SinkError> {
        writeln!(self.out)?;
        writeln!(self.out, "🚗 {label}")?;
        let line = match state {
            SlotValue::Occupied => "⛔ Occupied",
            SlotValue::Free => "✅ Free",
            SlotValue::Unknown => "⏳ Waiting for data...",
        };
        writeln!(self.out, "   {line}")?;
        if let Some(at) = last_update {
            writeln!(self.out, "   Last update: {}", clock(at)?)?;
        }
        Ok(())
    }

    fn render_alerts(&mut self, alerts: &[AlertEvent]) -> Result<(), SinkError> {
        writeln!(self.out)?;
        writeln!(self.out, "🚨 Intrusion Alerts")?;
        if alerts.is_empty() {
            writeln!(self.out, "   No intrusion alerts yet")?;
        }
        for alert in alerts {
            writeln!(self.out, "   [{}] {}", clock(alert.timestamp)?, alert.message)?;
        }
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}
