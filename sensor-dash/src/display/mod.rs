//! Display sinks shipped with the dashboard.
//!
//! - [`TerminalSink`]: ANSI redraw of the whole board on every frame
//! - [`JsonSink`]: one JSON object per frame, newline-delimited

mod json;
mod terminal;

pub use json::JsonSink;
pub use terminal::TerminalSink;

use crate::config::{DisplayConf, DisplayMode};
use crate::render::DisplaySink;

/// Sink selected by `display.mode`, writing to stdout.
pub fn stdout_sink(cfg: &DisplayConf) -> Box<dyn DisplaySink> {
    match cfg.mode {
        DisplayMode::Terminal => Box::new(TerminalSink::new(std::io::stdout(), cfg.title.clone(), true)),
        DisplayMode::Json => Box::new(JsonSink::new(std::io::stdout())),
    }
}
