//! Consumer that writes each event to stdout.

use std::io::Write;

use io_events_watcher::{ChangeEvent, EventConsumer, EventKind, RuntimeError};
use tracing::error;

/// Output format for printed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `KIND<TAB>path`
    Text,

    /// One JSON object per line.
    Json,
}

/// Prints events and remembers a fault for the exit status.
#[derive(Debug)]
pub struct Printer {
    format: Format,
    fault: Option<String>,
}

impl Printer {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            fault: None,
        }
    }

    /// Message of the fault that halted the watcher, if any.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    fn line(&self, path: &str, kind: EventKind) -> anyhow::Result<String> {
        Ok(match self.format {
            Format::Text => format!("{kind}\t{path}"),
            Format::Json => serde_json::to_string(&ChangeEvent::new(path, kind))?,
        })
    }
}

impl EventConsumer for Printer {
    fn on_event(&mut self, path: &str, kind: EventKind) -> anyhow::Result<()> {
        let line = self.line(path, kind)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    fn on_fault(&mut self, fault: &RuntimeError) {
        error!("Watcher halted: {fault}");
        self.fault = Some(fault.to_string());
    }
}
