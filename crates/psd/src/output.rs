//! Presentation of lifecycle events.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use colored::Colorize;
use tracing::warn;

use psd_scheduler::{EventKind, EventSink, LifecycleEvent};

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp(at: Option<NaiveDateTime>) -> String {
    at.map_or_else(|| "never".to_string(), |at| at.format(TIMESTAMP).to_string())
}

/// Render an event as one console line.
pub fn console_line(event: &LifecycleEvent, color: bool) -> String {
    let job = format!("Job '{}'", event.job);
    let (job, verb) = match (event.kind, color) {
        (EventKind::Started, true) => (job.bold().to_string(), "started".green().to_string()),
        (EventKind::Finished, true) => (job.bold().to_string(), "finished".yellow().to_string()),
        (EventKind::Started, false) => (job, "started".to_string()),
        (EventKind::Finished, false) => (job, "finished".to_string()),
    };
    let at = event.at.format(TIMESTAMP);

    match event.kind {
        EventKind::Started if event.next_finish.is_some() || event.next_start.is_some() => format!(
            "[ {job} {verb} at {at}. Finished in: {}. Next start: {} ]",
            timestamp(event.next_finish),
            timestamp(event.next_start),
        ),
        _ => format!("[ {job} {verb} at {at} ]"),
    }
}

/// Prints events to stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    color: bool,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: &LifecycleEvent) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", console_line(event, self.color)) {
            warn!(error = %e, "failed to write event to stdout");
        }
    }
}

/// Appends events to a file, one JSON object per line.
#[derive(Debug)]
pub struct LogFileSink {
    file: Mutex<File>,
}

impl LogFileSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for LogFileSink {
    fn emit(&self, event: &LifecycleEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(job = %event.job, error = %e, "failed to serialize event");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            warn!(job = %event.job, error = %e, "failed to write event to log file");
        }
    }
}

/// Forwards every event to each inner sink in order.
pub struct FanOut {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanOut {
    fn emit(&self, event: &LifecycleEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
