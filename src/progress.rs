//! Ingestion progress reporting.
//!
//! The pipeline updates a [`ProgressMonitor`]; every update is turned into a
//! [`ProgressEvent`] and handed to a [`ProgressSink`]. Sinks decide what to
//! do with it: print a line on **stderr** (so stdout stays parseable),
//! print JSON, forward it over a channel to some other task, or drop it.
//!
//! Emitting an event never blocks and never fails the run.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Snapshot of one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestionProgress {
    pub title: String,
    pub total_pending: u64,
    pub completed: u64,
    pub message: String,
    pub errors: Vec<String>,
}

/// A single progress update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Title { title: String },
    Total { total: u64 },
    Message { message: String },
    Advanced { completed: u64, total: u64 },
    Error { error: String },
    Finished { completed: u64, errors: usize },
}

/// Receives progress events. Called synchronously from the pipeline.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Holds the run's [`IngestionProgress`] and fans updates out to a sink.
pub struct ProgressMonitor {
    state: Mutex<IngestionProgress>,
    sink: Box<dyn ProgressSink>,
}

impl ProgressMonitor {
    pub fn new(sink: Box<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(IngestionProgress::default()),
            sink,
        }
    }

    /// A monitor that only keeps state.
    pub fn silent() -> Self {
        Self::new(Box::new(NoProgress))
    }

    fn state(&self) -> MutexGuard<'_, IngestionProgress> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_title(&self, title: &str) {
        self.state().title = title.to_string();
        self.sink.report(&ProgressEvent::Title {
            title: title.to_string(),
        });
    }

    pub fn set_total_pending(&self, total: u64) {
        self.state().total_pending = total;
        self.sink.report(&ProgressEvent::Total { total });
    }

    pub fn set_message(&self, message: &str) {
        self.state().message = message.to_string();
        self.sink.report(&ProgressEvent::Message {
            message: message.to_string(),
        });
    }

    pub fn add_error(&self, error: String) {
        self.state().errors.push(error.clone());
        self.sink.report(&ProgressEvent::Error { error });
    }

    pub fn advance(&self, n: u64) {
        let event = {
            let mut state = self.state();
            state.completed += n;
            ProgressEvent::Advanced {
                completed: state.completed,
                total: state.total_pending,
            }
        };
        self.sink.report(&event);
    }

    pub fn finish(&self) {
        let event = {
            let state = self.state();
            ProgressEvent::Finished {
                completed: state.completed,
                errors: state.errors.len(),
            }
        };
        self.sink.report(&event);
    }

    pub fn snapshot(&self) -> IngestionProgress {
        self.state().clone()
    }
}

/// Human-friendly progress on stderr: "RAG ingest  docs: a.txt  1,234 / 5,000 files".
pub struct StderrProgress {
    title: Mutex<String>,
    message: Mutex<String>,
}

impl StderrProgress {
    pub fn new() -> Self {
        Self {
            title: Mutex::new(String::new()),
            message: Mutex::new(String::new()),
        }
    }
}

impl Default for StderrProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn read(field: &Mutex<String>) -> String {
    field.lock().map(|s| s.clone()).unwrap_or_default()
}

fn write(field: &Mutex<String>, value: &str) {
    if let Ok(mut s) = field.lock() {
        *s = value.to_string();
    }
}

impl ProgressSink for StderrProgress {
    fn report(&self, event: &ProgressEvent) {
        let line = match event {
            ProgressEvent::Title { title } => {
                write(&self.title, title);
                return;
            }
            ProgressEvent::Message { message } => {
                write(&self.message, message);
                return;
            }
            ProgressEvent::Total { total } => {
                format!("{}  {} files pending\n", read(&self.title), format_number(*total))
            }
            ProgressEvent::Advanced { completed, total } => format!(
                "{}  {}  {} / {} files\n",
                read(&self.title),
                read(&self.message),
                format_number(*completed),
                format_number(*total)
            ),
            ProgressEvent::Error { error } => format!("{}  error: {}\n", read(&self.title), error),
            ProgressEvent::Finished { completed, errors } => format!(
                "{}  done  {} files, {} errors\n",
                read(&self.title),
                format_number(*completed),
                errors
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressSink for JsonProgress {
    fn report(&self, event: &ProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// Forwards events to another task. Events sent after the receiver is
/// dropped are discarded.
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// No-op sink when progress is disabled.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn sink(&self) -> Box<dyn ProgressSink> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress::new()),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn monitor_tracks_state() {
        let monitor = ProgressMonitor::silent();
        monitor.set_title("RAG ingest");
        monitor.set_total_pending(3);
        monitor.set_message("docs: a.txt");
        monitor.advance(1);
        monitor.add_error("docs: b.txt: boom".to_string());
        monitor.advance(1);

        let snap = monitor.snapshot();
        assert_eq!(snap.title, "RAG ingest");
        assert_eq!(snap.total_pending, 3);
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.message, "docs: a.txt");
        assert_eq!(snap.errors, vec!["docs: b.txt: boom".to_string()]);
    }

    #[test]
    fn channel_sink_forwards_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = ProgressMonitor::new(Box::new(ChannelProgress::new(tx)));
        monitor.set_total_pending(2);
        monitor.advance(1);
        monitor.finish();

        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Total { total: 2 });
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::Advanced {
                completed: 1,
                total: 2
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::Finished {
                completed: 1,
                errors: 0
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let monitor = ProgressMonitor::new(Box::new(ChannelProgress::new(tx)));
        monitor.advance(1);
        assert_eq!(monitor.snapshot().completed, 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(ProgressEvent::Advanced {
            completed: 1,
            total: 4,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "advanced", "completed": 1, "total": 4})
        );
    }
}
