//! Progress reporting for long-running service calls.
//!
//! Sending a note, scanning for duplicates and uploading attachments can
//! take a while on a slow connection. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A background task was submitted.
    Started { label: String },
    /// Periodic heartbeat of a running task.
    Tick { label: String, frame: usize },
    Finished { label: String },
    Failed { label: String, error: String },
    /// Listing pages fetched so far during a duplicate scan.
    Scanning { fetched: u64, total: u64 },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Number of spinner frames before the marker wraps around.
pub const SPINNER_FRAMES: usize = 8;

/// `[  =     ]` with the marker at `frame`.
pub fn spinner(frame: usize) -> String {
    let pos = frame % SPINNER_FRAMES;
    format!("[{}={}]", " ".repeat(pos), " ".repeat(SPINNER_FRAMES - 1 - pos))
}

/// Human-friendly status line on stderr: "Sending note... [  =     ]".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { .. } => return,
            ProgressEvent::Tick { label, frame } => format!("\r{} {}", label, spinner(*frame)),
            ProgressEvent::Finished { label } => format!("\r{} done{}\n", label, " ".repeat(6)),
            ProgressEvent::Failed { label, .. } => format!("\r{} failed{}\n", label, " ".repeat(4)),
            ProgressEvent::Scanning { fetched, total } => format!(
                "dups  fetched {} / {} notes\n",
                format_number(*fetched),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { label } => serde_json::json!({
                "event": "started",
                "task": label
            }),
            // Heartbeats carry no information for machines
            ProgressEvent::Tick { .. } => return,
            ProgressEvent::Finished { label } => serde_json::json!({
                "event": "finished",
                "task": label
            }),
            ProgressEvent::Failed { label, error } => serde_json::json!({
                "event": "failed",
                "task": label,
                "error": error
            }),
            ProgressEvent::Scanning { fetched, total } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "n": fetched,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
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
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn spinner_moves_and_wraps() {
        assert_eq!(spinner(0), "[=       ]");
        assert_eq!(spinner(2), "[  =     ]");
        assert_eq!(spinner(7), "[       =]");
        assert_eq!(spinner(8), spinner(0));
    }
}
