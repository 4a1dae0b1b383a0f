//! Where user-facing lines go.
//!
//! Commands print results and progress through an [`OutputSink`] handed to
//! them, never by swapping the process streams. A sink can append a line,
//! rewrite the current status line in place, and restore plain output once
//! the status line is no longer needed.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

pub trait OutputSink: Send + Sync {
    /// Appends a permanent line.
    fn write(&self, line: &str);

    /// Replaces the current status line.
    fn rewrite(&self, line: &str);

    /// Drops the status line.
    fn restore(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Terminal sink. Status lines are drawn with an indicatif bar on stderr,
/// which stays hidden when stderr is not a terminal.
pub struct ConsoleSink {
    stream: Stream,
    status: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            status: Mutex::new(None),
        }
    }

    fn emit(&self, line: &str) {
        match self.stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }
}

impl OutputSink for ConsoleSink {
    fn write(&self, line: &str) {
        let status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        match status.as_ref() {
            Some(bar) => bar.suspend(|| self.emit(line)),
            None => self.emit(line),
        }
    }

    fn rewrite(&self, line: &str) {
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        let bar = status.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        });
        bar.set_message(line.to_string());
    }

    fn restore(&self) {
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(bar) = status.take() {
            bar.finish_and_clear();
        }
    }
}

/// Records lines and the last status instead of printing them.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    status: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl OutputSink for MemorySink {
    fn write(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(line.to_string());
    }

    fn rewrite(&self, line: &str) {
        *self.status.lock().unwrap_or_else(|p| p.into_inner()) = Some(line.to_string());
    }

    fn restore(&self) {
        self.status.lock().unwrap_or_else(|p| p.into_inner()).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_lines_and_last_status() {
        let sink = MemorySink::default();
        sink.write("first");
        sink.rewrite(">> Saving... [ 10%]");
        sink.rewrite(">> Saving... [ 50%]");
        assert_eq!(sink.status().as_deref(), Some(">> Saving... [ 50%]"));
        sink.restore();
        sink.write("second");
        assert_eq!(sink.lines(), vec!["first", "second"]);
        assert!(sink.status().is_none());
    }
}
