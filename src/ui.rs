//! Log sinks.
//!
//! The orchestration core never prints directly; everything goes through a
//! [`LogSink`] so the terminal stays swappable (and testable). The terminal
//! sink keeps the task runner's two-channel convention: `writeln` is the
//! normal channel, shown unless verbose mode is on, and `verbose` is shown
//! only in verbose mode.

use colored::*;
use console::Term;

pub trait LogSink {
    /// Raw write without a trailing newline, used for in-place progress
    /// rendering (backspace sequences included).
    fn write(&mut self, text: &str);

    /// Normal-verbosity line.
    fn writeln(&mut self, text: &str);

    /// Elevated-verbosity line.
    fn verbose(&mut self, text: &str);

    /// Error line, always shown.
    fn error(&mut self, text: &str);
}

pub struct TerminalSink {
    term: Term,
    verbose: bool,
}

impl TerminalSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            term: Term::stdout(),
            verbose,
        }
    }
}

impl LogSink for TerminalSink {
    fn write(&mut self, text: &str) {
        let _ = self.term.write_str(text);
    }

    fn writeln(&mut self, text: &str) {
        if !self.verbose {
            let _ = self.term.write_line(text);
        }
    }

    fn verbose(&mut self, text: &str) {
        if self.verbose {
            let _ = self.term.write_line(text);
        }
    }

    fn error(&mut self, text: &str) {
        eprintln!("{} {}", "x".red(), text);
    }
}

/// Records everything written to it; used by tests and embedders that want
/// to capture build output.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub raw: String,
    pub lines: Vec<String>,
    pub verbose_lines: Vec<String>,
    pub errors: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, text: &str) {
        self.raw.push_str(text);
    }

    fn writeln(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn verbose(&mut self, text: &str) {
        self.verbose_lines.push(text.to_string());
    }

    fn error(&mut self, text: &str) {
        self.errors.push(text.to_string());
    }
}
