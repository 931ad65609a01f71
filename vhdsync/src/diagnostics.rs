//! Bounded, ordered log of user-facing error messages.
//!
//! Messages are collected while an action runs and printed once at exit, so
//! a supervising process reads the whole causal chain in one block on
//! stderr.

use std::error::Error;
use std::io::{self, Write};

/// Default number of messages kept.
pub const DEFAULT_CAPACITY: usize = 30;

/// Longest message kept, in bytes; longer messages are truncated.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Ordered list of diagnostic messages with a fixed capacity.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    messages: Vec<String>,
    capacity: usize,
    overflowed: bool,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    /// Append a message. Once full, further messages are dropped and the
    /// overflow flag is set.
    pub fn record(&mut self, message: impl Into<String>) {
        if self.messages.len() >= self.capacity {
            self.overflowed = true;
            return;
        }
        let mut message = message.into();
        truncate_at_char_boundary(&mut message, MAX_MESSAGE_LEN);
        self.messages.push(message);
    }

    /// Record an error and its sources, innermost cause first.
    pub fn record_error_chain(&mut self, error: &(dyn Error + 'static)) {
        let mut chain = vec![error.to_string()];
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        for message in chain.into_iter().rev() {
            self.record(message);
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether messages were dropped because the log was full.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Write every message, one per line, then a marker if messages were
    /// dropped.
    pub fn flush_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for message in &self.messages {
            writeln!(writer, "{}", message)?;
        }
        if self.overflowed {
            writeln!(writer, "(further errors omitted)")?;
        }
        writer.flush()
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
