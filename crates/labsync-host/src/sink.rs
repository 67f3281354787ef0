//! Shared text sink for session logging

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable in-memory text buffer
///
/// Clones share the same buffer, so a session writing into its sink appends
/// to the caller's per-host output in order. Use it with `write!`/`writeln!`.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    buf: Arc<Mutex<String>>,
}

impl LogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append formatted text; infallible so `writeln!` needs no result handling
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = fmt::Write::write_fmt(&mut *buf, args);
    }

    /// Append a string as-is
    pub fn push_str(&self, text: &str) {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }

    /// Copy of everything written so far
    #[must_use]
    pub fn contents(&self) -> String {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain the buffer
    #[must_use]
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_buffer() {
        let sink = LogSink::new();
        let clone = sink.clone();

        writeln!(sink, "first {}", 1);
        clone.push_str("second\n");

        assert_eq!(sink.contents(), "first 1\nsecond\n");
        assert_eq!(clone.take(), "first 1\nsecond\n");
        assert!(sink.is_empty());
    }
}
