//! Diagnostic line sink

use std::fmt;
use std::sync::Arc;

/// Host-supplied "write line" callback for human-readable diagnostics.
///
/// Every line is also emitted as a `tracing` event under the
/// `hotswap::diagnostics` target.
#[derive(Clone)]
pub struct LogSink {
    write: Arc<dyn Fn(&str) + Send + Sync>,
}

impl LogSink {
    pub fn new<F>(write: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            write: Arc::new(write),
        }
    }

    /// A sink that only reaches `tracing`.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn write_line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::info!(target: "hotswap::diagnostics", "{}", line);
        (self.write)(line);
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_sink_forwards_lines_in_order() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink = LogSink::new(move |line| captured.lock().push(line.to_string()));

        sink.write_line("first");
        sink.clone().write_line(String::from("second"));

        assert_eq!(*lines.lock(), vec!["first", "second"]);
    }
}
